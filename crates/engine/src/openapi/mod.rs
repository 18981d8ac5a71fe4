//! OpenAPI providers.
//!
//! Every provider holds the same binding its extractor was built from. Schemas for declared
//! types come from one shared [`SchemaRegistry`] per document, so a named model is emitted once
//! under `#/components/schemas/` and referenced everywhere else.

mod body;
mod params;

pub use body::BodyProvider;
pub use params::ParameterProvider;

use indexmap::IndexMap;
use quay_types::{ExampleObject, Operation};
use schemars::{JsonSchema, SchemaGenerator, generate::SchemaSettings};
use serde_json::{Map, Value, json};

use crate::typeinfo::TypeInfo;

/// Reference prefix of registered component schemas.
pub const COMPONENTS_PREFIX: &str = "#/components/schemas/";

/// Schema generator shared by every provider contributing to one document.
#[derive(Debug)]
pub struct SchemaRegistry {
    generator: SchemaGenerator,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            generator: SchemaSettings::openapi3().into_generator(),
        }
    }

    /// Schema of a declared parameter type, as a `$ref` when the type is a named model.
    pub fn schema_for(&mut self, type_info: &TypeInfo) -> Value {
        let mut schema = type_info.schema(&mut self.generator).to_value();
        normalize_schema(&mut schema);
        schema
    }

    /// Schema of a concrete type, registering it the same way declared types are.
    pub fn schema_of<T: JsonSchema>(&mut self) -> Value {
        let mut schema = self.generator.subschema_for::<T>().to_value();
        normalize_schema(&mut schema);
        schema
    }

    /// Every named model registered so far, in registration order.
    pub fn definitions(&self) -> IndexMap<String, Value> {
        self.generator
            .definitions()
            .iter()
            .map(|(name, schema)| {
                let mut schema = schema.clone();
                normalize_schema(&mut schema);
                (name.clone(), schema)
            })
            .collect()
    }
}

/// Keys whose values are data rather than subschemas.
const DATA_KEYWORDS: [&str; 5] = ["enum", "default", "example", "examples", "const"];
/// Keys whose values map names to subschemas.
const SCHEMA_MAPS: [&str; 4] = ["properties", "patternProperties", "definitions", "$defs"];

/// Rewrites a JSON schema into the OpenAPI 3.0 dialect.
///
/// Null is expressed with `nullable`, `const` becomes a one-element `enum`, and a `$ref` never
/// carries sibling keywords.
pub fn normalize_schema(schema: &mut Value) {
    let Value::Object(object) = schema else {
        return;
    };
    object.remove("$schema");

    for (key, child) in object.iter_mut() {
        if DATA_KEYWORDS.contains(&key.as_str()) {
            continue;
        }
        if SCHEMA_MAPS.contains(&key.as_str()) {
            if let Value::Object(map) = child {
                map.values_mut().for_each(normalize_schema);
            }
            continue;
        }
        match child {
            Value::Array(items) => items.iter_mut().for_each(normalize_schema),
            other => normalize_schema(other),
        }
    }

    if let Some(value) = object.remove("const") {
        object.insert("enum".into(), Value::Array(vec![value]));
    }
    normalize_type_array(object);
    for combinator in ["anyOf", "oneOf"] {
        normalize_null_variant(object, combinator);
    }
    isolate_ref(object);
}

fn normalize_type_array(object: &mut Map<String, Value>) {
    let Some(Value::Array(types)) = object.get("type") else {
        return;
    };
    let nullable = types.iter().any(|name| name == "null");
    let mut rest: Vec<Value> = types.iter().filter(|name| *name != "null").cloned().collect();
    match rest.len() {
        0 => {
            object.remove("type");
        }
        1 => {
            object.insert("type".into(), rest.remove(0));
        }
        _ => {
            object.remove("type");
            let variants = rest.into_iter().map(|name| json!({ "type": name })).collect();
            object.insert("anyOf".into(), Value::Array(variants));
        }
    }
    if nullable {
        object.insert("nullable".into(), Value::Bool(true));
    }
}

fn is_null_variant(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

fn normalize_null_variant(object: &mut Map<String, Value>, combinator: &str) {
    let Some(Value::Array(variants)) = object.get(combinator) else {
        return;
    };
    if !variants.iter().any(is_null_variant) {
        return;
    }
    let mut rest: Vec<Value> = variants.iter().filter(|variant| !is_null_variant(variant)).cloned().collect();
    object.remove(combinator);
    object.insert("nullable".into(), Value::Bool(true));

    if rest.len() != 1 {
        object.insert(combinator.into(), Value::Array(rest));
        return;
    }
    match rest.remove(0) {
        reference @ Value::Object(_) if reference.get("$ref").is_some() => {
            object.insert("allOf".into(), Value::Array(vec![reference]));
        }
        Value::Object(single) => {
            for (key, value) in single {
                object.entry(key).or_insert(value);
            }
        }
        other => {
            object.insert(combinator.into(), Value::Array(vec![other]));
        }
    }
}

fn isolate_ref(object: &mut Map<String, Value>) {
    if object.len() < 2 {
        return;
    }
    if let Some(reference) = object.remove("$ref") {
        object.insert("allOf".into(), json!([{ "$ref": reference }]));
    }
}

/// Adds `keyword` to a schema, wrapping a bare `$ref` so the keyword is not ignored.
pub(crate) fn with_keyword(schema: Value, keyword: &str, value: Value) -> Value {
    match schema {
        Value::Object(mut object) if !object.contains_key("$ref") => {
            object.insert(keyword.into(), value);
            Value::Object(object)
        }
        other => {
            let mut wrapper = Map::new();
            wrapper.insert("allOf".into(), Value::Array(vec![other]));
            wrapper.insert(keyword.into(), value);
            Value::Object(wrapper)
        }
    }
}

pub(crate) fn example_objects(examples: &IndexMap<String, Value>) -> Option<IndexMap<String, ExampleObject>> {
    if examples.is_empty() {
        return None;
    }
    Some(
        examples
            .iter()
            .map(|(name, value)| (name.clone(), ExampleObject::new(value.clone())))
            .collect(),
    )
}

/// Documents one declared value; paired with the extractor built from the same marker.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenApiProvider {
    Parameter(ParameterProvider),
    Body(BodyProvider),
}

impl OpenApiProvider {
    pub fn name(&self) -> &str {
        match self {
            Self::Parameter(provider) => &provider.binding.name,
            Self::Body(provider) => &provider.binding.name,
        }
    }

    /// Adds this value's parameter or request body to `operation`.
    ///
    /// A parameter already present under the same name and location is not repeated.
    pub fn contribute(&self, registry: &mut SchemaRegistry, operation: &mut Operation) {
        match self {
            Self::Parameter(provider) => {
                let binding = &provider.binding;
                let present = operation
                    .parameters
                    .iter()
                    .any(|parameter| parameter.name == binding.wire_name && parameter.location == binding.location);
                if !present {
                    operation.parameters.push(provider.parameter_object(registry));
                }
            }
            Self::Body(provider) => {
                if operation.request_body.is_none() {
                    operation.request_body = Some(provider.request_body(registry));
                }
            }
        }
    }
}
