//! Declared parameter types.
//!
//! A [`TypeInfo`] is captured once per declaration from a concrete Rust type. It carries the
//! type's JSON schema, the coercion [`Shape`] extractors use to turn raw wire strings into JSON
//! values, and a validation function that round-trips a candidate value through the type.

use std::{any::type_name, borrow::Cow, fmt};

use base64::{Engine, engine::general_purpose::STANDARD};
use indexmap::IndexMap;
use schemars::{JsonSchema, Schema, SchemaGenerator, generate::SchemaSettings, json_schema};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::DeserializeOwned};
use serde_json::Value;

/// The scalar a raw string is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
    /// A file upload (`type: string, format: binary`).
    Upload,
    Any,
}

/// Coercion shape derived from a type's schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Scalar(ScalarKind),
    Sequence(ScalarKind),
    Object {
        properties: IndexMap<String, Shape>,
        required: Vec<String>,
    },
    Any,
}

impl Shape {
    pub fn is_sequence(&self) -> bool {
        matches!(self, Shape::Sequence(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Shape::Object { .. })
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, Shape::Scalar(ScalarKind::Upload) | Shape::Sequence(ScalarKind::Upload))
    }

    /// Derives the shape from an inlined JSON schema.
    pub fn from_schema(schema: &Value) -> Shape {
        let Some(object) = schema.as_object() else {
            return Shape::Any;
        };

        for combinator in ["anyOf", "oneOf"] {
            if let Some(variants) = object.get(combinator).and_then(Value::as_array) {
                let non_null: Vec<&Value> = variants.iter().filter(|variant| !is_null_schema(variant)).collect();
                return match non_null.as_slice() {
                    [single] => Shape::from_schema(single),
                    _ => Shape::Any,
                };
            }
        }
        if let Some([single]) = object.get("allOf").and_then(Value::as_array).map(Vec::as_slice) {
            return Shape::from_schema(single);
        }

        match schema_type(schema) {
            Some("array") => {
                let item = object.get("items").map(Shape::from_schema).unwrap_or(Shape::Any);
                match item {
                    Shape::Scalar(kind) => Shape::Sequence(kind),
                    _ => Shape::Sequence(ScalarKind::Any),
                }
            }
            Some("object") => {
                let properties = object
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|properties| {
                        properties
                            .iter()
                            .map(|(name, property)| (name.clone(), Shape::from_schema(property)))
                            .collect()
                    })
                    .unwrap_or_default();
                let required = object
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
                Shape::Object { properties, required }
            }
            Some(other) => Shape::Scalar(scalar_kind(other, object.get("format").and_then(Value::as_str))),
            None => match object.get("enum").and_then(Value::as_array) {
                Some(values) if values.iter().all(Value::is_string) => Shape::Scalar(ScalarKind::String),
                Some(values) if values.iter().all(|value| value.is_i64() || value.is_u64()) => Shape::Scalar(ScalarKind::Integer),
                _ => Shape::Any,
            },
        }
    }
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("null")
}

/// The non-null `type` of a schema, whether written as a string or an array.
fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(name) => Some(name.as_str()),
        Value::Array(names) => names.iter().filter_map(Value::as_str).find(|name| *name != "null"),
        _ => None,
    }
}

fn scalar_kind(type_name: &str, format: Option<&str>) -> ScalarKind {
    match (type_name, format) {
        ("string", Some("binary")) => ScalarKind::Upload,
        ("string", _) => ScalarKind::String,
        ("integer", _) => ScalarKind::Integer,
        ("number", _) => ScalarKind::Number,
        ("boolean", _) => ScalarKind::Boolean,
        _ => ScalarKind::Any,
    }
}

/// Runtime description of a declared parameter type.
#[derive(Clone)]
pub struct TypeInfo {
    type_name: &'static str,
    shape: Shape,
    accepts_null: bool,
    schema_fn: fn(&mut SchemaGenerator) -> Schema,
    validate_fn: fn(Value) -> Result<Value, String>,
}

fn subschema<T: JsonSchema>(generator: &mut SchemaGenerator) -> Schema {
    generator.subschema_for::<T>()
}

fn validate_as<T: DeserializeOwned + Serialize>(value: Value) -> Result<Value, String> {
    let typed: T = serde_json::from_value(value).map_err(|error| error.to_string())?;
    serde_json::to_value(typed).map_err(|error| error.to_string())
}

impl TypeInfo {
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize + JsonSchema + 'static,
    {
        let inline = SchemaSettings::openapi3()
            .with(|settings| settings.inline_subschemas = true)
            .into_generator()
            .into_root_schema_for::<T>();

        Self {
            type_name: type_name::<T>(),
            shape: Shape::from_schema(inline.as_value()),
            accepts_null: serde_json::from_value::<T>(Value::Null).is_ok(),
            schema_fn: subschema::<T>,
            validate_fn: validate_as::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// `Option<_>` and other null-accepting types are optional with a `null` default.
    pub fn accepts_null(&self) -> bool {
        self.accepts_null
    }

    /// Registers the type with `generator` and returns its (possibly `$ref`) schema.
    pub fn schema(&self, generator: &mut SchemaGenerator) -> Schema {
        (self.schema_fn)(generator)
    }

    /// Round-trips `value` through the declared type, returning its normalized form.
    pub fn validate(&self, value: Value) -> Result<Value, String> {
        (self.validate_fn)(value)
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("type_name", &self.type_name)
            .field("shape", &self.shape)
            .field("accepts_null", &self.accepts_null)
            .finish()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

/// An uploaded file: a raw file body or one file part of a multipart form.
///
/// In JSON form the content travels as standard base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    #[serde(serialize_with = "encode_content", deserialize_with = "decode_content")]
    pub content: Vec<u8>,
}

impl UploadFile {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            filename: None,
            content_type: None,
            content,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "filename": self.filename,
            "content_type": self.content_type,
            "content": STANDARD.encode(&self.content),
        })
    }
}

fn encode_content<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(content))
}

fn decode_content<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}

impl JsonSchema for UploadFile {
    fn inline_schema() -> bool {
        true
    }

    fn schema_name() -> Cow<'static, str> {
        "UploadFile".into()
    }

    fn json_schema(_: &mut SchemaGenerator) -> Schema {
        json_schema!({
            "type": "string",
            "format": "binary"
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Filter {
        color: String,
        size: Option<i64>,
        tags: Vec<String>,
    }

    #[test]
    fn scalar_and_sequence_shapes() {
        assert_eq!(TypeInfo::of::<i64>().shape(), &Shape::Scalar(ScalarKind::Integer));
        assert_eq!(TypeInfo::of::<f64>().shape(), &Shape::Scalar(ScalarKind::Number));
        assert_eq!(TypeInfo::of::<bool>().shape(), &Shape::Scalar(ScalarKind::Boolean));
        assert_eq!(TypeInfo::of::<String>().shape(), &Shape::Scalar(ScalarKind::String));
        assert_eq!(TypeInfo::of::<Vec<i32>>().shape(), &Shape::Sequence(ScalarKind::Integer));
        assert_eq!(TypeInfo::of::<Option<Vec<String>>>().shape(), &Shape::Sequence(ScalarKind::String));
        assert_eq!(TypeInfo::of::<UploadFile>().shape(), &Shape::Scalar(ScalarKind::Upload));
    }

    #[test]
    fn object_shape_lists_properties_in_order() {
        let info = TypeInfo::of::<Filter>();
        let Shape::Object { properties, required } = info.shape() else {
            panic!("expected object shape, got {:?}", info.shape());
        };
        assert_eq!(properties.keys().collect::<Vec<_>>(), vec!["color", "size", "tags"]);
        assert_eq!(properties["size"], Shape::Scalar(ScalarKind::Integer));
        assert_eq!(properties["tags"], Shape::Sequence(ScalarKind::String));
        assert!(required.contains(&"color".to_string()));
        assert!(!required.contains(&"size".to_string()));
    }

    #[test]
    fn option_types_accept_null() {
        assert!(TypeInfo::of::<Option<i32>>().accepts_null());
        assert!(!TypeInfo::of::<i32>().accepts_null());
        assert!(!TypeInfo::of::<Filter>().accepts_null());
    }

    #[test]
    fn validate_normalizes_and_rejects() {
        let info = TypeInfo::of::<u8>();
        assert_eq!(info.validate(json!(7)), Ok(json!(7)));
        assert!(info.validate(json!(300)).is_err());
        assert!(info.validate(json!("7")).is_err());
    }

    #[test]
    fn upload_file_travels_as_base64() {
        let upload = UploadFile {
            filename: Some("a.txt".into()),
            content_type: Some("text/plain".into()),
            content: b"hi".to_vec(),
        };
        let value = upload.to_value();
        assert_eq!(value["content"], json!("aGk="));
        let decoded: UploadFile = serde_json::from_value(value).expect("decode upload");
        assert_eq!(decoded, upload);
    }
}
