use quay_types::{ParamLocation, ParameterObject};
use serde_json::Value;

use super::{SchemaRegistry, example_objects, with_keyword};
use crate::marker::{ParamDocs, ParameterBinding};

/// Documents a query, path, header or cookie parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterProvider {
    pub binding: ParameterBinding,
    pub docs: ParamDocs,
}

impl ParameterProvider {
    pub fn parameter_object(&self, registry: &mut SchemaRegistry) -> ParameterObject {
        let binding = &self.binding;
        let mut schema = registry.schema_for(&binding.type_info);
        if binding.type_info.accepts_null() && schema.get("nullable").is_none() {
            schema = with_keyword(schema, "nullable", Value::Bool(true));
        }
        if let Some(default) = &binding.default {
            schema = with_keyword(schema, "default", default.clone());
        }

        ParameterObject {
            name: binding.wire_name.clone(),
            location: binding.location,
            description: self.docs.description.clone(),
            required: binding.required || binding.location == ParamLocation::Path,
            deprecated: self.docs.deprecated,
            style: Some(binding.style),
            explode: Some(binding.explode),
            schema,
            examples: example_objects(&self.docs.examples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{marker::ParamMarker, typeinfo::TypeInfo};
    use quay_types::ParamStyle;
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Filter {
        color: String,
    }

    fn provider(marker: ParamMarker, name: &str, info: TypeInfo) -> ParameterProvider {
        ParameterProvider {
            binding: marker.bind(name, &info).expect("valid binding"),
            docs: marker.docs().clone(),
        }
    }

    #[test]
    fn path_parameters_are_required_with_their_style() {
        let provider = provider(ParamMarker::path(), "item_id", TypeInfo::of::<i64>());
        let object = provider.parameter_object(&mut SchemaRegistry::new());
        assert_eq!(
            serde_json::to_value(&object).unwrap(),
            json!({
                "name": "item_id",
                "in": "path",
                "required": true,
                "style": "simple",
                "explode": false,
                "schema": {"type": "integer", "format": "int64"}
            })
        );
    }

    #[test]
    fn optional_parameters_are_nullable_and_carry_defaults() {
        let optional = provider(ParamMarker::query(), "q", TypeInfo::of::<Option<String>>());
        let object = optional.parameter_object(&mut SchemaRegistry::new());
        assert!(!object.required);
        assert_eq!(object.schema["nullable"], json!(true));

        let defaulted = provider(ParamMarker::query().default(json!(10)), "limit", TypeInfo::of::<u32>());
        let object = defaulted.parameter_object(&mut SchemaRegistry::new());
        assert!(!object.required);
        assert_eq!(object.schema["default"], json!(10));
    }

    #[test]
    fn header_names_docs_and_model_references() {
        let header = provider(
            ParamMarker::header().description("api key").example("sample", json!("abc")).deprecated(true),
            "x_key",
            TypeInfo::of::<String>(),
        );
        let object = header.parameter_object(&mut SchemaRegistry::new());
        assert_eq!(object.name, "x-key");
        assert_eq!(object.description.as_deref(), Some("api key"));
        assert_eq!(object.deprecated, Some(true));
        assert_eq!(object.examples.as_ref().map(|examples| examples["sample"].value.clone()), Some(json!("abc")));

        let mut registry = SchemaRegistry::new();
        let deep = provider(ParamMarker::query().style(ParamStyle::DeepObject), "filter", TypeInfo::of::<Option<Filter>>());
        let object = deep.parameter_object(&mut registry);
        assert_eq!(object.style, Some(ParamStyle::DeepObject));
        assert_eq!(object.schema["nullable"], json!(true));
        assert!(registry.definitions().contains_key("Filter"));
    }
}
