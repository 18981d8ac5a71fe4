use indexmap::IndexMap;
use quay_types::{EncodingObject, MediaTypeObject, RequestBodyObject};
use serde_json::json;

use super::{SchemaRegistry, example_objects};
use crate::marker::{BodyBinding, BodyDocs, BodyKind, FieldKind};

/// Documents a request body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyProvider {
    pub binding: BodyBinding,
    pub docs: BodyDocs,
}

impl BodyProvider {
    pub fn request_body(&self, registry: &mut SchemaRegistry) -> RequestBodyObject {
        let mut content = IndexMap::new();
        media_types(&self.binding, registry, &mut content);

        let examples = example_objects(&self.docs.examples);
        if examples.is_some() {
            for media_type in content.values_mut() {
                media_type.examples = examples.clone();
            }
        }

        RequestBodyObject {
            description: self.docs.description.clone(),
            content,
            required: self.binding.required,
        }
    }
}

/// Adds the media types a body binding accepts. The first variant claiming a media type wins.
fn media_types(binding: &BodyBinding, registry: &mut SchemaRegistry, content: &mut IndexMap<String, MediaTypeObject>) {
    let media_type = binding.media_type().to_string();
    let object = match &binding.kind {
        BodyKind::Json { .. } => MediaTypeObject {
            schema: Some(registry.schema_for(&binding.type_info)),
            ..MediaTypeObject::default()
        },
        BodyKind::File { format, .. } => MediaTypeObject {
            schema: Some(json!({"type": "string", "format": format.as_str()})),
            ..MediaTypeObject::default()
        },
        BodyKind::Form { fields, .. } => {
            let encoding: IndexMap<String, EncodingObject> = fields
                .values()
                .filter_map(|field| {
                    let encoding = match &field.kind {
                        FieldKind::Encoded { style, explode } => EncodingObject {
                            style: Some(*style),
                            explode: Some(*explode),
                            ..EncodingObject::default()
                        },
                        FieldKind::File {
                            media_type: Some(accepted),
                        } => EncodingObject {
                            content_type: Some(accepted.clone()),
                            ..EncodingObject::default()
                        },
                        FieldKind::File { media_type: None } | FieldKind::Single | FieldKind::Repeated => return None,
                    };
                    Some((field.wire_name.clone(), encoding))
                })
                .collect();
            MediaTypeObject {
                schema: Some(registry.schema_for(&binding.type_info)),
                examples: None,
                encoding: (!encoding.is_empty()).then_some(encoding),
            }
        }
        BodyKind::Discriminated { variants } => {
            for variant in variants {
                media_types(variant, registry, content);
            }
            return;
        }
    };
    content.entry(media_type).or_insert(object);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        marker::{BodyMarker, ContentTypeDiscriminated, File, FileFormat, Form, FormFile, Json},
        typeinfo::{TypeInfo, UploadFile},
    };
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Item {
        name: String,
        price: f64,
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema)]
    struct Avatar {
        user: String,
        image: UploadFile,
    }

    fn provider(marker: impl Into<BodyMarker>, info: TypeInfo) -> BodyProvider {
        let marker = marker.into();
        BodyProvider {
            binding: marker.bind("body", &info).expect("valid body"),
            docs: marker.docs().clone(),
        }
    }

    #[test]
    fn json_bodies_reference_their_model() {
        let provider = provider(Json::new().description("new item").example("pen", json!({"name": "pen", "price": 1})), TypeInfo::of::<Item>());
        let mut registry = SchemaRegistry::new();
        let body = provider.request_body(&mut registry);

        assert!(body.required);
        assert_eq!(body.description.as_deref(), Some("new item"));
        let media = &body.content["application/json"];
        assert_eq!(media.schema, Some(json!({"$ref": "#/components/schemas/Item"})));
        assert!(media.examples.as_ref().is_some_and(|examples| examples.contains_key("pen")));
        assert!(registry.definitions().contains_key("Item"));
    }

    #[test]
    fn file_bodies_document_media_type_and_format() {
        let binary = provider(File::new().media_type("image/png"), TypeInfo::of::<UploadFile>());
        let body = binary.request_body(&mut SchemaRegistry::new());
        assert_eq!(body.content["image/png"].schema, Some(json!({"type": "string", "format": "binary"})));

        let base64 = provider(File::new().format(FileFormat::Base64), TypeInfo::of::<Option<String>>());
        let body = base64.request_body(&mut SchemaRegistry::new());
        assert!(!body.required);
        assert_eq!(body.content["*/*"].schema, Some(json!({"type": "string", "format": "base64"})));
    }

    #[test]
    fn multipart_forms_document_field_encodings() {
        let provider = provider(
            Form::multipart().field("image", FormFile::new().media_type("image/jpeg")),
            TypeInfo::of::<Avatar>(),
        );
        let body = provider.request_body(&mut SchemaRegistry::new());
        let media = &body.content["multipart/form-data"];
        let encoding = media.encoding.as_ref().expect("field encodings");
        assert_eq!(encoding["image"].content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(encoding["user"].explode, Some(true));
    }

    #[test]
    fn discriminated_bodies_list_every_variant() {
        let marker = ContentTypeDiscriminated::new()
            .variant::<Item>(Json::new())
            .variant::<UploadFile>(File::new().media_type("image/*"))
            .description("item or picture");
        let provider = BodyProvider {
            binding: marker.bind("body", &TypeInfo::of::<Value>()).unwrap(),
            docs: marker.docs().clone(),
        };
        let body = provider.request_body(&mut SchemaRegistry::new());
        assert_eq!(body.content.keys().collect::<Vec<_>>(), vec!["application/json", "image/*"]);
        assert_eq!(body.description.as_deref(), Some("item or picture"));
    }
}
