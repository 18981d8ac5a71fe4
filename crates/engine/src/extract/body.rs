//! Request body extraction: JSON, raw files, forms and content-type discriminated bodies.

use base64::{Engine, engine::general_purpose::STANDARD};
use futures_util::{FutureExt, future::BoxFuture};
use indexmap::IndexMap;
use quay_types::{LocationItem, ParamStyle, ValidationErrorEntry, ValidationErrorKind, ValidationErrors};
use quay_util::{
    MediaType,
    style::{deep_object_key, object_pairs, split_delimited},
};
use serde_json::{Map, Value};
use tracing::debug;

use super::coerce::{coerce_object, coerce_values, validation_entry};
use crate::{
    marker::{BodyBinding, BodyKind, FieldKind, FileFormat, FormEncoding, FormFieldBinding},
    request::{FormData, FormDecodeError, FormValue, RequestContext},
    typeinfo::{ScalarKind, Shape, UploadFile},
};

fn body_location() -> Vec<LocationItem> {
    vec![LocationItem::from("body")]
}

fn unsupported_media_type(found: Option<&MediaType>, expected: &str) -> ValidationErrors {
    let found = found.map(MediaType::essence).unwrap_or_else(|| "none".to_string());
    ValidationErrorEntry::new(
        body_location(),
        format!("Unsupported media type '{}', expected '{}'", found, expected),
        ValidationErrorKind::UnsupportedMediaType,
    )
    .into()
}

fn read_error(message: impl Into<String>) -> ValidationErrors {
    ValidationErrorEntry::new(body_location(), message, ValidationErrorKind::BodyRead).into()
}

/// Whether a request with `media_type` is routed to a body of this binding.
fn accepts_media_type(binding: &BodyBinding, media_type: Option<&MediaType>) -> bool {
    if let BodyKind::File { media_type: None, .. } = &binding.kind {
        return true;
    }
    let Some(media_type) = media_type else {
        return false;
    };
    match &binding.kind {
        BodyKind::Json { .. } => media_type.is_json(),
        BodyKind::File { media_type: pattern, .. } => pattern.as_deref().is_none_or(|pattern| media_type.matches(pattern)),
        BodyKind::Form {
            encoding: FormEncoding::UrlEncoded,
            ..
        } => media_type.is_form_urlencoded(),
        BodyKind::Form {
            encoding: FormEncoding::Multipart,
            ..
        } => media_type.is_multipart_form(),
        BodyKind::Discriminated { variants } => variants.iter().any(|variant| accepts_media_type(variant, Some(media_type))),
    }
}

/// Boxed so discriminated bodies can recurse into their variants.
pub(crate) fn extract_body<'a>(binding: &'a BodyBinding, context: &'a RequestContext) -> BoxFuture<'a, Result<Value, ValidationErrors>> {
    read_body(binding, context).boxed()
}

async fn read_body(binding: &BodyBinding, context: &RequestContext) -> Result<Value, ValidationErrors> {
    let body = context.body().await.map_err(|error| read_error(error.to_string()))?;
    if body.is_empty() && !binding.required {
        return Ok(Value::Null);
    }
    let media_type = context.content_type();

    let value = match &binding.kind {
        BodyKind::Json {
            decoder,
            enforce_media_type,
        } => {
            if body.is_empty() {
                return Err(ValidationErrorEntry::missing(body_location()).into());
            }
            if *enforce_media_type && !accepts_media_type(binding, media_type.as_ref()) {
                return Err(unsupported_media_type(media_type.as_ref(), binding.media_type()));
            }
            decoder.decode(body).map_err(|message| {
                ValidationErrors::from(ValidationErrorEntry::new(body_location(), message, ValidationErrorKind::JsonInvalid))
            })?
        }
        BodyKind::File {
            enforce_media_type,
            format,
            ..
        } => {
            if *enforce_media_type && !accepts_media_type(binding, media_type.as_ref()) {
                return Err(unsupported_media_type(media_type.as_ref(), binding.media_type()));
            }
            let content = match format {
                FileFormat::Binary => body.to_vec(),
                FileFormat::Base64 => STANDARD.decode(body.trim_ascii()).map_err(|error| {
                    ValidationErrors::from(ValidationErrorEntry::new(
                        body_location(),
                        format!("Invalid base64 body: {}", error),
                        ValidationErrorKind::ValueError,
                    ))
                })?,
            };
            file_value(binding.type_info.shape(), UploadFile {
                filename: None,
                content_type: context.header("content-type").map(str::to_string),
                content,
            })?
        }
        BodyKind::Form {
            encoding,
            enforce_media_type,
            fields,
        } => {
            if *enforce_media_type && !accepts_media_type(binding, media_type.as_ref()) {
                return Err(unsupported_media_type(media_type.as_ref(), encoding.media_type()));
            }
            let form = context.form_data().await.map_err(|error| match error {
                FormDecodeError::Body(error) => read_error(error.to_string()),
                FormDecodeError::Malformed(message) => {
                    ValidationErrorEntry::new(body_location(), message, ValidationErrorKind::ValueError).into()
                }
            })?;
            assemble_form(form, fields)?
        }
        BodyKind::Discriminated { variants } => {
            let Some(variant) = variants.iter().find(|variant| accepts_media_type(variant, media_type.as_ref())) else {
                let expected: Vec<&str> = variants.iter().map(BodyBinding::media_type).collect();
                return Err(unsupported_media_type(media_type.as_ref(), &expected.join("', '")));
            };
            debug!(body = %binding.name, variant = variant.kind_name(), "dispatched body on content type");
            extract_body(variant, context).await?
        }
    };

    binding
        .type_info
        .validate(value)
        .map_err(|message| validation_entry(&body_location(), &message).into())
}

fn file_value(shape: &Shape, upload: UploadFile) -> Result<Value, ValidationErrors> {
    match shape {
        Shape::Scalar(ScalarKind::String) => String::from_utf8(upload.content).map(Value::String).map_err(|_| {
            ValidationErrorEntry::new(body_location(), "Body is not valid UTF-8 text", ValidationErrorKind::ValueError).into()
        }),
        _ => Ok(upload.to_value()),
    }
}

fn form_value(value: &FormValue) -> Value {
    match value {
        FormValue::Text(text) => Value::String(text.clone()),
        FormValue::File(upload) => upload.to_value(),
    }
}

fn texts(values: &[&FormValue]) -> Vec<String> {
    values
        .iter()
        .filter_map(|value| match value {
            FormValue::Text(text) => Some(text.clone()),
            FormValue::File(_) => None,
        })
        .collect()
}

/// Builds the model object from the decoded form, one property at a time.
fn assemble_form(form: &FormData, fields: &IndexMap<String, FormFieldBinding>) -> Result<Value, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut object = Map::new();

    for field in fields.values() {
        let location = vec![LocationItem::from("body"), LocationItem::from(field.wire_name.as_str())];
        match read_field(form, field, &location) {
            Ok(Some(value)) => {
                object.insert(field.property.clone(), value);
            }
            Ok(None) if field.required => errors.push(ValidationErrorEntry::missing(location)),
            Ok(None) => {}
            Err(failures) => errors.extend(failures),
        }
    }

    if errors.is_empty() { Ok(Value::Object(object)) } else { Err(errors) }
}

fn read_field(form: &FormData, field: &FormFieldBinding, location: &[LocationItem]) -> Result<Option<Value>, ValidationErrors> {
    let values: Vec<&FormValue> = form.values(&field.wire_name).collect();

    match &field.kind {
        FieldKind::Encoded { style, explode } => {
            if let Shape::Object { properties, .. } = &field.shape {
                let pairs: Vec<(String, String)> = if *style == ParamStyle::DeepObject {
                    form.text_pairs()
                        .into_iter()
                        .filter_map(|(key, value)| deep_object_key(&key, &field.wire_name).map(|property| (property.to_string(), value)))
                        .collect()
                } else if *explode {
                    form.text_pairs().into_iter().filter(|(key, _)| properties.contains_key(key)).collect()
                } else {
                    let raw = texts(&values).pop().unwrap_or_default();
                    object_pairs(&split_delimited(&raw, style.delimiter()), false).ok_or_else(|| {
                        ValidationErrors::from(ValidationErrorEntry::new(
                            location.to_vec(),
                            "Expected key/value pairs",
                            ValidationErrorKind::ValueError,
                        ))
                    })?
                };
                if pairs.is_empty() {
                    return Ok(None);
                }
                return coerce_object(&pairs, properties, location).map(Some);
            }
            if field.shape.is_upload() {
                return upload_values(&values, &field.shape, location);
            }
            let raw = texts(&values);
            if raw.is_empty() {
                return Ok(None);
            }
            let raw = if field.shape.is_sequence() && !explode {
                raw.last().map(|last| split_delimited(last, style.delimiter())).unwrap_or_default()
            } else {
                raw
            };
            coerce_values(&raw, &field.shape, location).map(Some)
        }
        FieldKind::Single => {
            let Some(last) = values.last() else {
                return Ok(None);
            };
            match last {
                FormValue::Text(text) if !field.shape.is_upload() => coerce_values(std::slice::from_ref(text), &field.shape, location).map(Some),
                other => Ok(Some(form_value(other))),
            }
        }
        FieldKind::Repeated => {
            if values.is_empty() {
                return Ok(None);
            }
            if field.shape.is_upload() {
                return Ok(Some(Value::Array(values.iter().map(|value| form_value(value)).collect())));
            }
            let raw = texts(&values);
            coerce_values(&raw, &field.shape, location).map(Some)
        }
        FieldKind::File { .. } => upload_values(&values, &field.shape, location),
    }
}

fn upload_values(values: &[&FormValue], shape: &Shape, location: &[LocationItem]) -> Result<Option<Value>, ValidationErrors> {
    if values.is_empty() {
        return Ok(None);
    }
    let mut uploads = Vec::with_capacity(values.len());
    for value in values {
        match value {
            FormValue::File(upload) => uploads.push(upload.to_value()),
            FormValue::Text(_) => {
                return Err(ValidationErrorEntry::new(location.to_vec(), "Expected a file upload", ValidationErrorKind::ValueError).into());
            }
        }
    }
    if shape.is_sequence() {
        Ok(Some(Value::Array(uploads)))
    } else {
        Ok(uploads.pop())
    }
}
