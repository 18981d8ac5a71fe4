//! Raw wire strings to JSON values, guided by a [`Shape`].

use indexmap::IndexMap;
use quay_types::{LocationItem, ValidationErrorEntry, ValidationErrorKind, ValidationErrors};
use serde_json::{Map, Number, Value};

use crate::typeinfo::{ScalarKind, Shape};

pub(crate) fn coerce_scalar(raw: &str, kind: ScalarKind) -> Result<Value, (String, ValidationErrorKind)> {
    match kind {
        ScalarKind::String | ScalarKind::Any | ScalarKind::Upload => Ok(Value::String(raw.to_string())),
        ScalarKind::Integer => {
            let trimmed = raw.trim();
            trimmed
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| trimmed.parse::<u64>().map(Value::from))
                .map_err(|_| {
                    (
                        "Input should be a valid integer, unable to parse string as an integer".to_string(),
                        ValidationErrorKind::IntParsing,
                    )
                })
        }
        ScalarKind::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| {
                (
                    "Input should be a valid number, unable to parse string as a number".to_string(),
                    ValidationErrorKind::FloatParsing,
                )
            }),
        ScalarKind::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" | "y" | "t" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" | "n" | "f" => Ok(Value::Bool(false)),
            _ => Err((
                "Input should be a valid boolean, unable to interpret input".to_string(),
                ValidationErrorKind::BoolParsing,
            )),
        },
    }
}

fn item_kind(shape: &Shape) -> ScalarKind {
    match shape {
        Shape::Scalar(kind) | Shape::Sequence(kind) => *kind,
        Shape::Object { .. } | Shape::Any => ScalarKind::Any,
    }
}

/// Coerces one or more raw values according to `shape`.
///
/// Scalars take the last occurrence. Failures are reported under `location`, with the item
/// index appended for sequences.
pub(crate) fn coerce_values(values: &[String], shape: &Shape, location: &[LocationItem]) -> Result<Value, ValidationErrors> {
    match shape {
        Shape::Sequence(kind) => {
            let mut errors = ValidationErrors::new();
            let mut items = Vec::with_capacity(values.len());
            for (index, raw) in values.iter().enumerate() {
                match coerce_scalar(raw, *kind) {
                    Ok(value) => items.push(value),
                    Err((message, error_kind)) => {
                        let mut item_location = location.to_vec();
                        item_location.push(LocationItem::Index(index));
                        errors.push(ValidationErrorEntry::new(item_location, message, error_kind));
                    }
                }
            }
            if errors.is_empty() { Ok(Value::Array(items)) } else { Err(errors) }
        }
        _ => {
            let raw = values.last().map(String::as_str).unwrap_or_default();
            coerce_scalar(raw, item_kind(shape))
                .map_err(|(message, kind)| ValidationErrorEntry::new(location.to_vec(), message, kind).into())
        }
    }
}

/// Assembles an object from key/value pairs, keeping only declared properties.
pub(crate) fn coerce_object(
    pairs: &[(String, String)],
    properties: &IndexMap<String, Shape>,
    location: &[LocationItem],
) -> Result<Value, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut object = Map::new();
    for (property, shape) in properties {
        let values: Vec<String> = pairs
            .iter()
            .filter(|(key, _)| key == property)
            .map(|(_, value)| value.clone())
            .collect();
        if values.is_empty() {
            continue;
        }
        let mut property_location = location.to_vec();
        property_location.push(LocationItem::from(property.as_str()));
        match coerce_values(&values, shape, &property_location) {
            Ok(value) => {
                object.insert(property.clone(), value);
            }
            Err(failures) => errors.extend(failures),
        }
    }
    if errors.is_empty() { Ok(Value::Object(object)) } else { Err(errors) }
}

/// Converts a type validation message into an entry under `location`.
///
/// A missing struct field is reported as a `missing` entry one level deeper.
pub(crate) fn validation_entry(location: &[LocationItem], message: &str) -> ValidationErrorEntry {
    if let Some(field) = message
        .strip_prefix("missing field `")
        .and_then(|rest| rest.split('`').next())
    {
        let mut field_location = location.to_vec();
        field_location.push(LocationItem::from(field));
        return ValidationErrorEntry::missing(field_location);
    }
    ValidationErrorEntry::new(location.to_vec(), message, ValidationErrorKind::ValueError)
}
