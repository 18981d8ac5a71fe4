//! Query, path, header and cookie extraction.

use quay_types::{LocationItem, ParamLocation, ParamStyle, ValidationErrorEntry, ValidationErrorKind, ValidationErrors};
use quay_util::style::{decode_path_sequence, deep_object_key, object_pairs, split_delimited, strip_path_prefix};
use serde_json::Value;
use tracing::trace;

use super::coerce::{coerce_object, coerce_values, validation_entry};
use crate::{marker::ParameterBinding, request::RequestContext, typeinfo::Shape};

/// Raw wire data located for one parameter.
enum Located {
    Values(Vec<String>),
    Pairs(Vec<(String, String)>),
    /// Present but not decodable in the declared style.
    Malformed(String),
}

pub(crate) fn extract_parameter(binding: &ParameterBinding, context: &RequestContext) -> Result<Value, ValidationErrors> {
    let location = vec![
        LocationItem::from(binding.location.as_str()),
        LocationItem::from(binding.wire_name.as_str()),
    ];

    let Some(located) = locate(binding, context) else {
        if binding.required {
            return Err(ValidationErrorEntry::missing(location).into());
        }
        trace!(parameter = %binding.wire_name, "absent optional parameter");
        return Ok(binding.absent_value());
    };

    let coerced = match (located, binding.shape()) {
        (Located::Malformed(message), _) => {
            return Err(ValidationErrorEntry::new(location, message, ValidationErrorKind::ValueError).into());
        }
        (Located::Pairs(pairs), Shape::Object { properties, .. }) => coerce_object(&pairs, properties, &location)?,
        (Located::Pairs(pairs), _) => {
            let values: Vec<String> = pairs.into_iter().map(|(_, value)| value).collect();
            coerce_values(&values, binding.shape(), &location)?
        }
        (Located::Values(values), shape) => coerce_values(&values, shape, &location)?,
    };

    binding
        .type_info
        .validate(coerced)
        .map_err(|message| validation_entry(&location, &message).into())
}

fn locate(binding: &ParameterBinding, context: &RequestContext) -> Option<Located> {
    let name = binding.wire_name.as_str();
    match binding.location {
        ParamLocation::Query => locate_query(binding, context),
        ParamLocation::Header => {
            let values = context.header_values(name);
            if values.is_empty() {
                return None;
            }
            let joined = values.join(",");
            Some(split_simple(binding, &joined))
        }
        ParamLocation::Cookie => context.cookie(name).map(|raw| split_simple(binding, raw)),
        ParamLocation::Path => context.path_param(name).map(|raw| decode_path(binding, raw)),
    }
}

fn locate_query(binding: &ParameterBinding, context: &RequestContext) -> Option<Located> {
    let name = binding.wire_name.as_str();
    match binding.shape() {
        Shape::Object { properties, .. } => {
            let pairs: Vec<(String, String)> = match (binding.style, binding.explode) {
                (ParamStyle::DeepObject, _) => context
                    .query_pairs()
                    .iter()
                    .filter_map(|(key, value)| deep_object_key(key, name).map(|property| (property.to_string(), value.clone())))
                    .collect(),
                (_, true) => context
                    .query_pairs()
                    .iter()
                    .filter(|(key, _)| properties.contains_key(key))
                    .cloned()
                    .collect(),
                (style, false) => {
                    let raw = context.query_values(name).last().copied()?;
                    let items = split_delimited(raw, style.delimiter());
                    return Some(match object_pairs(&items, false) {
                        Some(pairs) => Located::Pairs(pairs),
                        None => Located::Malformed(format!("Expected key/value pairs separated by '{}'", style.delimiter())),
                    });
                }
            };
            if pairs.is_empty() { None } else { Some(Located::Pairs(pairs)) }
        }
        Shape::Sequence(_) => {
            let values = context.query_values(name);
            if values.is_empty() {
                return None;
            }
            if binding.explode {
                Some(Located::Values(values.into_iter().map(str::to_string).collect()))
            } else {
                let raw = values.last().copied().unwrap_or_default();
                Some(Located::Values(split_delimited(raw, binding.style.delimiter())))
            }
        }
        Shape::Scalar(_) | Shape::Any => {
            let values = context.query_values(name);
            if values.is_empty() {
                None
            } else {
                Some(Located::Values(values.into_iter().map(str::to_string).collect()))
            }
        }
    }
}

/// Header and cookie values: comma separated sequences and objects.
fn split_simple(binding: &ParameterBinding, raw: &str) -> Located {
    match binding.shape() {
        Shape::Sequence(_) => Located::Values(split_delimited(raw, ',').into_iter().map(|item| item.trim().to_string()).collect()),
        Shape::Object { .. } => pairs_or_malformed(&split_delimited(raw, ','), binding.explode),
        Shape::Scalar(_) | Shape::Any => Located::Values(vec![raw.to_string()]),
    }
}

fn pairs_or_malformed(items: &[String], explode: bool) -> Located {
    match object_pairs(items, explode) {
        Some(pairs) => Located::Pairs(pairs),
        None => Located::Malformed("Expected key/value pairs".into()),
    }
}

fn decode_path(binding: &ParameterBinding, raw: &str) -> Located {
    let name = binding.wire_name.as_str();
    let style = binding.style;
    let mismatch = || Located::Malformed(format!("Value does not match the '{}' path style", style));
    match binding.shape() {
        Shape::Sequence(_) => match decode_path_sequence(raw, style, name, binding.explode) {
            Some(items) => Located::Values(items),
            None => mismatch(),
        },
        Shape::Object { .. } => {
            let items = match (style, binding.explode) {
                (ParamStyle::Matrix, true) => raw
                    .strip_prefix(';')
                    .map(|rest| rest.split(';').map(str::to_string).collect::<Vec<_>>()),
                (ParamStyle::Label, true) => raw.strip_prefix('.').map(|rest| split_delimited(rest, '.')),
                _ => strip_path_prefix(raw, style, name).map(|rest| split_delimited(rest, ',')),
            };
            match items {
                Some(items) => pairs_or_malformed(&items, binding.explode),
                None => mismatch(),
            }
        }
        Shape::Scalar(_) | Shape::Any => match strip_path_prefix(raw, style, name) {
            Some(value) => Located::Values(vec![value.to_string()]),
            None => mismatch(),
        },
    }
}
