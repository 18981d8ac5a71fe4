//! Decoding of OpenAPI parameter serialization styles.
//!
//! These helpers operate on already-located raw strings; deciding which raw string belongs to
//! which parameter is the extractor's job.

use quay_types::ParamStyle;

/// Splits a non-exploded collection value on `delimiter`. An empty input yields no items.
pub fn split_delimited(raw: &str, delimiter: char) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(delimiter).map(str::to_string).collect()
}

/// Removes the label (`.`) or matrix (`;name=`) prefix of a path value.
///
/// Returns `None` when the value does not carry the prefix its style requires.
pub fn strip_path_prefix<'a>(raw: &'a str, style: ParamStyle, name: &str) -> Option<&'a str> {
    match style {
        ParamStyle::Label => raw.strip_prefix('.'),
        ParamStyle::Matrix => {
            let rest = raw.strip_prefix(';')?;
            if rest == name {
                return Some("");
            }
            rest.strip_prefix(name)?.strip_prefix('=')
        }
        _ => Some(raw),
    }
}

/// Decodes a path sequence in `simple`, `label` or `matrix` style.
pub fn decode_path_sequence(raw: &str, style: ParamStyle, name: &str, explode: bool) -> Option<Vec<String>> {
    match (style, explode) {
        (ParamStyle::Label, true) => Some(split_delimited(raw.strip_prefix('.')?, '.')),
        (ParamStyle::Matrix, true) => {
            let prefix = format!("{}=", name);
            raw.strip_prefix(';')?
                .split(';')
                .map(|item| item.strip_prefix(prefix.as_str()).map(str::to_string))
                .collect()
        }
        _ => Some(split_delimited(strip_path_prefix(raw, style, name)?, ',')),
    }
}

/// Groups decoded object items into key/value pairs.
///
/// Exploded objects arrive as `key=value` items; non-exploded objects alternate keys and values.
pub fn object_pairs(items: &[String], explode: bool) -> Option<Vec<(String, String)>> {
    if explode {
        items
            .iter()
            .map(|item| item.split_once('=').map(|(key, value)| (key.to_string(), value.to_string())))
            .collect()
    } else {
        if items.len() % 2 != 0 {
            return None;
        }
        Some(
            items
                .chunks(2)
                .map(|pair| (pair[0].clone(), pair[1].clone()))
                .collect(),
        )
    }
}

/// Parses a deepObject key such as `filter[color]` into its property name.
pub fn deep_object_key<'a>(key: &'a str, name: &str) -> Option<&'a str> {
    key.strip_prefix(name)?.strip_prefix('[')?.strip_suffix(']')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_style_delimiters() {
        assert_eq!(split_delimited("1|2|3", ParamStyle::PipeDelimited.delimiter()), vec!["1", "2", "3"]);
        assert_eq!(split_delimited("1 2", ParamStyle::SpaceDelimited.delimiter()), vec!["1", "2"]);
        assert!(split_delimited("", ',').is_empty());
    }

    #[test]
    fn decodes_label_and_matrix_sequences() {
        assert_eq!(
            decode_path_sequence(".3.4.5", ParamStyle::Label, "id", true),
            Some(vec!["3".to_string(), "4".to_string(), "5".to_string()])
        );
        assert_eq!(
            decode_path_sequence(".3,4", ParamStyle::Label, "id", false),
            Some(vec!["3".to_string(), "4".to_string()])
        );
        assert_eq!(
            decode_path_sequence(";id=3;id=4", ParamStyle::Matrix, "id", true),
            Some(vec!["3".to_string(), "4".to_string()])
        );
        assert_eq!(
            decode_path_sequence(";id=3,4", ParamStyle::Matrix, "id", false),
            Some(vec!["3".to_string(), "4".to_string()])
        );
        assert_eq!(decode_path_sequence("3,4", ParamStyle::Label, "id", false), None);
    }

    #[test]
    fn strips_scalar_prefixes() {
        assert_eq!(strip_path_prefix(";id=5", ParamStyle::Matrix, "id"), Some("5"));
        assert_eq!(strip_path_prefix(".5", ParamStyle::Label, "id"), Some("5"));
        assert_eq!(strip_path_prefix("5", ParamStyle::Simple, "id"), Some("5"));
        assert_eq!(strip_path_prefix(";other=5", ParamStyle::Matrix, "id"), None);
    }

    #[test]
    fn groups_object_items() {
        let flat = vec!["role".to_string(), "admin".to_string(), "first".to_string(), "Alex".to_string()];
        assert_eq!(
            object_pairs(&flat, false),
            Some(vec![("role".into(), "admin".into()), ("first".into(), "Alex".into())])
        );
        let exploded = vec!["role=admin".to_string()];
        assert_eq!(object_pairs(&exploded, true), Some(vec![("role".into(), "admin".into())]));
        assert_eq!(object_pairs(&flat[..3], false), None);
    }

    #[test]
    fn reads_deep_object_keys() {
        assert_eq!(deep_object_key("filter[color]", "filter"), Some("color"));
        assert_eq!(deep_object_key("filter", "filter"), None);
        assert_eq!(deep_object_key("other[color]", "filter"), None);
    }
}
