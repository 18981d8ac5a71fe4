//! Media type parsing and matching for `Content-Type` enforcement.

use std::fmt;

use indexmap::IndexMap;

pub const APPLICATION_JSON: &str = "application/json";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// A parsed media type such as `multipart/form-data; boundary=xyz`.
///
/// The essence (`type/subtype`) and parameter names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    main: String,
    sub: String,
    params: IndexMap<String, String>,
}

impl MediaType {
    pub fn parse(input: &str) -> Option<Self> {
        let mut segments = input.split(';');
        let essence = segments.next()?.trim().to_ascii_lowercase();
        let (main, sub) = essence.split_once('/')?;
        if main.is_empty() || sub.is_empty() || sub.contains('/') {
            return None;
        }

        let params = segments
            .filter_map(|segment| {
                let (name, value) = segment.split_once('=')?;
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|inner| inner.strip_suffix('"'))
                    .unwrap_or(value);
                Some((name.trim().to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        Some(Self {
            main: main.to_string(),
            sub: sub.to_string(),
            params,
        })
    }

    pub fn essence(&self) -> String {
        format!("{}/{}", self.main, self.sub)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// `application/json` or any structured `+json` suffix type.
    pub fn is_json(&self) -> bool {
        (self.main == "application" && self.sub == "json") || self.sub.ends_with("+json")
    }

    pub fn is_form_urlencoded(&self) -> bool {
        self.essence() == FORM_URLENCODED
    }

    pub fn is_multipart_form(&self) -> bool {
        self.essence() == MULTIPART_FORM_DATA
    }

    /// Matches against a pattern that may use `*` for the type or subtype (`image/*`, `*/*`).
    pub fn matches(&self, pattern: &str) -> bool {
        let Some(pattern) = MediaType::parse(pattern) else {
            return false;
        };
        let main_matches = pattern.main == "*" || pattern.main == self.main;
        let sub_matches = pattern.sub == "*" || pattern.sub == self.sub;
        main_matches && sub_matches
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main, self.sub)?;
        for (name, value) in &self.params {
            write!(f, "; {}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameters_and_lowercases_essence() {
        let media_type = MediaType::parse("Multipart/Form-Data; Boundary=\"abc123\"").expect("valid media type");
        assert_eq!(media_type.essence(), "multipart/form-data");
        assert_eq!(media_type.param("boundary"), Some("abc123"));
        assert!(media_type.is_multipart_form());
    }

    #[test]
    fn recognizes_json_variants() {
        assert!(MediaType::parse("application/json; charset=utf-8").unwrap().is_json());
        assert!(MediaType::parse("application/problem+json").unwrap().is_json());
        assert!(!MediaType::parse("text/plain").unwrap().is_json());
    }

    #[test]
    fn wildcard_patterns_match() {
        let png = MediaType::parse("image/png").unwrap();
        assert!(png.matches("image/*"));
        assert!(png.matches("*/*"));
        assert!(png.matches("image/png"));
        assert!(!png.matches("text/*"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(MediaType::parse("").is_none());
        assert!(MediaType::parse("json").is_none());
        assert!(MediaType::parse("a/b/c").is_none());
    }
}
