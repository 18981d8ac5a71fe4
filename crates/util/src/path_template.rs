//! Route path templates in the OpenAPI placeholder format (`/items/{item_id}`).

use indexmap::IndexMap;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;
use thiserror::Error;

/// Everything except RFC3986 unreserved bytes is escaped inside a segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathTemplateError {
    #[error("path template '{0}' must start with '/'")]
    NotAbsolute(String),
    #[error("path template '{template}' has an unbalanced brace")]
    UnbalancedBrace { template: String },
    #[error("path template '{template}' has an invalid placeholder '{placeholder}'")]
    InvalidPlaceholder { template: String, placeholder: String },
    #[error("path template '{template}' repeats placeholder '{placeholder}'")]
    DuplicatePlaceholder { template: String, placeholder: String },
}

/// A compiled route template.
///
/// Each placeholder matches exactly one path segment. Captured values are percent-decoded.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    template: String,
    params: Vec<String>,
    pattern: Regex,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, PathTemplateError> {
        if !template.starts_with('/') {
            return Err(PathTemplateError::NotAbsolute(template.to_string()));
        }

        let mut params: Vec<String> = Vec::new();
        let mut pattern = String::from("^");
        let mut rest = template;
        while let Some(open) = rest.find(['{', '}']) {
            if rest.as_bytes()[open] == b'}' {
                return Err(PathTemplateError::UnbalancedBrace {
                    template: template.to_string(),
                });
            }
            pattern.push_str(&regex::escape(&rest[..open]));
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| PathTemplateError::UnbalancedBrace {
                template: template.to_string(),
            })?;
            let name = &after[..close];
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit());
            if !valid {
                return Err(PathTemplateError::InvalidPlaceholder {
                    template: template.to_string(),
                    placeholder: name.to_string(),
                });
            }
            if params.iter().any(|existing| existing == name) {
                return Err(PathTemplateError::DuplicatePlaceholder {
                    template: template.to_string(),
                    placeholder: name.to_string(),
                });
            }
            pattern.push_str(&format!("(?P<{}>[^/]+)", name));
            params.push(name.to_string());
            rest = &after[close + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let pattern = Regex::new(&pattern).map_err(|_| PathTemplateError::InvalidPlaceholder {
            template: template.to_string(),
            placeholder: String::new(),
        })?;

        Ok(Self {
            template: template.to_string(),
            params,
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Placeholder names in declaration order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|param| param == name)
    }

    /// Matches a request path, returning the decoded placeholder values.
    pub fn matches(&self, path: &str) -> Option<IndexMap<String, String>> {
        let captures = self.pattern.captures(path)?;
        let mut values = IndexMap::with_capacity(self.params.len());
        for name in &self.params {
            let raw = captures.name(name)?.as_str();
            let decoded = percent_decode_str(raw).decode_utf8_lossy().into_owned();
            values.insert(name.clone(), decoded);
        }
        Some(values)
    }

    /// Fills the placeholders, percent-encoding each value. Unknown placeholders are left as-is.
    pub fn expand(&self, values: &IndexMap<String, String>) -> String {
        let mut path = self.template.clone();
        for (name, value) in values {
            let encoded = utf8_percent_encode(value, PATH_SEGMENT).to_string();
            path = path.replace(&format!("{{{}}}", name), &encoded);
        }
        path
    }
}
