//! Wire-level decoding helpers used by extractors, the route table and the test client.
//!
//! Nothing in this crate knows about declared types; it turns raw request text and bytes into
//! strings and parts that the engine then coerces and validates.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod cookies;
pub mod media_type;
pub mod multipart;
pub mod path_template;
pub mod query;
pub mod style;

pub use cookies::parse_cookie_header;
pub use media_type::MediaType;
pub use multipart::{MultipartBuilder, MultipartError, MultipartPart, parse_multipart};
pub use path_template::{PathTemplate, PathTemplateError};
pub use query::{encode_pairs, parse_pairs};

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_redact_patterns);

fn build_redact_patterns() -> Vec<Regex> {
    [
        r"(?i)(authorization: )([\w\-\.=:/+ ]+)",
        r"(?i)(cookie: )([^\r\n]+)",
        r"(?i)(x-api-key: |api[_-]?key: )([^\s]+)",
        r"(?i)([A-Z0-9_]*?(KEY|TOKEN|SECRET|PASSWORD)=)([^\s&;]+)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
}

/// Redacts values that look like credentials in a header line or query string.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}

/// Maps a parameter name to the header it is read from.
///
/// With `convert_underscores`, `x_request_id` becomes `x-request-id`.
pub fn header_wire_name(name: &str, convert_underscores: bool) -> String {
    if convert_underscores { name.replace('_', "-") } else { name.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_authorization_and_tokens() {
        assert_eq!(redact_sensitive("authorization: Bearer abc.def"), "authorization: <redacted>");
        assert_eq!(redact_sensitive("API_TOKEN=xyz&page=2"), "API_TOKEN=<redacted>&page=2");
        assert_eq!(redact_sensitive("accept: application/json"), "accept: application/json");
    }

    #[test]
    fn header_names_convert_underscores_on_request() {
        assert_eq!(header_wire_name("x_request_id", true), "x-request-id");
        assert_eq!(header_wire_name("x_request_id", false), "x_request_id");
    }
}
