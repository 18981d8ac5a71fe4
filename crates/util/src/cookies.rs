//! `Cookie` request header decoding.

use percent_encoding::percent_decode_str;

/// Splits a `Cookie` header into `(name, value)` pairs, percent-decoding values.
///
/// Malformed crumbs without `=` are skipped; surrounding double quotes are removed.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|crumb| {
            let (name, value) = crumb.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(value);
            Some((name.to_string(), percent_decode_str(value).decode_utf8_lossy().into_owned()))
        })
        .collect()
}
