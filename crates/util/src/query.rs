//! `application/x-www-form-urlencoded` decoding, shared by query strings and form bodies.

use url::form_urlencoded;

/// Decodes a query string or urlencoded body into ordered `(name, value)` pairs.
///
/// A leading `?` is ignored. Repeated names are kept in arrival order.
pub fn parse_pairs(input: &str) -> Vec<(String, String)> {
    let input = input.strip_prefix('?').unwrap_or(input);
    form_urlencoded::parse(input.as_bytes()).into_owned().collect()
}

/// Encodes pairs as an urlencoded string.
pub fn encode_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}
