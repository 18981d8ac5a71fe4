//! Buffered `multipart/form-data` decoding and encoding.

use thiserror::Error;
use tracing::debug;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    #[error("multipart body is missing the opening boundary")]
    MissingBoundary,
    #[error("multipart body ended before the closing boundary")]
    Unterminated,
    #[error("multipart part {index} has malformed headers")]
    MalformedHeaders { index: usize },
    #[error("multipart part {index} has no form-data name")]
    MissingName { index: usize },
}

/// One decoded part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl MultipartPart {
    /// A part is a file upload when it carries a filename.
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|position| position + from)
}

/// Decodes a complete multipart body delimited by `boundary`.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<MultipartPart>, MultipartError> {
    let opening = format!("--{boundary}").into_bytes();
    let delimiter = format!("\r\n--{boundary}").into_bytes();

    let start = find(body, &opening, 0).ok_or(MultipartError::MissingBoundary)?;
    let mut cursor = start + opening.len();
    let mut parts = Vec::new();

    loop {
        if body[cursor..].starts_with(b"--") {
            break;
        }
        if !body[cursor..].starts_with(CRLF) {
            return Err(MultipartError::Unterminated);
        }
        cursor += CRLF.len();

        let end = find(body, &delimiter, cursor).ok_or(MultipartError::Unterminated)?;
        let index = parts.len();
        parts.push(parse_part(&body[cursor..end], index)?);
        cursor = end + delimiter.len();
        if cursor > body.len() {
            return Err(MultipartError::Unterminated);
        }
    }

    debug!(part_count = parts.len(), "decoded multipart body");
    Ok(parts)
}

fn parse_part(raw: &[u8], index: usize) -> Result<MultipartPart, MultipartError> {
    let (head, data) = match find(raw, HEADER_END, 0) {
        Some(split) => (&raw[..split], &raw[split + HEADER_END.len()..]),
        // A part with headers and an empty body ends right after the header block.
        None if raw.ends_with(CRLF) => (&raw[..raw.len() - CRLF.len()], &raw[raw.len()..]),
        None => return Err(MultipartError::MalformedHeaders { index }),
    };
    let head = std::str::from_utf8(head).map_err(|_| MultipartError::MalformedHeaders { index })?;

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in head.split("\r\n").filter(|line| !line.trim().is_empty()) {
        let (header, value) = line.split_once(':').ok_or(MultipartError::MalformedHeaders { index })?;
        match header.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                for attribute in value.split(';').skip(1) {
                    let Some((key, raw_value)) = attribute.split_once('=') else {
                        continue;
                    };
                    let raw_value = raw_value.trim();
                    let unquoted = raw_value
                        .strip_prefix('"')
                        .and_then(|inner| inner.strip_suffix('"'))
                        .unwrap_or(raw_value)
                        .to_string();
                    match key.trim().to_ascii_lowercase().as_str() {
                        "name" => name = Some(unquoted),
                        "filename" => filename = Some(unquoted),
                        _ => {}
                    }
                }
            }
            "content-type" => content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Ok(MultipartPart {
        name: name.ok_or(MultipartError::MissingName { index })?,
        filename,
        content_type,
        data: data.to_vec(),
    })
}

/// Builds multipart bodies, used by the test client and the CLI.
#[derive(Debug, Clone)]
pub struct MultipartBuilder {
    boundary: String,
    parts: Vec<MultipartPart>,
}

impl MultipartBuilder {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            filename: None,
            content_type: None,
            data: value.into().into_bytes(),
        });
        self
    }

    pub fn file(mut self, name: impl Into<String>, filename: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.parts.push(MultipartPart {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: Some(content_type.into()),
            data,
        });
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for part in &self.parts {
            body.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{}\"", filename));
            }
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(CRLF);
            if let Some(content_type) = &part.content_type {
                body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
            }
            body.extend_from_slice(CRLF);
            body.extend_from_slice(&part.data);
            body.extend_from_slice(CRLF);
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        body
    }
}
