//! Raw requests and the per-request context extractors read from.
//!
//! The context memoizes everything derived from the raw request: the parsed query string and
//! cookies, the body bytes (a single suspension point) and decoded form data.

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use async_trait::async_trait;
use indexmap::IndexMap;
use quay_util::{MediaType, parse_cookie_header, parse_multipart, parse_pairs};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{error::BodyReadError, typeinfo::UploadFile};

/// Supplies the request body bytes.
#[async_trait]
pub trait BodySource: Send + Sync {
    async fn read_all(&self) -> Result<Vec<u8>, BodyReadError>;
}

#[async_trait]
impl BodySource for Vec<u8> {
    async fn read_all(&self) -> Result<Vec<u8>, BodyReadError> {
        Ok(self.clone())
    }
}

/// A request as handed over by the transport and the route table.
#[derive(Clone)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub path_params: IndexMap<String, String>,
    pub body: Arc<dyn BodySource>,
}

impl RawRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path: path.into(),
            query: String::new(),
            headers: Vec::new(),
            path_params: IndexMap::new(),
            body: Arc::new(Vec::new()),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Arc::new(body);
        self
    }

    /// First header value with a case-insensitive name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for RawRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers.len())
            .field("path_params", &self.path_params)
            .finish_non_exhaustive()
    }
}

/// One value of a decoded form body.
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File(UploadFile),
}

/// Decoded urlencoded or multipart form fields, in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    entries: Vec<(String, FormValue)>,
}

impl FormData {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self {
            entries: pairs.into_iter().map(|(name, value)| (name, FormValue::Text(value))).collect(),
        }
    }

    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FormValue> + 'a {
        self.entries
            .iter()
            .filter(move |(candidate, _)| candidate == name)
            .map(|(_, value)| value)
    }

    /// Every text field as a pair, for object-style decoding.
    pub fn text_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter_map(|(name, value)| match value {
                FormValue::Text(text) => Some((name.clone(), text.clone())),
                FormValue::File(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a form body could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormDecodeError {
    Body(BodyReadError),
    Malformed(String),
}

/// Per-request view handed to extractors and security schemes.
pub struct RequestContext {
    raw: RawRequest,
    query: OnceLock<Vec<(String, String)>>,
    cookies: OnceLock<Vec<(String, String)>>,
    body: OnceCell<Result<Arc<[u8]>, BodyReadError>>,
    form: OnceCell<Result<FormData, FormDecodeError>>,
}

impl RequestContext {
    pub fn new(raw: RawRequest) -> Self {
        Self {
            raw,
            query: OnceLock::new(),
            cookies: OnceLock::new(),
            body: OnceCell::new(),
            form: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &RawRequest {
        &self.raw
    }

    pub fn method(&self) -> &str {
        &self.raw.method
    }

    pub fn path(&self) -> &str {
        &self.raw.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        self.query.get_or_init(|| parse_pairs(&self.raw.query))
    }

    /// Every query value for `name`, in wire order.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query_pairs()
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }

    /// Every header value for `name`, case-insensitively.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.raw
            .headers
            .iter()
            .filter(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn cookies(&self) -> &[(String, String)] {
        self.cookies.get_or_init(|| {
            self.raw
                .headers
                .iter()
                .filter(|(name, _)| name.eq_ignore_ascii_case("cookie"))
                .flat_map(|(_, value)| parse_cookie_header(value))
                .collect()
        })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.raw.path_params.get(name).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<MediaType> {
        self.header("content-type").and_then(MediaType::parse)
    }

    /// Reads the body once; later calls return the memoized bytes.
    pub async fn body(&self) -> Result<&[u8], BodyReadError> {
        let stored = self
            .body
            .get_or_init(|| async {
                let bytes = self.raw.body.read_all().await.map(Arc::<[u8]>::from);
                if let Ok(bytes) = &bytes {
                    debug!(path = %self.raw.path, bytes = bytes.len(), "read request body");
                }
                bytes
            })
            .await;
        match stored {
            Ok(bytes) => Ok(&bytes[..]),
            Err(error) => Err(error.clone()),
        }
    }

    /// Decodes the body as an urlencoded or multipart form, according to its content type.
    pub async fn form_data(&self) -> Result<&FormData, FormDecodeError> {
        let stored = self.form.get_or_init(|| self.decode_form()).await;
        stored.as_ref().map_err(Clone::clone)
    }

    async fn decode_form(&self) -> Result<FormData, FormDecodeError> {
        let media_type = self.content_type();
        let body = self.body().await.map_err(FormDecodeError::Body)?;
        match media_type {
            Some(media_type) if media_type.is_multipart_form() => {
                let boundary = media_type
                    .param("boundary")
                    .ok_or_else(|| FormDecodeError::Malformed("multipart content type has no boundary".into()))?;
                let parts = parse_multipart(body, boundary).map_err(|error| FormDecodeError::Malformed(error.to_string()))?;
                let entries = parts
                    .into_iter()
                    .map(|part| {
                        let value = if part.is_file() {
                            FormValue::File(UploadFile {
                                filename: part.filename,
                                content_type: part.content_type,
                                content: part.data,
                            })
                        } else {
                            FormValue::Text(String::from_utf8_lossy(&part.data).into_owned())
                        };
                        (part.name, value)
                    })
                    .collect();
                Ok(FormData { entries })
            }
            // Media type enforcement belongs to the extractor; anything else is read as urlencoded.
            _ => Ok(FormData::from_pairs(parse_pairs(&String::from_utf8_lossy(body)))),
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext").field("raw", &self.raw).finish_non_exhaustive()
    }
}
