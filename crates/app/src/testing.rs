//! In-process test client driving an [`App`] without a transport.

use std::sync::Arc;

use quay_engine::{RawRequest, ResolutionError};
use quay_util::{MultipartBuilder, encode_pairs};
use serde_json::Value;

use crate::{app::App, response::Response};

pub struct TestClient {
    app: Arc<App>,
}

impl TestClient {
    pub fn new(app: App) -> Self {
        Self { app: Arc::new(app) }
    }

    /// Wraps `app` and runs its startup, as entering the app's lifespan would.
    pub async fn start(app: App) -> Result<Self, ResolutionError> {
        app.startup().await?;
        Ok(Self::new(app))
    }

    /// Runs the app's shutdown.
    pub async fn close(self) {
        self.app.shutdown().await;
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn get(&self, path: &str) -> TestRequest<'_> {
        self.request("GET", path)
    }

    pub fn post(&self, path: &str) -> TestRequest<'_> {
        self.request("POST", path)
    }

    pub fn put(&self, path: &str) -> TestRequest<'_> {
        self.request("PUT", path)
    }

    pub fn delete(&self, path: &str) -> TestRequest<'_> {
        self.request("DELETE", path)
    }

    /// A request for `path`, which may carry a `?query` suffix.
    pub fn request(&self, method: &str, path: &str) -> TestRequest<'_> {
        let (path, query) = path.split_once('?').unwrap_or((path, ""));
        TestRequest {
            client: self,
            raw: RawRequest::new(method, path),
            query: query.to_string(),
            cookies: Vec::new(),
        }
    }
}

pub struct TestRequest<'a> {
    client: &'a TestClient,
    raw: RawRequest,
    query: String,
    cookies: Vec<(String, String)>,
}

impl TestRequest<'_> {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw.headers.push((name.into(), value.into()));
        self
    }

    /// Appends an encoded query pair.
    pub fn query(mut self, name: &str, value: &str) -> Self {
        let pair = encode_pairs([(name, value)]);
        if self.query.is_empty() {
            self.query = pair;
        } else {
            self.query = format!("{}&{}", self.query, pair);
        }
        self
    }

    /// Appends a query string as-is, for wire shapes `query` would escape.
    pub fn raw_query(mut self, query: &str) -> Self {
        if self.query.is_empty() {
            self.query = query.to_string();
        } else {
            self.query = format!("{}&{}", self.query, query);
        }
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Sends `value` as an `application/json` body.
    pub fn json(self, value: &Value) -> Self {
        self.body(value.to_string().into_bytes(), "application/json")
    }

    /// Sends urlencoded form pairs.
    pub fn form(self, pairs: &[(&str, &str)]) -> Self {
        let encoded = encode_pairs(pairs.iter().copied());
        self.body(encoded.into_bytes(), "application/x-www-form-urlencoded")
    }

    pub fn multipart(self, builder: &MultipartBuilder) -> Self {
        self.body(builder.build(), builder.content_type())
    }

    pub fn body(mut self, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.raw.headers.push(("content-type".into(), content_type.into()));
        self.raw.body = Arc::new(bytes);
        self
    }

    /// Sends raw bytes without a content type.
    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.raw.body = Arc::new(bytes);
        self
    }

    pub async fn send(self) -> TestResponse {
        let mut raw = self.raw.with_query(self.query);
        if !self.cookies.is_empty() {
            let header = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            raw.headers.push(("cookie".into(), header));
        }
        self.client.app.dispatch(raw).await.into()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> &Value {
        &self.body
    }
}

impl From<Response> for TestResponse {
    fn from(response: Response) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
        }
    }
}
