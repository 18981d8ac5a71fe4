//! Responses produced by dispatch, and the error handlers return to pick a status.

use quay_engine::ResolutionError;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::warn;

/// An error a handler or dependant returns to answer with a specific status.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("HTTP {status}: {detail}")]
pub struct HttpError {
    pub status: u16,
    pub detail: Value,
    pub headers: Vec<(String, String)>,
}

impl HttpError {
    pub fn new(status: u16, detail: impl Into<Value>) -> Self {
        Self {
            status,
            detail: detail.into(),
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl Response {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body,
        }
    }

    pub fn detail(status: u16, detail: impl Into<Value>) -> Self {
        Self::json(status, json!({ "detail": detail.into() }))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Maps a failed resolution or handler call onto its response.
    pub fn from_error(error: &ResolutionError) -> Self {
        match error {
            ResolutionError::Validation(errors) => Self::json(422, errors.to_json_value()),
            ResolutionError::Unauthenticated {
                message,
                www_authenticate,
            } => {
                let response = Self::detail(401, message.as_str());
                match www_authenticate {
                    Some(challenge) => response.with_header("www-authenticate", challenge),
                    None => response,
                }
            }
            ResolutionError::Handler { callable, error } => match error.downcast_ref::<HttpError>() {
                Some(http) => {
                    let mut response = Self::detail(http.status, http.detail.clone());
                    response.headers.extend(http.headers.iter().cloned());
                    response
                }
                None => {
                    warn!(callable = %callable, error = %error, "unhandled handler error");
                    Self::detail(500, "Internal Server Error")
                }
            },
        }
    }
}
