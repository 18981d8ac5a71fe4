//! Error types raised while building dependant graphs and resolving requests.

use std::sync::Arc;

use quay_types::{ParamLocation, ParamStyle, ValidationErrors};
use thiserror::Error;

/// Declaration mistakes detected when a route is registered.
///
/// These never reach request handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("'{dependant}' is app-scoped but depends on request-scoped '{dependency}'")]
    ScopeMismatch { dependant: String, dependency: String },
    #[error("'{callable}' declares parameter '{name}' more than once")]
    DuplicateParameter { callable: String, name: String },
    #[error("{location} parameter '{wire_name}' is declared with conflicting definitions")]
    ConflictingParameter { location: ParamLocation, wire_name: String },
    #[error("route reads the request body through both '{first}' and '{second}'")]
    ConflictingBody { first: String, second: String },
    #[error("path parameter '{name}' cannot be optional")]
    OptionalPathParameter { name: String },
    #[error("style '{style}' is not valid for {location} parameter '{name}'")]
    InvalidStyle {
        name: String,
        location: ParamLocation,
        style: ParamStyle,
    },
    #[error("parameter '{name}' has an unsupported type: {reason}")]
    UnsupportedType { name: String, reason: String },
    #[error("API key name of security scheme '{scheme}' must come from an app-scoped dependency")]
    DeferredNameScope { scheme: String },
    #[error("'{dependant}' depends on a callable slot that was never filled")]
    UnfilledSlot { dependant: String },
}

/// Failure to read the raw request body from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to read request body: {message}")]
pub struct BodyReadError {
    pub message: String,
}

impl BodyReadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Outcome of a failed resolution pass.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    /// Every field-level failure collected during the pass.
    #[error("request validation failed: {0}")]
    Validation(ValidationErrors),
    /// A security scheme with `auto_error` rejected the request.
    #[error("{message}")]
    Unauthenticated {
        message: String,
        www_authenticate: Option<String>,
    },
    /// A dependant's callable returned an error; it is passed through untouched.
    #[error("'{callable}' failed: {error}")]
    Handler { callable: String, error: Arc<anyhow::Error> },
}

impl ResolutionError {
    /// The HTTP status this failure maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 422,
            Self::Unauthenticated { .. } => 401,
            Self::Handler { .. } => 500,
        }
    }
}

/// Typed access to a resolved argument failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("no argument named '{0}'")]
    Missing(String),
    #[error("argument '{name}' cannot be read as the requested type: {message}")]
    Type { name: String, message: String },
}
