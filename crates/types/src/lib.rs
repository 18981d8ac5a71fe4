//! Shared type definitions for the Quay request-handling core.
//!
//! - [`openapi`]: the OpenAPI 3.0 document model emitted by providers and the document builder
//! - [`validation`]: the aggregated validation failure wire shape
//! - parameter location and serialization style enums shared by markers, extractors and providers

use std::{error::Error, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod openapi;
pub mod validation;

pub use openapi::{
    Components, EncodingObject, ExampleObject, Info, MediaTypeObject, OAuthFlow, OAuthFlows, OpenApiDocument, Operation,
    ParameterObject, PathItem, RequestBodyObject, ResponseObject, SecurityRequirement, SecuritySchemeObject,
};
pub use validation::{LocationItem, ValidationErrorEntry, ValidationErrorKind, ValidationErrors};

/// The OpenAPI version string emitted in every generated document.
pub const OPENAPI_VERSION: &str = "3.0.3";

/// Where a non-body parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Path,
    Header,
    Cookie,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Path => "path",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }

    /// The serialization style used when a marker does not set one.
    pub fn default_style(&self) -> ParamStyle {
        match self {
            Self::Query | Self::Cookie => ParamStyle::Form,
            Self::Path | Self::Header => ParamStyle::Simple,
        }
    }

    /// The explode flag used when a marker does not set one.
    pub fn default_explode(&self) -> bool {
        matches!(self, Self::Query | Self::Cookie)
    }
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collection serialization style as defined by the OpenAPI parameter object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamStyle {
    Form,
    Simple,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
    Label,
    Matrix,
}

impl ParamStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Simple => "simple",
            Self::SpaceDelimited => "spaceDelimited",
            Self::PipeDelimited => "pipeDelimited",
            Self::DeepObject => "deepObject",
            Self::Label => "label",
            Self::Matrix => "matrix",
        }
    }

    /// Whether OpenAPI allows this style for parameters in `location`.
    pub fn allowed_in(&self, location: ParamLocation) -> bool {
        match location {
            ParamLocation::Query => matches!(self, Self::Form | Self::SpaceDelimited | Self::PipeDelimited | Self::DeepObject),
            ParamLocation::Path => matches!(self, Self::Simple | Self::Label | Self::Matrix),
            ParamLocation::Header => matches!(self, Self::Simple),
            ParamLocation::Cookie => matches!(self, Self::Form),
        }
    }

    /// Separator used for non-exploded sequences.
    pub fn delimiter(&self) -> char {
        match self {
            Self::SpaceDelimited => ' ',
            Self::PipeDelimited => '|',
            _ => ',',
        }
    }
}

impl fmt::Display for ParamStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStyleError(String);

impl fmt::Display for ParseStyleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown parameter style '{}'", self.0)
    }
}

impl Error for ParseStyleError {}

impl FromStr for ParamStyle {
    type Err = ParseStyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "form" => Ok(Self::Form),
            "simple" => Ok(Self::Simple),
            "spaceDelimited" => Ok(Self::SpaceDelimited),
            "pipeDelimited" => Ok(Self::PipeDelimited),
            "deepObject" => Ok(Self::DeepObject),
            "label" => Ok(Self::Label),
            "matrix" => Ok(Self::Matrix),
            other => Err(ParseStyleError(other.to_string())),
        }
    }
}
