//! Runtime extractors: read one declared value out of a request.

mod body;
mod coerce;
mod params;

use quay_types::ValidationErrors;
use serde_json::Value;

use crate::{
    marker::{BodyBinding, ParameterBinding},
    request::RequestContext,
};

/// Reads a value from the request as described by its binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Extractor {
    Parameter(ParameterBinding),
    Body(BodyBinding),
}

impl Extractor {
    /// Extracts and validates the value. All problems with this value are reported together.
    pub async fn extract(&self, context: &RequestContext) -> Result<Value, ValidationErrors> {
        match self {
            Self::Parameter(binding) => params::extract_parameter(binding, context),
            Self::Body(binding) => body::extract_body(binding, context).await,
        }
    }

    /// Declared name the value is passed under.
    pub fn name(&self) -> &str {
        match self {
            Self::Parameter(binding) => &binding.name,
            Self::Body(binding) => &binding.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parameter(binding) => binding.location.as_str(),
            Self::Body(binding) => binding.kind_name(),
        }
    }

    pub fn reads_body(&self) -> bool {
        matches!(self, Self::Body(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        marker::{Json, Marker, ParamMarker},
        request::RawRequest,
        typeinfo::TypeInfo,
    };
    use serde_json::json;

    #[tokio::test]
    async fn extractors_dispatch_on_their_binding() {
        let context = RequestContext::new(
            RawRequest::new("POST", "/")
                .with_query("limit=3")
                .with_header("content-type", "application/json")
                .with_body(br#"[1,2]"#.to_vec()),
        );

        let limit = Marker::from(ParamMarker::query()).extractor("limit", &TypeInfo::of::<u32>()).unwrap();
        assert_eq!(limit.kind(), "query");
        assert!(!limit.reads_body());
        assert_eq!(limit.extract(&context).await, Ok(json!(3)));

        let payload = Marker::from(Json::new()).extractor("payload", &TypeInfo::of::<Vec<i32>>()).unwrap();
        assert_eq!(payload.name(), "payload");
        assert!(payload.reads_body());
        assert_eq!(payload.extract(&context).await, Ok(json!([1, 2])));
    }
}
