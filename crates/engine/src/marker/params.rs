use indexmap::IndexMap;
use quay_types::{ParamLocation, ParamStyle};
use quay_util::header_wire_name;
use serde_json::Value;

use crate::{
    error::BuildError,
    typeinfo::{Shape, TypeInfo},
};

/// Documentation-only options carried to the OpenAPI provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamDocs {
    pub description: Option<String>,
    pub examples: IndexMap<String, Value>,
    pub deprecated: Option<bool>,
}

/// Declares that a value is read from the query string, path, headers or cookies.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamMarker {
    location: ParamLocation,
    alias: Option<String>,
    style: Option<ParamStyle>,
    explode: Option<bool>,
    convert_underscores: bool,
    default: Option<Value>,
    docs: ParamDocs,
}

impl ParamMarker {
    fn at(location: ParamLocation) -> Self {
        Self {
            location,
            alias: None,
            style: None,
            explode: None,
            convert_underscores: true,
            default: None,
            docs: ParamDocs::default(),
        }
    }

    pub fn query() -> Self {
        Self::at(ParamLocation::Query)
    }

    pub fn path() -> Self {
        Self::at(ParamLocation::Path)
    }

    pub fn header() -> Self {
        Self::at(ParamLocation::Header)
    }

    pub fn cookie() -> Self {
        Self::at(ParamLocation::Cookie)
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn style(mut self, style: ParamStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn explode(mut self, explode: bool) -> Self {
        self.explode = Some(explode);
        self
    }

    /// Header parameters only: map `_` in the parameter name to `-`. On by default.
    pub fn convert_underscores(mut self, convert: bool) -> Self {
        self.convert_underscores = convert;
        self
    }

    /// Value used when the parameter is absent. Makes the parameter optional.
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.docs.description = Some(description.into());
        self
    }

    pub fn example(mut self, name: impl Into<String>, value: Value) -> Self {
        self.docs.examples.insert(name.into(), value);
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.docs.deprecated = Some(deprecated);
        self
    }

    pub fn location(&self) -> ParamLocation {
        self.location
    }

    pub fn docs(&self) -> &ParamDocs {
        &self.docs
    }

    /// Resolves the marker against a declared type into the binding shared by the
    /// extractor and the OpenAPI provider.
    pub(crate) fn bind(&self, name: &str, type_info: &TypeInfo) -> Result<ParameterBinding, BuildError> {
        let location = self.location;
        let style = self.style.unwrap_or_else(|| location.default_style());
        let explode = self.explode.unwrap_or_else(|| location.default_explode());

        if !style.allowed_in(location) {
            return Err(BuildError::InvalidStyle {
                name: name.to_string(),
                location,
                style,
            });
        }
        if style == ParamStyle::DeepObject && !type_info.shape().is_object() {
            return Err(BuildError::UnsupportedType {
                name: name.to_string(),
                reason: "deepObject style requires an object type".into(),
            });
        }
        if type_info.shape().is_upload() {
            return Err(BuildError::UnsupportedType {
                name: name.to_string(),
                reason: format!("file uploads cannot be read from the {}", location),
            });
        }

        let required = self.default.is_none() && !type_info.accepts_null();
        if location == ParamLocation::Path && !required {
            return Err(BuildError::OptionalPathParameter { name: name.to_string() });
        }

        let wire_name = match (&self.alias, location) {
            (Some(alias), _) => alias.clone(),
            (None, ParamLocation::Header) => header_wire_name(name, self.convert_underscores),
            (None, _) => name.to_string(),
        };

        Ok(ParameterBinding {
            name: name.to_string(),
            wire_name,
            location,
            style,
            explode,
            required,
            default: self.default.clone(),
            type_info: type_info.clone(),
        })
    }
}

/// Everything both halves of a parameter need: where to read it and how to decode it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    /// Declared parameter name, the key in the callable's arguments.
    pub name: String,
    /// Name on the wire, after alias and header conversion.
    pub wire_name: String,
    pub location: ParamLocation,
    pub style: ParamStyle,
    pub explode: bool,
    pub required: bool,
    pub default: Option<Value>,
    pub type_info: TypeInfo,
}

impl ParameterBinding {
    pub fn shape(&self) -> &Shape {
        self.type_info.shape()
    }

    /// Value used when the parameter is absent and not required.
    pub fn absent_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }

    /// Whether two declarations of the same wire parameter decode identically.
    pub fn same_contract(&self, other: &ParameterBinding) -> bool {
        self.location == other.location
            && self.wire_name == other.wire_name
            && self.style == other.style
            && self.explode == other.explode
            && self.required == other.required
            && self.default == other.default
            && self.type_info == other.type_info
    }
}
