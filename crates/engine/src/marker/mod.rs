//! Declarative parameter markers.
//!
//! A marker only describes where a value comes from and how it is decoded. Both of its
//! factories resolve the marker against the declared type through the same `bind` step, so an
//! extractor and its OpenAPI provider always agree on location, name, style and requiredness.

pub mod body;
pub mod params;

pub use body::{
    BodyBinding, BodyDocs, BodyKind, BodyMarker, ContentTypeDiscriminated, FieldKind, FieldMarker, File, FileFormat, Form,
    FormEncodedField, FormEncoding, FormField, FormFieldBinding, FormFile, Json, JsonDecoder, RepeatedFormField,
};
pub use params::{ParamDocs, ParamMarker, ParameterBinding};

use crate::{
    error::BuildError,
    extract::Extractor,
    openapi::{BodyProvider, OpenApiProvider, ParameterProvider},
    typeinfo::TypeInfo,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    Param(ParamMarker),
    Body(BodyMarker),
    Discriminated(ContentTypeDiscriminated),
}

impl From<ParamMarker> for Marker {
    fn from(value: ParamMarker) -> Self {
        Self::Param(value)
    }
}

impl From<BodyMarker> for Marker {
    fn from(value: BodyMarker) -> Self {
        Self::Body(value)
    }
}

impl From<Json> for Marker {
    fn from(value: Json) -> Self {
        Self::Body(value.into())
    }
}

impl From<File> for Marker {
    fn from(value: File) -> Self {
        Self::Body(value.into())
    }
}

impl From<Form> for Marker {
    fn from(value: Form) -> Self {
        Self::Body(value.into())
    }
}

impl From<ContentTypeDiscriminated> for Marker {
    fn from(value: ContentTypeDiscriminated) -> Self {
        Self::Discriminated(value)
    }
}

impl Marker {
    /// Builds the runtime extractor for a parameter `name` of type `type_info`.
    pub fn extractor(&self, name: &str, type_info: &TypeInfo) -> Result<Extractor, BuildError> {
        Ok(match self {
            Self::Param(marker) => Extractor::Parameter(marker.bind(name, type_info)?),
            Self::Body(marker) => Extractor::Body(marker.bind(name, type_info)?),
            Self::Discriminated(marker) => Extractor::Body(marker.bind(name, type_info)?),
        })
    }

    /// Builds the OpenAPI provider documenting exactly what [`Marker::extractor`] enforces.
    pub fn openapi_provider(&self, name: &str, type_info: &TypeInfo) -> Result<OpenApiProvider, BuildError> {
        Ok(match self {
            Self::Param(marker) => OpenApiProvider::Parameter(ParameterProvider {
                binding: marker.bind(name, type_info)?,
                docs: marker.docs().clone(),
            }),
            Self::Body(marker) => OpenApiProvider::Body(BodyProvider {
                binding: marker.bind(name, type_info)?,
                docs: marker.docs().clone(),
            }),
            Self::Discriminated(marker) => OpenApiProvider::Body(BodyProvider {
                binding: marker.bind(name, type_info)?,
                docs: marker.docs().clone(),
            }),
        })
    }
}
