use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use quay_types::ParamStyle;
use quay_util::media_type::{APPLICATION_JSON, FORM_URLENCODED, MULTIPART_FORM_DATA};
use serde_json::Value;

use crate::{
    error::BuildError,
    typeinfo::{ScalarKind, Shape, TypeInfo},
};

type DecodeFn = dyn Fn(&[u8]) -> Result<Value, String> + Send + Sync;

/// Turns JSON body bytes into a value. Defaults to `serde_json`.
#[derive(Clone)]
pub struct JsonDecoder {
    name: &'static str,
    decode: Arc<DecodeFn>,
}

impl JsonDecoder {
    pub fn new<F>(name: &'static str, decode: F) -> Self
    where
        F: Fn(&[u8]) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name,
            decode: Arc::new(decode),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Value, String> {
        (self.decode)(bytes)
    }
}

impl Default for JsonDecoder {
    fn default() -> Self {
        Self::new("serde_json", |bytes| serde_json::from_slice(bytes).map_err(|error| error.to_string()))
    }
}

/// Decoders are identified by name.
impl PartialEq for JsonDecoder {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for JsonDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JsonDecoder").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyDocs {
    pub description: Option<String>,
    pub examples: IndexMap<String, Value>,
}

/// Body read as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Json {
    decoder: JsonDecoder,
    enforce_media_type: bool,
    docs: BodyDocs,
}

impl Json {
    pub fn new() -> Self {
        Self {
            decoder: JsonDecoder::default(),
            enforce_media_type: true,
            docs: BodyDocs::default(),
        }
    }

    pub fn decoder(mut self, decoder: JsonDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn enforce_media_type(mut self, enforce: bool) -> Self {
        self.enforce_media_type = enforce;
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
}

impl Default for Json {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    #[default]
    Binary,
    Base64,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Base64 => "base64",
        }
    }
}

/// Raw body read as an uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    media_type: Option<String>,
    enforce_media_type: bool,
    format: FileFormat,
    docs: BodyDocs,
}

impl File {
    pub fn new() -> Self {
        Self {
            media_type: None,
            enforce_media_type: true,
            format: FileFormat::Binary,
            docs: BodyDocs::default(),
        }
    }

    /// Accepted media type; `*` wildcards are allowed (`image/*`).
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn enforce_media_type(mut self, enforce: bool) -> Self {
        self.enforce_media_type = enforce;
        self
    }

    pub fn format(mut self, format: FileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.docs.description = Some(description.into());
        self
    }
}

impl Default for File {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormEncoding {
    UrlEncoded,
    Multipart,
}

impl FormEncoding {
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::UrlEncoded => FORM_URLENCODED,
            Self::Multipart => MULTIPART_FORM_DATA,
        }
    }
}

/// A form field decoded with an OpenAPI style, like a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FormEncodedField {
    alias: Option<String>,
    style: ParamStyle,
    explode: bool,
}

impl FormEncodedField {
    pub fn new() -> Self {
        Self {
            alias: None,
            style: ParamStyle::Form,
            explode: true,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn style(mut self, style: ParamStyle) -> Self {
        self.style = style;
        self
    }

    pub fn explode(mut self, explode: bool) -> Self {
        self.explode = explode;
        self
    }
}

impl Default for FormEncodedField {
    fn default() -> Self {
        Self::new()
    }
}

/// A single raw form value, text or file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormField {
    alias: Option<String>,
}

impl FormField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Every value sent under one field name, as a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepeatedFormField {
    alias: Option<String>,
}

impl RepeatedFormField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// An uploaded file part of a multipart form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormFile {
    alias: Option<String>,
    media_type: Option<String>,
}

impl FormFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// How one property of a form model is read.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMarker {
    Encoded(FormEncodedField),
    Field(FormField),
    Repeated(RepeatedFormField),
    File(FormFile),
}

impl From<FormEncodedField> for FieldMarker {
    fn from(value: FormEncodedField) -> Self {
        Self::Encoded(value)
    }
}

impl From<FormField> for FieldMarker {
    fn from(value: FormField) -> Self {
        Self::Field(value)
    }
}

impl From<RepeatedFormField> for FieldMarker {
    fn from(value: RepeatedFormField) -> Self {
        Self::Repeated(value)
    }
}

impl From<FormFile> for FieldMarker {
    fn from(value: FormFile) -> Self {
        Self::File(value)
    }
}

/// Body read as a form into an object model.
#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    encoding: FormEncoding,
    enforce_media_type: bool,
    fields: IndexMap<String, FieldMarker>,
    docs: BodyDocs,
}

impl Form {
    pub fn urlencoded() -> Self {
        Self::with_encoding(FormEncoding::UrlEncoded)
    }

    pub fn multipart() -> Self {
        Self::with_encoding(FormEncoding::Multipart)
    }

    fn with_encoding(encoding: FormEncoding) -> Self {
        Self {
            encoding,
            enforce_media_type: true,
            fields: IndexMap::new(),
            docs: BodyDocs::default(),
        }
    }

    /// Overrides how the model property `property` is read.
    pub fn field(mut self, property: impl Into<String>, marker: impl Into<FieldMarker>) -> Self {
        self.fields.insert(property.into(), marker.into());
        self
    }

    pub fn enforce_media_type(mut self, enforce: bool) -> Self {
        self.enforce_media_type = enforce;
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
}

/// A body read as JSON, a file or a form.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyMarker {
    Json(Json),
    File(File),
    Form(Form),
}

impl From<Json> for BodyMarker {
    fn from(value: Json) -> Self {
        Self::Json(value)
    }
}

impl From<File> for BodyMarker {
    fn from(value: File) -> Self {
        Self::File(value)
    }
}

impl From<Form> for BodyMarker {
    fn from(value: Form) -> Self {
        Self::Form(value)
    }
}

impl BodyMarker {
    pub fn docs(&self) -> &BodyDocs {
        match self {
            Self::Json(json) => &json.docs,
            Self::File(file) => &file.docs,
            Self::Form(form) => &form.docs,
        }
    }

    pub(crate) fn bind(&self, name: &str, type_info: &TypeInfo) -> Result<BodyBinding, BuildError> {
        let kind = match self {
            Self::Json(json) => BodyKind::Json {
                decoder: json.decoder.clone(),
                enforce_media_type: json.enforce_media_type,
            },
            Self::File(file) => {
                if !matches!(type_info.shape(), Shape::Scalar(ScalarKind::Upload | ScalarKind::String | ScalarKind::Any)) {
                    return Err(BuildError::UnsupportedType {
                        name: name.to_string(),
                        reason: "file bodies must be declared as an upload or as text".into(),
                    });
                }
                BodyKind::File {
                    media_type: file.media_type.clone(),
                    enforce_media_type: file.enforce_media_type,
                    format: file.format,
                }
            }
            Self::Form(form) => BodyKind::Form {
                encoding: form.encoding,
                enforce_media_type: form.enforce_media_type,
                fields: bind_form_fields(name, form, type_info)?,
            },
        };

        Ok(BodyBinding {
            name: name.to_string(),
            required: !type_info.accepts_null(),
            type_info: type_info.clone(),
            kind,
        })
    }
}

fn bind_form_fields(name: &str, form: &Form, type_info: &TypeInfo) -> Result<IndexMap<String, FormFieldBinding>, BuildError> {
    let Shape::Object { properties, required } = type_info.shape() else {
        return Err(BuildError::UnsupportedType {
            name: name.to_string(),
            reason: "form bodies must be declared as an object model".into(),
        });
    };

    if let Some(unknown) = form.fields.keys().find(|property| !properties.contains_key(*property)) {
        return Err(BuildError::UnsupportedType {
            name: name.to_string(),
            reason: format!("form field marker targets unknown property '{}'", unknown),
        });
    }

    let mut fields = IndexMap::new();
    for (property, shape) in properties {
        let marker = form.fields.get(property).cloned().unwrap_or_else(|| infer_field_marker(shape));
        let (alias, kind) = match marker {
            FieldMarker::Encoded(field) => {
                if !matches!(field.style, ParamStyle::Form | ParamStyle::SpaceDelimited | ParamStyle::PipeDelimited | ParamStyle::DeepObject) {
                    return Err(BuildError::InvalidStyle {
                        name: property.clone(),
                        location: quay_types::ParamLocation::Query,
                        style: field.style,
                    });
                }
                (
                    field.alias,
                    FieldKind::Encoded {
                        style: field.style,
                        explode: field.explode,
                    },
                )
            }
            FieldMarker::Field(field) => (field.alias, FieldKind::Single),
            FieldMarker::Repeated(field) => (field.alias, FieldKind::Repeated),
            FieldMarker::File(field) => {
                if form.encoding != FormEncoding::Multipart {
                    return Err(BuildError::UnsupportedType {
                        name: property.clone(),
                        reason: "file fields require a multipart form".into(),
                    });
                }
                (field.alias, FieldKind::File { media_type: field.media_type })
            }
        };
        fields.insert(
            property.clone(),
            FormFieldBinding {
                property: property.clone(),
                wire_name: alias.unwrap_or_else(|| property.clone()),
                kind,
                shape: shape.clone(),
                required: required.contains(property),
            },
        );
    }
    Ok(fields)
}

fn infer_field_marker(shape: &Shape) -> FieldMarker {
    if shape.is_upload() {
        return FieldMarker::File(FormFile::new());
    }
    FieldMarker::Encoded(FormEncodedField::new())
}

/// Body dispatched on the request content type to one of several variants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentTypeDiscriminated {
    variants: Vec<(BodyMarker, TypeInfo)>,
    docs: BodyDocs,
}

impl ContentTypeDiscriminated {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variant read with `marker` and validated as `T`. Order decides ties.
    pub fn variant<T>(mut self, marker: impl Into<BodyMarker>) -> Self
    where
        T: serde::de::DeserializeOwned + serde::Serialize + schemars::JsonSchema + 'static,
    {
        self.variants.push((marker.into(), TypeInfo::of::<T>()));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.docs.description = Some(description.into());
        self
    }

    pub fn docs(&self) -> &BodyDocs {
        &self.docs
    }

    pub(crate) fn bind(&self, name: &str, type_info: &TypeInfo) -> Result<BodyBinding, BuildError> {
        if self.variants.is_empty() {
            return Err(BuildError::UnsupportedType {
                name: name.to_string(),
                reason: "content-type discriminated body has no variants".into(),
            });
        }
        let variants = self
            .variants
            .iter()
            .map(|(marker, variant_type)| marker.bind(name, variant_type))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BodyBinding {
            name: name.to_string(),
            required: !type_info.accepts_null(),
            type_info: type_info.clone(),
            kind: BodyKind::Discriminated { variants },
        })
    }
}

/// How one form property is read from the decoded form.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Encoded { style: ParamStyle, explode: bool },
    Single,
    Repeated,
    File { media_type: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormFieldBinding {
    pub property: String,
    pub wire_name: String,
    pub kind: FieldKind,
    pub shape: Shape,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyKind {
    Json {
        decoder: JsonDecoder,
        enforce_media_type: bool,
    },
    File {
        media_type: Option<String>,
        enforce_media_type: bool,
        format: FileFormat,
    },
    Form {
        encoding: FormEncoding,
        enforce_media_type: bool,
        fields: IndexMap<String, FormFieldBinding>,
    },
    Discriminated {
        variants: Vec<BodyBinding>,
    },
}

/// A request body bound to its declared type; shared by extractor and provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyBinding {
    pub name: String,
    pub required: bool,
    pub type_info: TypeInfo,
    pub kind: BodyKind,
}

impl BodyBinding {
    /// The media type this body is documented under and matched against.
    pub fn media_type(&self) -> &str {
        match &self.kind {
            BodyKind::Json { .. } => APPLICATION_JSON,
            BodyKind::File { media_type, .. } => media_type.as_deref().unwrap_or("*/*"),
            BodyKind::Form { encoding, .. } => encoding.media_type(),
            BodyKind::Discriminated { .. } => "*/*",
        }
    }

    /// Whether two declarations of the request body decode and document identically.
    pub fn same_contract(&self, other: &BodyBinding) -> bool {
        if self.required != other.required || self.type_info != other.type_info {
            return false;
        }
        match (&self.kind, &other.kind) {
            (BodyKind::Discriminated { variants: ours }, BodyKind::Discriminated { variants: theirs }) => {
                ours.len() == theirs.len() && ours.iter().zip(theirs).all(|(a, b)| a.same_contract(b))
            }
            (ours, theirs) => ours == theirs,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            BodyKind::Json { .. } => "json",
            BodyKind::File { .. } => "file",
            BodyKind::Form {
                encoding: FormEncoding::UrlEncoded,
                ..
            } => "form",
            BodyKind::Form {
                encoding: FormEncoding::Multipart,
                ..
            } => "multipart",
            BodyKind::Discriminated { .. } => "discriminated",
        }
    }
}
