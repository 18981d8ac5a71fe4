//! Aggregated validation failures.
//!
//! Every field-level failure found while extracting one request is collected into a
//! [`ValidationErrors`] value, serialized as `{"detail": [{location, message, type}, ...]}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of an error location: a key such as `"query"` or `"limit"`, or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationItem {
    Key(String),
    Index(usize),
}

impl From<&str> for LocationItem {
    fn from(value: &str) -> Self {
        Self::Key(value.to_string())
    }
}

impl From<String> for LocationItem {
    fn from(value: String) -> Self {
        Self::Key(value)
    }
}

impl From<usize> for LocationItem {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl fmt::Display for LocationItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Stable machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    Missing,
    IntParsing,
    FloatParsing,
    BoolParsing,
    JsonInvalid,
    ValueError,
    UnsupportedMediaType,
    BodyRead,
}

impl ValidationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::IntParsing => "int_parsing",
            Self::FloatParsing => "float_parsing",
            Self::BoolParsing => "bool_parsing",
            Self::JsonInvalid => "json_invalid",
            Self::ValueError => "value_error",
            Self::UnsupportedMediaType => "unsupported_media_type",
            Self::BodyRead => "body_read",
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationErrorEntry {
    pub location: Vec<LocationItem>,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: ValidationErrorKind,
}

impl ValidationErrorEntry {
    pub fn new<I, L>(location: I, message: impl Into<String>, kind: ValidationErrorKind) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LocationItem>,
    {
        Self {
            location: location.into_iter().map(Into::into).collect(),
            message: message.into(),
            kind,
        }
    }

    /// Shorthand for a required value that was not supplied.
    pub fn missing<I, L>(location: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LocationItem>,
    {
        Self::new(location, "Field required", ValidationErrorKind::Missing)
    }

    /// Dotted rendering of the location, for logs.
    pub fn location_path(&self) -> String {
        self.location.iter().map(ToString::to_string).collect::<Vec<_>>().join(".")
    }
}

/// All validation failures of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    entries: Vec<ValidationErrorEntry>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(entry: ValidationErrorEntry) -> Self {
        Self { entries: vec![entry] }
    }

    /// Adds an entry unless an identical one was already recorded.
    ///
    /// A dependant shared by several parents reports its failures once.
    pub fn push(&mut self, entry: ValidationErrorEntry) {
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        for entry in other.entries {
            self.push(entry);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ValidationErrorEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationErrorEntry> {
        self.entries.iter()
    }

    /// Converts the failures into the `422` response payload.
    pub fn to_json_value(&self) -> Value {
        serde_json::json!({ "detail": self.entries })
    }
}

impl From<ValidationErrorEntry> for ValidationErrors {
    fn from(entry: ValidationErrorEntry) -> Self {
        Self::single(entry)
    }
}

impl FromIterator<ValidationErrorEntry> for ValidationErrors {
    fn from_iter<T: IntoIterator<Item = ValidationErrorEntry>>(iter: T) -> Self {
        let mut errors = Self::new();
        for entry in iter {
            errors.push(entry);
        }
        errors
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationErrorEntry;
    type IntoIter = std::vec::IntoIter<ValidationErrorEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .entries
            .iter()
            .map(|entry| format!("{}: {} ({})", entry.location_path(), entry.message, entry.kind))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}
