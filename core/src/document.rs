use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display};
use thiserror::Error;

/// Metadata key holding the [`SourceKind`] of a document.
pub const SOURCE_KIND_KEY: &str = "source_kind";
/// Metadata key holding the collection-unique identifier of a document.
pub const SOURCE_ID_KEY: &str = "source_id";

/// Scalar metadata value attached to a [`Document`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// Equality used by metadata filters: numbers compare by value, so `95` matches `95.0`.
    pub fn matches(&self, other: &MetadataValue) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                #[allow(clippy::cast_precision_loss)]
                let a = *a as f64;
                a == *b
            }
            _ => self == other,
        }
    }

    /// Parse a raw table cell, preferring integer, then float, then bool, then plain text.
    pub fn parse_cell(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Some(Self::Integer(i));
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.is_finite() {
                return Some(Self::Float(f));
            }
        }
        match raw {
            "true" | "True" | "TRUE" => Some(Self::Bool(true)),
            "false" | "False" | "FALSE" => Some(Self::Bool(false)),
            _ => Some(Self::String(raw.to_string())),
        }
    }

    /// Convert a JSON scalar; `null`, arrays and objects have no metadata form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Document metadata, keyed by field name
pub type Metadata = BTreeMap<String, MetadataValue>;

/// The kind of record a document was produced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Nutrition,
    Profile,
    Chat,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [Self::Nutrition, Self::Profile, Self::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nutrition => "nutrition",
            Self::Profile => "profile",
            Self::Chat => "chat",
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Document text is empty")]
    EmptyText,
    #[error("Document source id is empty")]
    EmptySourceId,
}

/// A normalized, immutable unit of retrievable content.
///
/// The `source_kind` and `source_id` are always mirrored into the metadata so
/// that they can be used in search filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    text: String,
    metadata: Metadata,
    source_kind: SourceKind,
    source_id: String,
}

impl Document {
    /// Creates a document, stamping `source_kind` and `source_id` into `metadata`.
    ///
    /// # Errors
    /// Fails if the text or the source id is empty (after trimming whitespace).
    pub fn new(
        source_kind: SourceKind,
        source_id: impl Into<String>,
        text: impl Into<String>,
        mut metadata: Metadata,
    ) -> Result<Self, DocumentError> {
        let text = text.into();
        let source_id = source_id.into();
        if text.trim().is_empty() {
            return Err(DocumentError::EmptyText);
        }
        if source_id.trim().is_empty() {
            return Err(DocumentError::EmptySourceId);
        }
        metadata.insert(SOURCE_KIND_KEY.to_string(), source_kind.as_str().into());
        metadata.insert(SOURCE_ID_KEY.to_string(), source_id.clone().into());
        Ok(Self {
            text,
            metadata,
            source_kind,
            source_id,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_identity_into_metadata() {
        let doc = Document::new(SourceKind::Nutrition, "food_0", "Food: Apple.", Metadata::new())
            .unwrap();
        assert_eq!(
            doc.metadata().get(SOURCE_KIND_KEY),
            Some(&MetadataValue::from("nutrition"))
        );
        assert_eq!(
            doc.metadata().get(SOURCE_ID_KEY),
            Some(&MetadataValue::from("food_0"))
        );
    }

    #[test]
    fn test_identity_overrides_caller_metadata() {
        let metadata = Metadata::from([(SOURCE_KIND_KEY.to_string(), "chat".into())]);
        let doc = Document::new(SourceKind::Profile, "profile_1", "User profile", metadata).unwrap();
        assert_eq!(
            doc.metadata().get(SOURCE_KIND_KEY),
            Some(&MetadataValue::from("profile"))
        );
    }

    #[test]
    fn test_rejects_empty_text_and_id() {
        assert_eq!(
            Document::new(SourceKind::Chat, "m1", "   ", Metadata::new()).unwrap_err(),
            DocumentError::EmptyText
        );
        assert_eq!(
            Document::new(SourceKind::Chat, "", "hi", Metadata::new()).unwrap_err(),
            DocumentError::EmptySourceId
        );
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(MetadataValue::parse_cell("95"), Some(MetadataValue::Integer(95)));
        assert_eq!(MetadataValue::parse_cell(" 0.3 "), Some(MetadataValue::Float(0.3)));
        assert_eq!(MetadataValue::parse_cell("Apple"), Some("Apple".into()));
        assert_eq!(MetadataValue::parse_cell(""), None);
        assert_eq!(MetadataValue::parse_cell("NaN"), Some("NaN".into()));
    }

    #[test]
    fn test_numeric_matching() {
        assert!(MetadataValue::Integer(95).matches(&MetadataValue::Float(95.0)));
        assert!(!MetadataValue::Integer(95).matches(&MetadataValue::from("95")));
        assert!(MetadataValue::from("nutrition").matches(&MetadataValue::from("nutrition")));
    }

    #[test]
    fn test_metadata_value_json_shape() {
        let json = serde_json::to_string(&MetadataValue::Integer(3)).unwrap();
        assert_eq!(json, "3");
        let back: MetadataValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(back, MetadataValue::Float(2.5));
        let back: MetadataValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(back, MetadataValue::from("x"));
    }
}
