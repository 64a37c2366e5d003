//! Image records as seen by a migration.

use std::fmt;

use serde_json::Value;

/// Backend-specific identity of an image record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordId {
    /// Distinguished name of a UFDS entry.
    Dn(String),
    /// Filename of a local database record (`<uuid>.raw`).
    File(String),
}

impl RecordId {
    pub fn as_str(&self) -> &str {
        match self {
            RecordId::Dn(dn) => dn,
            RecordId::File(name) => name,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One image's metadata, reduced to what the tags migration needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: RecordId,
    legacy_tags: Option<Value>,
}

impl ImageRecord {
    /// Create a record. A `null` or empty-string legacy value counts as absent.
    pub fn new(id: RecordId, legacy_tags: Option<Value>) -> Self {
        let legacy_tags = legacy_tags.filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        });
        Self { id, legacy_tags }
    }

    /// The legacy `tags` value: a JSON object, or a string holding one.
    pub fn legacy_tags(&self) -> Option<&Value> {
        self.legacy_tags.as_ref()
    }

    pub fn has_legacy_tags(&self) -> bool {
        self.legacy_tags.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_and_empty_tags_are_absent() {
        let id = RecordId::File("a.raw".to_string());
        assert!(!ImageRecord::new(id.clone(), None).has_legacy_tags());
        assert!(!ImageRecord::new(id.clone(), Some(Value::Null)).has_legacy_tags());
        assert!(!ImageRecord::new(id.clone(), Some(json!(""))).has_legacy_tags());
    }

    #[test]
    fn test_empty_object_is_present() {
        let record = ImageRecord::new(RecordId::File("a.raw".to_string()), Some(json!({})));
        assert_eq!(record.legacy_tags(), Some(&json!({})));
    }

    #[test]
    fn test_record_id_display() {
        let dn = RecordId::Dn("uuid=abc, ou=images, o=smartdc".to_string());
        assert_eq!(dn.to_string(), "uuid=abc, ou=images, o=smartdc");
    }
}
