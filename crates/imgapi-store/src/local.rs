//! Local database store: one `<uuid>.raw` JSON document per image.
//!
//! Local documents already hold `tags` as a native object, which is the
//! shape the migration produces, so committing never touches the disk.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::{CommitOutcome, ImageRecord, ImageStore, NormalizedTagSet, RecordId, StoreError};

/// Record filenames: a lowercase UUID with a `.raw` suffix.
static RAW_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\.raw$")
        .expect("valid regex")
});

/// Whether `name` is a local database record filename.
pub fn is_record_file(name: &str) -> bool {
    RAW_FILE_RE.is_match(name)
}

/// Image store over a local database directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn record_filenames(&self) -> Result<Vec<String>, StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut read_dir = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut names = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(io_err)? {
            // Non-UTF-8 names can never match the pattern
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_record_file(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn read_record(&self, name: String) -> Result<ImageRecord, StoreError> {
        let path = self.dir.join(&name);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        let doc: Value = serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        let Value::Object(mut doc) = doc else {
            return Err(StoreError::NotAnObject { path });
        };

        let id = match doc.get("uuid").and_then(Value::as_str) {
            Some(uuid) => format!("{}.raw", uuid),
            None => name,
        };
        Ok(ImageRecord::new(RecordId::File(id), doc.remove("tags")))
    }
}

#[async_trait]
impl ImageStore for LocalStore {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn list(&mut self) -> Result<Vec<ImageRecord>, StoreError> {
        let names = self.record_filenames().await?;
        debug!(dir = %self.dir.display(), count = names.len(), "scanned local database");

        let mut records = Vec::with_capacity(names.len());
        for name in names {
            records.push(self.read_record(name).await?);
        }
        Ok(records)
    }

    async fn commit(
        &mut self,
        record: &ImageRecord,
        _tag: &NormalizedTagSet,
    ) -> Result<CommitOutcome, StoreError> {
        if !matches!(record.id, RecordId::File(_)) {
            return Err(StoreError::ForeignRecord(record.id.to_string()));
        }
        Ok(CommitOutcome::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_filename_pattern() {
        assert!(is_record_file("3f2504e0-4f89-11d3-9a0c-0305e82c3301.raw"));
        assert!(!is_record_file("notauuid.raw"));
        assert!(!is_record_file("3f2504e0-4f89-11d3-9a0c-0305e82c3301.json"));
        assert!(!is_record_file("3F2504E0-4F89-11D3-9A0C-0305E82C3301.raw"));
        assert!(!is_record_file("3f2504e0-4f89-11d3-9a0c-0305e82c3301.raw.bak"));
        assert!(!is_record_file("x3f2504e0-4f89-11d3-9a0c-0305e82c3301.raw"));
    }

    #[tokio::test]
    async fn test_list_skips_non_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let uuid = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";
        std::fs::write(
            dir.path().join(format!("{}.raw", uuid)),
            json!({"uuid": uuid, "tags": {"a": "b"}}).to_string(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notauuid.raw"), "not json at all").unwrap();
        std::fs::write(dir.path().join(format!("{}.json", uuid)), "{").unwrap();

        let mut store = LocalStore::new(dir.path());
        let records = store.list().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, RecordId::File(format!("{}.raw", uuid)));
        assert_eq!(records[0].legacy_tags(), Some(&json!({"a": "b"})));
    }

    #[tokio::test]
    async fn test_list_falls_back_to_filename_without_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let name = "00000000-0000-0000-0000-000000000001.raw";
        std::fs::write(dir.path().join(name), r#"{"name": "base"}"#).unwrap();

        let records = LocalStore::new(dir.path()).list().await.unwrap();
        assert_eq!(records[0].id, RecordId::File(name.to_string()));
        assert!(!records[0].has_legacy_tags());
    }

    #[tokio::test]
    async fn test_parse_failure_aborts_listing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("00000000-0000-0000-0000-000000000001.raw"),
            r#"{"uuid": "00000000-0000-0000-0000-000000000001"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("00000000-0000-0000-0000-000000000002.raw"),
            "{truncated",
        )
        .unwrap();

        let err = LocalStore::new(dir.path()).list().await.unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
    }

    #[tokio::test]
    async fn test_non_object_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("00000000-0000-0000-0000-000000000001.raw"),
            "[1, 2, 3]",
        )
        .unwrap();

        let err = LocalStore::new(dir.path()).list().await.unwrap_err();
        assert!(matches!(err, StoreError::NotAnObject { .. }));
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalStore::new(dir.path().join("missing"))
            .list()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[tokio::test]
    async fn test_commit_rejects_directory_records() {
        let mut store = LocalStore::new("/nonexistent");
        let record = ImageRecord::new(RecordId::Dn("uuid=x, ou=images".to_string()), None);
        let err = store.commit(&record, &vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignRecord(_)));
    }
}
