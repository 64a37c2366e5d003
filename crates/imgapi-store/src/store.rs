//! The backend contract shared by the directory and local stores.

use async_trait::async_trait;

use crate::{ImageRecord, NormalizedTagSet, StoreError};

/// What a store did to persist a transformed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The record was rewritten in the backend.
    Written,
    /// The backend already represents the new form; nothing was written.
    Unchanged,
}

/// A backend holding image records.
///
/// Implementations are selected once at startup and never mixed within a
/// run. Methods take `&mut self` since a directory session is a single
/// sequential connection.
#[async_trait]
pub trait ImageStore: Send {
    /// Short backend name for logs (`ufds`, `local`).
    fn kind(&self) -> &'static str;

    /// List every image record, in backend order.
    async fn list(&mut self) -> Result<Vec<ImageRecord>, StoreError>;

    /// Replace `record`'s legacy `tags` field with `tag`.
    async fn commit(
        &mut self,
        record: &ImageRecord,
        tag: &NormalizedTagSet,
    ) -> Result<CommitOutcome, StoreError>;
}

#[async_trait]
impl<T: ImageStore + ?Sized> ImageStore for Box<T> {
    fn kind(&self) -> &'static str {
        (**self).kind()
    }

    async fn list(&mut self) -> Result<Vec<ImageRecord>, StoreError> {
        (**self).list().await
    }

    async fn commit(
        &mut self,
        record: &ImageRecord,
        tag: &NormalizedTagSet,
    ) -> Result<CommitOutcome, StoreError> {
        (**self).commit(record, tag).await
    }
}
