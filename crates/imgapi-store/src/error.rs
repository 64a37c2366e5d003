//! Error types for the image stores.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning a legacy `tags` value into `key=value` pairs.
#[derive(Debug, Error)]
pub enum TagError {
    /// The legacy value was a string that is not valid JSON.
    #[error("legacy tags are not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The legacy value (after decoding) is not a JSON object.
    #[error("legacy tags must be an object, got {0}")]
    NotAMapping(&'static str),
}

/// Errors that can occur when talking to an image store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// LDAP protocol or transport failure.
    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),

    /// The directory answered with a non-success result code.
    #[error("{operation} failed with LDAP result code {rc}: {message}")]
    ResultCode {
        operation: &'static str,
        rc: u32,
        message: String,
    },

    /// A search stream failed before its terminal result.
    #[error("search aborted after {entries} entries: {reason}")]
    SearchAborted { entries: usize, reason: String },

    /// A directory entry could not be mapped to an image record.
    #[error("invalid entry {dn}: {reason}")]
    InvalidEntry { dn: String, reason: String },

    /// Filesystem failure in the local store.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A local record file is not valid JSON.
    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A local record file parsed, but is not a JSON object.
    #[error("{} is not a JSON object", path.display())]
    NotAnObject { path: PathBuf },

    /// The record handed to a store did not come from that store.
    #[error("record {0} does not belong to this store")]
    ForeignRecord(String),

    /// The legacy tags payload could not be normalized.
    #[error(transparent)]
    Tags(#[from] TagError),
}
