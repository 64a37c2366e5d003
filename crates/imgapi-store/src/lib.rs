//! Image metadata stores for IMGAPI migrations.
//!
//! Images live either in UFDS (an LDAP directory, one entry per image) or in
//! a local database directory holding one `<uuid>.raw` JSON document per
//! image. Both are exposed through the [`ImageStore`] trait so a migration
//! can be written once and run against whichever backend is configured.
//!
//! ## Features
//!
//! - **Records**: [`ImageRecord`] with a backend-specific [`RecordId`]
//! - **Tags**: [`normalize_tags`] turns a legacy `tags` object into `key=value` pairs
//! - **Directory**: [`DirectoryStore`] over any [`DirectorySession`] (LDAP via [`LdapSession`])
//! - **Local**: [`LocalStore`] scanning a database directory

pub mod directory;
mod error;
pub mod local;
mod record;
mod store;
mod tags;

pub use directory::{
    DirectorySession, DirectoryStore, IMAGE_FILTER, IMAGES_BASE_DN, LEGACY_TAGS_ATTR,
    LdapSession, Modification, Scope, SearchEntry, TAG_ATTR,
};
pub use error::{StoreError, TagError};
pub use local::{LocalStore, is_record_file};
pub use record::{ImageRecord, RecordId};
pub use store::{CommitOutcome, ImageStore};
pub use tags::{NormalizedTagSet, normalize_tags};
