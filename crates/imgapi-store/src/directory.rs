//! UFDS directory store.
//!
//! Images are LDAP entries of object class `sdcimage` directly under
//! `ou=images, o=smartdc`. The legacy `tags` attribute holds a JSON-encoded
//! object; the migration replaces it with a multi-valued `tag` attribute in a
//! single modify request so the server applies both changes together.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapResult, Mod};
use serde_json::Value;
use tracing::{debug, warn};

pub use ldap3::Scope;

use crate::{CommitOutcome, ImageRecord, ImageStore, NormalizedTagSet, RecordId, StoreError};

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

/// Parent of every image entry.
pub const IMAGES_BASE_DN: &str = "ou=images, o=smartdc";

/// Filter selecting image entries.
pub const IMAGE_FILTER: &str = "(objectclass=sdcimage)";

/// Legacy attribute holding the JSON-encoded tags object.
pub const LEGACY_TAGS_ATTR: &str = "tags";

/// Replacement attribute holding `key=value` strings.
pub const TAG_ATTR: &str = "tag";

/// Bound on the TCP connect and on the bind exchange.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A directory entry returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl SearchEntry {
    /// Values of `name`, matched case-insensitively as LDAP attribute names are.
    pub fn attr(&self, name: &str) -> Option<&[String]> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }
}

impl From<ldap3::SearchEntry> for SearchEntry {
    fn from(entry: ldap3::SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attrs: entry.attrs,
        }
    }
}

/// One change in a modify request. An empty `values` list on `Delete`
/// removes the whole attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    Add { attr: String, values: Vec<String> },
    Delete { attr: String, values: Vec<String> },
}

impl Modification {
    // LDAP attribute values are an unordered set: tag order and duplicate values are not kept.
    fn into_ldap(self) -> Mod<String> {
        match self {
            Modification::Add { attr, values } => Mod::Add(attr, values.into_iter().collect()),
            Modification::Delete { attr, values } => {
                Mod::Delete(attr, values.into_iter().collect::<HashSet<_>>())
            }
        }
    }
}

/// The directory operations a [`DirectoryStore`] needs.
#[async_trait]
pub trait DirectorySession: Send {
    /// Search under `base`, returning every matching entry. Fails if the
    /// stream errors partway or ends with a non-success result code.
    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
    ) -> Result<Vec<SearchEntry>, StoreError>;

    /// Apply `changes` to the entry at `dn` as one atomic request.
    async fn modify(&mut self, dn: &str, changes: Vec<Modification>) -> Result<(), StoreError>;
}

/// An authenticated LDAP session.
pub struct LdapSession {
    ldap: Ldap,
}

impl LdapSession {
    /// Connect to `url` and bind as `bind_dn`.
    pub async fn connect(
        url: &str,
        bind_dn: &str,
        bind_password: &str,
    ) -> Result<Self, StoreError> {
        let settings = LdapConnSettings::new().set_conn_timeout(CONNECT_TIMEOUT);
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, url).await?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection closed with error");
            }
        });

        let result = ldap
            .with_timeout(CONNECT_TIMEOUT)
            .simple_bind(bind_dn, bind_password)
            .await?;
        check("bind", result)?;

        debug!(url = %url, bind_dn = %bind_dn, "bound to directory");
        Ok(Self { ldap })
    }

    /// Close the session.
    pub async fn unbind(mut self) -> Result<(), StoreError> {
        self.ldap.unbind().await?;
        Ok(())
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
    ) -> Result<Vec<SearchEntry>, StoreError> {
        let mut stream = self
            .ldap
            .streaming_search(base, scope, filter, vec!["*"])
            .await?;

        let mut entries = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(entry)) => {
                    if entry.is_ref() || entry.is_intermediate() {
                        continue;
                    }
                    entries.push(ldap3::SearchEntry::construct(entry).into());
                }
                Ok(None) => break,
                Err(e) => {
                    return Err(StoreError::SearchAborted {
                        entries: entries.len(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        check("search", stream.finish().await)?;
        Ok(entries)
    }

    async fn modify(&mut self, dn: &str, changes: Vec<Modification>) -> Result<(), StoreError> {
        let mods: Vec<Mod<String>> = changes.into_iter().map(Modification::into_ldap).collect();
        let result = self.ldap.modify(dn, mods).await?;
        check("modify", result)
    }
}

fn check(operation: &'static str, result: LdapResult) -> Result<(), StoreError> {
    if result.rc == 0 {
        return Ok(());
    }
    Err(StoreError::ResultCode {
        operation,
        rc: result.rc,
        message: result.text,
    })
}

/// Image store backed by a directory session.
pub struct DirectoryStore<S> {
    session: S,
}

impl DirectoryStore<LdapSession> {
    /// Connect and bind to the directory at `url`.
    pub async fn connect(
        url: &str,
        bind_dn: &str,
        bind_password: &str,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(
            LdapSession::connect(url, bind_dn, bind_password).await?,
        ))
    }
}

impl<S: DirectorySession> DirectoryStore<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    fn record_from_entry(entry: SearchEntry) -> Result<ImageRecord, StoreError> {
        let legacy = match entry.attr(LEGACY_TAGS_ATTR) {
            None | Some([]) => None,
            Some([value]) => Some(Value::String(value.clone())),
            Some(values) => {
                let reason = format!("{} values for single-valued `tags`", values.len());
                return Err(StoreError::InvalidEntry {
                    dn: entry.dn.clone(),
                    reason,
                });
            }
        };
        Ok(ImageRecord::new(RecordId::Dn(entry.dn), legacy))
    }
}

#[async_trait]
impl<S: DirectorySession> ImageStore for DirectoryStore<S> {
    fn kind(&self) -> &'static str {
        "ufds"
    }

    async fn list(&mut self) -> Result<Vec<ImageRecord>, StoreError> {
        let entries = self
            .session
            .search(IMAGES_BASE_DN, Scope::OneLevel, IMAGE_FILTER)
            .await?;
        debug!(count = entries.len(), "listed directory images");

        entries.into_iter().map(Self::record_from_entry).collect()
    }

    async fn commit(
        &mut self,
        record: &ImageRecord,
        tag: &NormalizedTagSet,
    ) -> Result<CommitOutcome, StoreError> {
        let RecordId::Dn(dn) = &record.id else {
            return Err(StoreError::ForeignRecord(record.id.to_string()));
        };
        let Some(Value::String(original)) = record.legacy_tags() else {
            return Err(StoreError::InvalidEntry {
                dn: dn.clone(),
                reason: "legacy `tags` is not a directory string value".to_string(),
            });
        };

        // The delete carries the value read at listing time, so a concurrent
        // change to `tags` makes the server reject the whole request.
        let mut changes = Vec::with_capacity(2);
        if !tag.is_empty() {
            changes.push(Modification::Add {
                attr: TAG_ATTR.to_string(),
                values: tag.clone(),
            });
        }
        changes.push(Modification::Delete {
            attr: LEGACY_TAGS_ATTR.to_string(),
            values: vec![original.clone()],
        });

        self.session.modify(dn, changes).await?;
        Ok(CommitOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_ldap_keeps_every_distinct_value() {
        let add = Modification::Add {
            attr: TAG_ATTR.to_string(),
            values: vec!["os=linux".to_string(), "arch=x86".to_string()],
        };
        match add.into_ldap() {
            Mod::Add(attr, values) => {
                assert_eq!(attr, "tag");
                assert_eq!(values.len(), 2);
                assert!(values.contains("os=linux"));
                assert!(values.contains("arch=x86"));
            }
            _ => panic!("Expected add modification"),
        }
    }

    #[test]
    fn test_into_ldap_collapses_identical_pairs() {
        // {"a=b":"c","a":"b=c"} normalizes to two identical strings
        let add = Modification::Add {
            attr: TAG_ATTR.to_string(),
            values: vec!["a=b=c".to_string(), "a=b=c".to_string()],
        };
        match add.into_ldap() {
            Mod::Add(_, values) => assert_eq!(values.len(), 1),
            _ => panic!("Expected add modification"),
        }
    }

    #[test]
    fn test_delete_carries_prior_value() {
        let delete = Modification::Delete {
            attr: LEGACY_TAGS_ATTR.to_string(),
            values: vec![r#"{"os":"linux"}"#.to_string()],
        };
        match delete.into_ldap() {
            Mod::Delete(attr, values) => {
                assert_eq!(attr, "tags");
                assert!(values.contains(r#"{"os":"linux"}"#));
            }
            _ => panic!("Expected delete modification"),
        }
    }
}
