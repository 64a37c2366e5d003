//! In-memory directory for exercising migrations without a UFDS server.
//!
//! Modify requests follow LDAP semantics closely enough for the tags
//! migration: all changes in a request apply or none do, deleting a value
//! the entry does not hold fails with `noSuchAttribute`, and adding a value
//! that is already present fails with `attributeOrValueExists`.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{DirectorySession, Modification, Scope, SearchEntry};
use crate::StoreError;

const RC_NO_SUCH_ATTRIBUTE: u32 = 16;
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_NO_SUCH_OBJECT: u32 = 32;

#[derive(Debug, Clone)]
struct StoredEntry {
    parent: String,
    entry: SearchEntry,
}

/// A modify request as received by [`MemoryDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub dn: String,
    pub changes: Vec<Modification>,
}

#[derive(Debug, Clone)]
struct SearchFailure {
    after: usize,
    reason: String,
}

/// Directory entries held in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    entries: Vec<StoredEntry>,
    requests: Vec<ModifyRequest>,
    search_failure: Option<SearchFailure>,
    search_rc: Option<u32>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry named `<rdn>, <parent>`.
    pub fn insert(&mut self, parent: &str, rdn: &str, attrs: &[(&str, &[&str])]) -> String {
        let dn = format!("{}, {}", rdn, parent);
        let attrs = attrs
            .iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            })
            .collect();
        self.entries.push(StoredEntry {
            parent: parent.to_string(),
            entry: SearchEntry {
                dn: dn.clone(),
                attrs,
            },
        });
        dn
    }

    /// Make searches fail after yielding `after` entries.
    pub fn fail_search_after(&mut self, after: usize, reason: impl Into<String>) {
        self.search_failure = Some(SearchFailure {
            after,
            reason: reason.into(),
        });
    }

    /// Make searches end with result code `rc`.
    pub fn finish_search_with(&mut self, rc: u32) {
        self.search_rc = Some(rc);
    }

    /// Replace the values of one attribute, as another writer would.
    pub fn set_attr(&mut self, dn: &str, attr: &str, values: &[&str]) {
        if let Some(stored) = self.entries.iter_mut().find(|e| e.entry.dn == dn) {
            stored.entry.attrs.insert(
                attr.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            );
        }
    }

    pub fn entry(&self, dn: &str) -> Option<&SearchEntry> {
        self.entries
            .iter()
            .find(|e| e.entry.dn == dn)
            .map(|e| &e.entry)
    }

    /// Every modify request received, including rejected ones.
    pub fn requests(&self) -> &[ModifyRequest] {
        &self.requests
    }

    fn in_scope(stored: &StoredEntry, base: &str, scope: Scope) -> bool {
        match scope {
            Scope::Base => stored.entry.dn == base,
            Scope::OneLevel => stored.parent == base,
            Scope::Subtree => {
                stored.entry.dn == base || stored.entry.dn.ends_with(&format!(", {}", base))
            }
        }
    }
}

/// Match a single `(attr=value)` equality filter, case-insensitively.
fn matches_filter(entry: &SearchEntry, filter: &str) -> bool {
    let inner = filter.trim().trim_start_matches('(').trim_end_matches(')');
    let Some((attr, wanted)) = inner.split_once('=') else {
        return false;
    };
    if wanted == "*" {
        return entry.attr(attr).is_some();
    }
    entry
        .attr(attr)
        .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(wanted)))
}

fn apply(
    attrs: &mut HashMap<String, Vec<String>>,
    change: Modification,
) -> Result<(), (u32, String)> {
    match change {
        Modification::Add { attr, values } => {
            let current = attrs.entry(attr.clone()).or_default();
            for value in values {
                if current.contains(&value) {
                    return Err((
                        RC_ATTRIBUTE_OR_VALUE_EXISTS,
                        format!("{}: value exists: {}", attr, value),
                    ));
                }
                current.push(value);
            }
        }
        Modification::Delete { attr, values } => {
            let Some(current) = attrs.get_mut(&attr) else {
                return Err((RC_NO_SUCH_ATTRIBUTE, format!("no such attribute: {}", attr)));
            };
            if values.is_empty() {
                attrs.remove(&attr);
                return Ok(());
            }
            for value in values {
                let Some(pos) = current.iter().position(|v| *v == value) else {
                    return Err((
                        RC_NO_SUCH_ATTRIBUTE,
                        format!("{}: no such value: {}", attr, value),
                    ));
                };
                current.remove(pos);
            }
            if current.is_empty() {
                attrs.remove(&attr);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DirectorySession for MemoryDirectory {
    async fn search(
        &mut self,
        base: &str,
        scope: Scope,
        filter: &str,
    ) -> Result<Vec<SearchEntry>, StoreError> {
        let mut found = Vec::new();
        for stored in &self.entries {
            if !Self::in_scope(stored, base, scope) || !matches_filter(&stored.entry, filter) {
                continue;
            }
            if let Some(failure) = &self.search_failure
                && found.len() == failure.after
            {
                return Err(StoreError::SearchAborted {
                    entries: found.len(),
                    reason: failure.reason.clone(),
                });
            }
            found.push(stored.entry.clone());
        }

        if let Some(failure) = &self.search_failure
            && found.len() <= failure.after
        {
            return Err(StoreError::SearchAborted {
                entries: found.len(),
                reason: failure.reason.clone(),
            });
        }

        if let Some(rc) = self.search_rc.filter(|rc| *rc != 0) {
            return Err(StoreError::ResultCode {
                operation: "search",
                rc,
                message: String::new(),
            });
        }
        Ok(found)
    }

    async fn modify(&mut self, dn: &str, changes: Vec<Modification>) -> Result<(), StoreError> {
        self.requests.push(ModifyRequest {
            dn: dn.to_string(),
            changes: changes.clone(),
        });

        let Some(stored) = self.entries.iter_mut().find(|e| e.entry.dn == dn) else {
            return Err(StoreError::ResultCode {
                operation: "modify",
                rc: RC_NO_SUCH_OBJECT,
                message: format!("no such object: {}", dn),
            });
        };

        let mut attrs = stored.entry.attrs.clone();
        for change in changes {
            apply(&mut attrs, change).map_err(|(rc, message)| StoreError::ResultCode {
                operation: "modify",
                rc,
                message,
            })?;
        }
        stored.entry.attrs = attrs;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE_CLASS: &[&str] = &["sdcimage"];

    #[tokio::test]
    async fn test_subtree_excludes_suffix_siblings() {
        let mut dir = MemoryDirectory::new();
        let child = dir.insert("ou=images, o=smartdc", "uuid=1", &[("objectclass", IMAGE_CLASS)]);
        dir.insert("ou=oldimages, o=smartdc", "uuid=2", &[("objectclass", IMAGE_CLASS)]);

        let found = dir
            .search("ou=images, o=smartdc", Scope::Subtree, "(objectclass=sdcimage)")
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].dn, child);
    }
}
