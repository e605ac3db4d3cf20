//! Rule table with consistent snapshots and validated updates
//!
//! The table maps collection name to an `Arc<CollectionRules>` pair;
//! readers clone the `Arc`, so a read/write pair is always observed
//! together even while an update replaces it. Updates parse incoming
//! expressions before storing anything: an expression outside the
//! grammar is rejected, never installed.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::rules::expr::{Resource, RuleExpr};
use crate::types::Result;

/// Read/write predicate pair for one collection
#[derive(Debug, Clone)]
pub struct CollectionRules {
    pub read: RuleExpr,
    pub write: RuleExpr,
}

/// Process-wide rule table
pub struct RuleStore {
    rules: DashMap<String, Arc<CollectionRules>>,
}

impl RuleStore {
    /// Empty table: every collection falls through to the
    /// unknown-collection default (allow iff authenticated).
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
        }
    }

    /// Table seeded with the built-in collections
    pub fn with_defaults() -> Self {
        let store = Self::new();
        let defaults: &[(&str, &str, &str)] = &[
            // Public read, only the owner may overwrite
            ("sensors", "true", "resource.owner == auth.uid"),
            ("devices", "auth != null", "auth != null"),
            ("users", "auth != null", "auth != null"),
            ("admin", "auth.uid == 'admin'", "auth.uid == 'admin'"),
            ("files", "auth != null", "auth != null"),
        ];
        for (collection, read, write) in defaults {
            let pair = CollectionRules {
                read: RuleExpr::parse(read).expect("built-in rule must parse"),
                write: RuleExpr::parse(write).expect("built-in rule must parse"),
            };
            store.rules.insert((*collection).to_string(), Arc::new(pair));
        }
        store
    }

    /// Fallback for collections without an entry
    fn default_rule() -> RuleExpr {
        RuleExpr::AuthPresence { expected: true }
    }

    /// Consistent snapshot of one collection's pair, if present
    pub fn get(&self, collection: &str) -> Option<Arc<CollectionRules>> {
        self.rules.get(collection).map(|entry| Arc::clone(&entry))
    }

    /// Can `principal` read from `collection`? Resource-aware when the
    /// caller has already loaded the record.
    pub fn validate_read(
        &self,
        collection: &str,
        principal: Option<&str>,
        resource: Option<Resource<'_>>,
    ) -> bool {
        match self.get(collection) {
            Some(pair) => pair.read.evaluate(principal, resource),
            None => principal.is_some(),
        }
    }

    /// Can `principal` write to `collection`?
    pub fn validate_write(
        &self,
        collection: &str,
        principal: Option<&str>,
        resource: Option<Resource<'_>>,
    ) -> bool {
        match self.get(collection) {
            Some(pair) => pair.write.evaluate(principal, resource),
            None => principal.is_some(),
        }
    }

    /// Replace one or both sides of a collection's pair. Each provided
    /// expression is parsed first; on any parse failure nothing is
    /// stored. A side not provided keeps its current predicate (or the
    /// unknown-collection default for a collection seen here first).
    pub fn update(
        &self,
        collection: &str,
        read: Option<&str>,
        write: Option<&str>,
    ) -> Result<()> {
        let parsed_read = read.map(RuleExpr::parse).transpose()?;
        let parsed_write = write.map(RuleExpr::parse).transpose()?;

        // entry() holds the shard lock across the read-modify-write, so
        // concurrent updates to the same collection do not interleave
        // and readers only ever see complete pairs.
        let mut entry = self
            .rules
            .entry(collection.to_string())
            .or_insert_with(|| {
                Arc::new(CollectionRules {
                    read: Self::default_rule(),
                    write: Self::default_rule(),
                })
            });

        let current = entry.value();
        let next = CollectionRules {
            read: parsed_read.unwrap_or_else(|| current.read.clone()),
            write: parsed_write.unwrap_or_else(|| current.write.clone()),
        };
        *entry.value_mut() = Arc::new(next);

        Ok(())
    }

    /// Render the whole table as expression text, collection-sorted
    pub fn snapshot(&self) -> BTreeMap<String, (String, String)> {
        self.rules
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    (entry.read.to_string(), entry.write.to_string()),
                )
            })
            .collect()
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_builtin_table() {
        let store = RuleStore::with_defaults();
        let snapshot = store.snapshot();

        assert_eq!(
            snapshot.get("sensors"),
            Some(&("true".to_string(), "resource.owner == auth.uid".to_string()))
        );
        assert_eq!(
            snapshot.get("admin"),
            Some(&("auth.uid == 'admin'".to_string(), "auth.uid == 'admin'".to_string()))
        );
        assert_eq!(snapshot.len(), 5);
    }

    #[test]
    fn test_unknown_collection_requires_auth() {
        let store = RuleStore::with_defaults();

        assert!(!store.validate_read("mystery", None, None));
        assert!(store.validate_read("mystery", Some("alice"), None));
        assert!(!store.validate_write("mystery", None, None));
        assert!(store.validate_write("mystery", Some("alice"), None));
    }

    #[test]
    fn test_owner_write_rule() {
        let store = RuleStore::with_defaults();
        let resource = Resource {
            id: "sensors:d1",
            owner: "alice",
        };

        // Pre-check without a resource: denied for everyone but allowed
        // once ownership is established
        assert!(!store.validate_write("sensors", Some("alice"), None));
        assert!(store.validate_write("sensors", Some("alice"), Some(resource)));
        assert!(!store.validate_write("sensors", Some("bob"), Some(resource)));

        // Read rule "true" allows anonymous
        assert!(store.validate_read("sensors", None, None));
    }

    #[test]
    fn test_update_replaces_atomically() {
        let store = RuleStore::with_defaults();
        store
            .update("sensors", Some("auth != null"), None)
            .unwrap();

        let pair = store.get("sensors").unwrap();
        assert_eq!(pair.read.to_string(), "auth != null");
        // Untouched side preserved
        assert_eq!(pair.write.to_string(), "resource.owner == auth.uid");
    }

    #[test]
    fn test_update_rejects_invalid_expression() {
        let store = RuleStore::with_defaults();
        let before = store.snapshot();

        assert!(store
            .update("sensors", Some("anything goes"), Some("true"))
            .is_err());
        // Nothing stored on failure, not even the valid side
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_update_new_collection_fills_missing_side() {
        let store = RuleStore::new();
        store.update("notes", Some("true"), None).unwrap();

        let pair = store.get("notes").unwrap();
        assert_eq!(pair.read.to_string(), "true");
        assert_eq!(pair.write.to_string(), "auth != null");
    }
}
