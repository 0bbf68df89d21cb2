//! Session attribute map with per-attribute change tracking.
//!
//! Tracks only the *names* of attributes changed since the last commit, so a
//! delta write carries the changed entries and nothing else. Whether a new
//! value counts as a change is decided by a pluggable [`DirtyPredicate`];
//! the default compares structurally, but callers holding mutable domain
//! objects that track their own pending changes can supply a predicate that
//! consults the value instead.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Attribute values are arbitrary JSON.
pub type AttributeValue = serde_json::Value;

/// Decides whether a new value differs from the currently stored one.
///
/// Receives the current value (`None` when the attribute is absent) and the
/// incoming value. Returning `false` suppresses both the write and the delta.
pub type DirtyPredicate =
    Arc<dyn Fn(Option<&AttributeValue>, &AttributeValue) -> bool + Send + Sync>;

/// Default predicate: structural inequality. An absent old value is a change.
pub fn structural_inequality() -> DirtyPredicate {
    Arc::new(|old, new| old != Some(new))
}

/// Name→value store recording which names changed since the last commit.
///
/// The map is not synchronized on its own; it lives inside a session entity
/// and every access goes through that entity's mutex.
pub struct AttributeMap {
    values: HashMap<String, AttributeValue>,
    changed: HashSet<String>,
    is_dirty: DirtyPredicate,
}

impl AttributeMap {
    /// Create an empty map with the structural-inequality predicate.
    pub fn new() -> Self {
        Self::with_predicate(structural_inequality())
    }

    /// Create an empty map with a custom dirty predicate.
    pub fn with_predicate(is_dirty: DirtyPredicate) -> Self {
        Self {
            values: HashMap::new(),
            changed: HashSet::new(),
            is_dirty,
        }
    }

    /// Create a map pre-populated from a full snapshot, with no pending delta.
    pub fn from_map(values: HashMap<String, AttributeValue>, is_dirty: DirtyPredicate) -> Self {
        Self {
            values,
            changed: HashSet::new(),
            is_dirty,
        }
    }

    /// Set an attribute. A `Null` value is the removal sentinel.
    ///
    /// The write happens only when the dirty predicate reports a change, so
    /// re-setting an attribute to its current value produces no delta.
    pub fn set(&mut self, name: &str, value: AttributeValue) {
        if value.is_null() {
            self.remove(name);
            return;
        }
        if (self.is_dirty)(self.values.get(name), &value) {
            self.values.insert(name.to_string(), value);
            self.changed.insert(name.to_string());
        }
    }

    /// Remove an attribute, returning the previous value.
    ///
    /// Removing an absent attribute records no change.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        let removed = self.values.remove(name);
        if removed.is_some() {
            self.changed.insert(name.to_string());
        }
        removed
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.values.get(name)
    }

    /// All attribute names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether any attribute changed since the last commit.
    pub fn has_delta(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Clear the change set. Values are untouched.
    pub fn commit(&mut self) {
        self.changed.clear();
    }

    /// Emit `(name, value)` pairs for every changed name, sorted by name.
    /// Removed attributes carry the `Null` sentinel.
    pub fn to_delta(&self) -> Vec<(String, AttributeValue)> {
        let mut names: Vec<&String> = self.changed.iter().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let value = self
                    .values
                    .get(name)
                    .cloned()
                    .unwrap_or(AttributeValue::Null);
                (name.clone(), value)
            })
            .collect()
    }

    /// Apply delta pairs: `Null` removes, anything else overwrites.
    ///
    /// Only the applied names are cleared from the local change set; changes
    /// to other attributes stay pending.
    pub fn apply_delta(&mut self, pairs: Vec<(String, AttributeValue)>) {
        for (name, value) in pairs {
            if value.is_null() {
                self.values.remove(&name);
            } else {
                self.values.insert(name.clone(), value);
            }
            self.changed.remove(&name);
        }
    }

    /// Replace the whole map from a full snapshot, dropping pending changes.
    pub fn replace_all(&mut self, values: HashMap<String, AttributeValue>) {
        self.values = values;
        self.changed.clear();
    }

    /// Clone the current values into a plain map.
    pub fn to_map(&self) -> HashMap<String, AttributeValue> {
        self.values.clone()
    }
}

impl Default for AttributeMap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeMap")
            .field("values", &self.values)
            .field("changed", &self.changed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let mut attrs = AttributeMap::new();
        attrs.set("user", json!("alice"));
        attrs.set("count", json!(3));

        assert_eq!(attrs.get("user"), Some(&json!("alice")));
        assert_eq!(attrs.get("count"), Some(&json!(3)));
        assert_eq!(attrs.names(), vec!["count".to_string(), "user".to_string()]);
    }

    #[test]
    fn test_null_is_removal_sentinel() {
        let mut attrs = AttributeMap::new();
        attrs.set("user", json!("alice"));
        attrs.commit();

        attrs.set("user", AttributeValue::Null);

        assert_eq!(attrs.get("user"), None);
        assert!(attrs.has_delta());
    }

    #[test]
    fn test_unchanged_value_produces_no_delta() {
        let mut attrs = AttributeMap::new();
        attrs.set("count", json!(1));
        attrs.commit();

        attrs.set("count", json!(1));
        assert!(!attrs.has_delta());

        attrs.set("count", json!(2));
        assert!(attrs.has_delta());
    }

    #[test]
    fn test_remove_absent_records_no_change() {
        let mut attrs = AttributeMap::new();
        assert_eq!(attrs.remove("missing"), None);
        assert!(!attrs.has_delta());
    }

    #[test]
    fn test_commit_clears_delta_keeps_values() {
        let mut attrs = AttributeMap::new();
        attrs.set("a", json!(1));
        assert!(attrs.has_delta());

        attrs.commit();
        assert!(!attrs.has_delta());
        assert_eq!(attrs.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_to_delta_encodes_removal_as_null() {
        let mut attrs = AttributeMap::new();
        attrs.set("a", json!(1));
        attrs.set("b", json!(2));
        attrs.commit();

        attrs.set("a", json!(10));
        attrs.remove("b");

        let delta = attrs.to_delta();
        assert_eq!(
            delta,
            vec![
                ("a".to_string(), json!(10)),
                ("b".to_string(), AttributeValue::Null),
            ]
        );
    }

    #[test]
    fn test_apply_delta_clears_only_applied_names() {
        let mut attrs = AttributeMap::new();
        attrs.set("a", json!(1));
        attrs.set("b", json!(2));

        attrs.apply_delta(vec![("a".to_string(), json!(5))]);

        assert_eq!(attrs.get("a"), Some(&json!(5)));
        // "b" still has a pending change.
        assert!(attrs.has_delta());
        assert_eq!(attrs.to_delta(), vec![("b".to_string(), json!(2))]);
    }

    #[test]
    fn test_apply_delta_null_removes() {
        let mut attrs = AttributeMap::new();
        attrs.set("gone", json!("soon"));
        attrs.commit();

        attrs.apply_delta(vec![("gone".to_string(), AttributeValue::Null)]);
        assert_eq!(attrs.get("gone"), None);
        assert!(!attrs.has_delta());
    }

    #[test]
    fn test_custom_predicate_consults_value() {
        // Treats every object with "pending": true as changed, regardless of
        // structural equality.
        let predicate: DirtyPredicate = Arc::new(|_, new| {
            new.get("pending").and_then(|p| p.as_bool()).unwrap_or(false)
        });
        let mut attrs = AttributeMap::with_predicate(predicate);

        attrs.set("doc", json!({"pending": true, "body": "x"}));
        attrs.commit();

        // Structurally identical, but the predicate still flags it.
        attrs.set("doc", json!({"pending": true, "body": "x"}));
        assert!(attrs.has_delta());

        attrs.commit();
        attrs.set("doc", json!({"pending": false, "body": "x"}));
        assert!(!attrs.has_delta());
    }
}
