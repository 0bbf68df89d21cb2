//! The external key-value store boundary.
//!
//! [`SessionStore`] is the synchronous black-box collaborator the repository
//! writes through; implementations own the actual wire format and query
//! language. [`MemoryStore`] is the in-process reference implementation,
//! also used throughout the test suite. It can feed a [`NotificationHub`]
//! the same entry notifications a remote store would push.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::attributes::AttributeValue;
use crate::delta::SessionPayload;
use crate::error::{Error, Result};
use crate::events::{EntryNotification, NotificationHub};
use crate::session::SessionSnapshot;

/// Key-value store exposing get/put/remove and query-by-attribute.
///
/// I/O failures are returned as-is; no retry policy is applied anywhere in
/// this crate.
pub trait SessionStore: Send + Sync {
    /// Fetch the full state stored under a session id.
    fn get(&self, session_id: &str) -> Result<Option<SessionSnapshot>>;

    /// Write a full or delta payload under a session id.
    fn put(&self, session_id: &str, payload: SessionPayload) -> Result<()>;

    /// Remove a session, returning the state it held.
    fn remove(&self, session_id: &str) -> Result<Option<SessionSnapshot>>;

    /// All sessions whose named attribute equals the given value.
    fn find_by_attribute(
        &self,
        name: &str,
        value: &AttributeValue,
    ) -> Result<Vec<SessionSnapshot>>;
}

/// In-process store holding full snapshots.
///
/// Delta payloads are merged onto the existing full state, mirroring how a
/// remote store materializes incremental writes; a delta for an id with no
/// base state is rejected.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, SessionSnapshot>>,
    hub: Mutex<Option<Arc<NotificationHub>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the notification hub this store feeds on every mutation.
    pub fn attach_hub(&self, hub: Arc<NotificationHub>) {
        *self.hub.lock() = Some(hub);
    }

    /// Drop an entry and push an invalidate notification, the way a remote
    /// store reports an idle-timeout eviction.
    pub fn invalidate(&self, session_id: &str) -> Result<()> {
        let old = self.entries.lock().remove(session_id);
        let old_value = old.as_ref().map(serde_json::to_value).transpose()?;
        self.notify(EntryNotification::invalidated(session_id, old_value));
        Ok(())
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn notify(&self, notification: EntryNotification) {
        if let Some(hub) = self.hub.lock().clone() {
            hub.dispatch(&notification);
        }
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        Ok(self.entries.lock().get(session_id).cloned())
    }

    fn put(&self, session_id: &str, payload: SessionPayload) -> Result<()> {
        let notification = {
            let mut entries = self.entries.lock();
            let old = entries.get(session_id).cloned();
            let new = match payload {
                SessionPayload::Full(snapshot) => {
                    entries.insert(session_id.to_string(), snapshot.clone());
                    snapshot
                }
                SessionPayload::Delta(delta) => {
                    let Some(entry) = entries.get_mut(session_id) else {
                        return Err(Error::DeltaWithoutBase(session_id.to_string()));
                    };
                    entry.id = delta.id;
                    entry.last_accessed = delta.last_accessed;
                    entry.max_inactive_secs = delta.max_inactive_secs;
                    for (name, value) in delta.attributes {
                        if value.is_null() {
                            entry.attributes.remove(&name);
                        } else {
                            entry.attributes.insert(name, value);
                        }
                    }
                    entry.clone()
                }
            };
            trace!(session_id = %session_id, "Store write");
            let new_value = Some(serde_json::to_value(&new)?);
            match old {
                Some(old) => EntryNotification::updated(
                    session_id,
                    Some(serde_json::to_value(&old)?),
                    new_value,
                ),
                None => EntryNotification::created(session_id, new_value),
            }
        };
        self.notify(notification);
        Ok(())
    }

    fn remove(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        let removed = self.entries.lock().remove(session_id);
        let old_value = removed.as_ref().map(serde_json::to_value).transpose()?;
        self.notify(EntryNotification::destroyed(session_id, old_value));
        Ok(removed)
    }

    fn find_by_attribute(
        &self,
        name: &str,
        value: &AttributeValue,
    ) -> Result<Vec<SessionSnapshot>> {
        Ok(self
            .entries
            .lock()
            .values()
            .filter(|snapshot| snapshot.attributes.get(name) == Some(value))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::SessionDelta;
    use crate::events::{EntryObserver, EntryOp};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn snapshot(id: &str) -> SessionSnapshot {
        SessionSnapshot {
            id: id.to_string(),
            creation_time: Utc::now(),
            last_accessed: Utc::now(),
            max_inactive_secs: 1800,
            attributes: HashMap::new(),
        }
    }

    #[test]
    fn test_put_full_then_get() {
        let store = MemoryStore::new();
        let mut snap = snapshot("s1");
        snap.attributes.insert("a".to_string(), json!(1));

        store
            .put("s1", SessionPayload::Full(snap.clone()))
            .unwrap();

        assert_eq!(store.get("s1").unwrap(), Some(snap));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_delta_merges_onto_base() {
        let store = MemoryStore::new();
        let mut snap = snapshot("s1");
        snap.attributes.insert("a".to_string(), json!(1));
        snap.attributes.insert("b".to_string(), json!(2));
        store.put("s1", SessionPayload::Full(snap)).unwrap();

        let later = Utc::now() + Duration::seconds(10);
        store
            .put(
                "s1",
                SessionPayload::Delta(SessionDelta {
                    id: "s1".to_string(),
                    last_accessed: later,
                    max_inactive_secs: 600,
                    attributes: vec![
                        ("a".to_string(), json!(10)),
                        ("b".to_string(), AttributeValue::Null),
                    ],
                }),
            )
            .unwrap();

        let merged = store.get("s1").unwrap().unwrap();
        assert_eq!(merged.last_accessed, later);
        assert_eq!(merged.max_inactive_secs, 600);
        assert_eq!(merged.attributes.get("a"), Some(&json!(10)));
        assert_eq!(merged.attributes.get("b"), None);
    }

    #[test]
    fn test_delta_without_base_is_rejected() {
        let store = MemoryStore::new();
        let result = store.put(
            "ghost",
            SessionPayload::Delta(SessionDelta {
                id: "ghost".to_string(),
                last_accessed: Utc::now(),
                max_inactive_secs: 1800,
                attributes: vec![],
            }),
        );

        assert!(matches!(result, Err(Error::DeltaWithoutBase(_))));
    }

    #[test]
    fn test_find_by_attribute() {
        let store = MemoryStore::new();
        let mut alice = snapshot("s1");
        alice
            .attributes
            .insert("principal_name".to_string(), json!("alice"));
        let mut bob = snapshot("s2");
        bob.attributes
            .insert("principal_name".to_string(), json!("bob"));
        store.put("s1", SessionPayload::Full(alice)).unwrap();
        store.put("s2", SessionPayload::Full(bob)).unwrap();

        let hits = store
            .find_by_attribute("principal_name", &json!("alice"))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "s1");
    }

    #[test]
    fn test_mutations_feed_the_hub() {
        #[derive(Default)]
        struct Recording {
            ops: Mutex<Vec<EntryOp>>,
        }
        impl EntryObserver for Recording {
            fn on_create(&self, _n: &EntryNotification) -> Result<()> {
                self.ops.lock().push(EntryOp::Create);
                Ok(())
            }
            fn on_update(&self, _n: &EntryNotification) -> Result<()> {
                self.ops.lock().push(EntryOp::Update);
                Ok(())
            }
            fn on_destroy(&self, _n: &EntryNotification) -> Result<()> {
                self.ops.lock().push(EntryOp::Destroy);
                Ok(())
            }
            fn on_invalidate(&self, _n: &EntryNotification) -> Result<()> {
                self.ops.lock().push(EntryOp::Invalidate);
                Ok(())
            }
        }

        let observer = Arc::new(Recording::default());
        let store = MemoryStore::new();
        store.attach_hub(Arc::new(NotificationHub::new(vec![observer.clone()])));

        store
            .put("s1", SessionPayload::Full(snapshot("s1")))
            .unwrap();
        store
            .put("s1", SessionPayload::Full(snapshot("s1")))
            .unwrap();
        store.remove("s1").unwrap();
        store
            .put("s2", SessionPayload::Full(snapshot("s2")))
            .unwrap();
        store.invalidate("s2").unwrap();

        assert_eq!(
            *observer.ops.lock(),
            vec![
                EntryOp::Create,
                EntryOp::Update,
                EntryOp::Destroy,
                EntryOp::Create,
                EntryOp::Invalidate,
            ]
        );
    }
}
