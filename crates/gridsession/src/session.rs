//! The session entity and its serializable snapshot.
//!
//! A [`Session`] is a shared handle to mutable state behind one mutex. The
//! scalars (id, timestamps, inactivity interval) and the attribute map live
//! behind the same lock, so a multi-field edit from one thread is atomic
//! relative to readers on another. Two sessions fetched separately from the
//! store are distinct handles and do not observe each other's edits; the
//! external store is the only synchronization point between them.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attributes::{AttributeMap, AttributeValue, DirtyPredicate, structural_inequality};

/// Rebuild an inactivity interval from stored seconds, clamping instead of
/// panicking when the count is outside chrono's representable range.
pub(crate) fn interval_from_secs(secs: i64) -> Duration {
    Duration::try_seconds(secs).unwrap_or(if secs < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

/// Serializable full state of a session, the raw value the store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: String,

    /// When the session was created. Immutable for the session's lifetime.
    pub creation_time: DateTime<Utc>,

    /// Last access time.
    pub last_accessed: DateTime<Utc>,

    /// Inactivity timeout in seconds. Non-positive disables expiration.
    pub max_inactive_secs: i64,

    /// Complete attribute set.
    pub attributes: HashMap<String, AttributeValue>,
}

impl SessionSnapshot {
    /// Probe an untyped value for session shape. `None` when it is not
    /// session-like.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

pub(crate) struct SessionState {
    pub(crate) id: String,
    pub(crate) creation_time: DateTime<Utc>,
    pub(crate) last_accessed: DateTime<Utc>,
    pub(crate) max_inactive: Duration,
    pub(crate) dirty: bool,
    /// Whether the store has ever acknowledged this session's full state
    /// under its current id. Gates delta encoding of the first write.
    pub(crate) committed_once: bool,
    pub(crate) attributes: AttributeMap,
}

impl SessionState {
    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            creation_time: self.creation_time,
            last_accessed: self.last_accessed,
            max_inactive_secs: self.max_inactive.num_seconds(),
            attributes: self.attributes.to_map(),
        }
    }
}

/// A session entity: shared handle to locked mutable state.
///
/// Cloning shares the handle. Equality and hashing go by id alone, so
/// distinct in-process copies of the same logical session are
/// interchangeable in sets and maps. Ordering is by creation time, with the
/// id as tie-break.
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Create a fresh session: new id, now-timestamps, empty attributes.
    ///
    /// A fresh session starts dirty so its first save always writes.
    pub fn create(max_inactive: Duration) -> Self {
        Self::create_with_predicate(max_inactive, structural_inequality())
    }

    /// Create a fresh session with a custom attribute dirty predicate.
    pub fn create_with_predicate(max_inactive: Duration, predicate: DirtyPredicate) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                id: Uuid::new_v4().to_string(),
                creation_time: now,
                last_accessed: now,
                max_inactive,
                dirty: true,
                committed_once: false,
                attributes: AttributeMap::with_predicate(predicate),
            })),
        }
    }

    /// Reconstruct a session from a raw store value.
    ///
    /// The result is clean: the store already holds exactly this state.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        Self::from_snapshot_with_predicate(snapshot, structural_inequality())
    }

    /// Reconstruct from a raw store value with a custom dirty predicate.
    pub fn from_snapshot_with_predicate(
        snapshot: SessionSnapshot,
        predicate: DirtyPredicate,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                id: snapshot.id,
                creation_time: snapshot.creation_time,
                last_accessed: snapshot.last_accessed,
                max_inactive: interval_from_secs(snapshot.max_inactive_secs),
                dirty: false,
                committed_once: true,
                attributes: AttributeMap::from_map(snapshot.attributes, predicate),
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock()
    }

    /// Session id.
    pub fn id(&self) -> String {
        self.lock().id.clone()
    }

    /// Creation time.
    pub fn creation_time(&self) -> DateTime<Utc> {
        self.lock().creation_time
    }

    /// Last access time.
    pub fn last_accessed_time(&self) -> DateTime<Utc> {
        self.lock().last_accessed
    }

    /// Inactivity timeout. Non-positive means the session never expires.
    pub fn max_inactive_interval(&self) -> Duration {
        self.lock().max_inactive
    }

    /// Regenerate the session id, returning the new one.
    ///
    /// The store has never seen the new id, so the next save goes out as a
    /// full write rather than a delta.
    pub fn change_session_id(&self) -> String {
        let mut state = self.lock();
        state.id = Uuid::new_v4().to_string();
        state.dirty = true;
        state.committed_once = false;
        state.id.clone()
    }

    /// Set the last access time. Marks dirty only on an actual change.
    ///
    /// The `last_accessed >= creation_time` relationship is owned by the
    /// caller: replaying state from the store (or backdating in tests) may
    /// legitimately set any instant, so no guard is applied here.
    pub fn set_last_accessed_time(&self, time: DateTime<Utc>) {
        let mut state = self.lock();
        if state.last_accessed != time {
            state.last_accessed = time;
            state.dirty = true;
        }
    }

    /// Set the last access time to now.
    pub fn touch(&self) {
        self.set_last_accessed_time(Utc::now());
    }

    /// Set the inactivity timeout. Marks dirty only on an actual change.
    pub fn set_max_inactive_interval(&self, interval: Duration) {
        let mut state = self.lock();
        if state.max_inactive != interval {
            state.max_inactive = interval;
            state.dirty = true;
        }
    }

    /// Whether the inactivity timeout has elapsed since the last access.
    pub fn is_expired(&self) -> bool {
        let state = self.lock();
        if state.max_inactive <= Duration::zero() {
            return false;
        }
        // An interval too large to subtract from now cannot have elapsed.
        match Utc::now().checked_sub_signed(state.max_inactive) {
            Some(cutoff) => cutoff > state.last_accessed,
            None => false,
        }
    }

    /// Clear the dirty flag and all pending attribute changes.
    pub fn commit(&self) {
        let mut state = self.lock();
        state.dirty = false;
        state.committed_once = true;
        state.attributes.commit();
    }

    /// Whether anything changed since the last commit.
    pub fn has_delta(&self) -> bool {
        let state = self.lock();
        state.dirty || state.attributes.has_delta()
    }

    /// Whether the store has ever acknowledged this session's full state.
    pub fn has_been_committed(&self) -> bool {
        self.lock().committed_once
    }

    /// Set an attribute. A `Null` value removes it.
    pub fn set_attribute(&self, name: &str, value: AttributeValue) {
        self.lock().attributes.set(name, value);
    }

    /// Remove an attribute, returning the previous value.
    pub fn remove_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.lock().attributes.remove(name)
    }

    /// Get a clone of an attribute value.
    pub fn get_attribute(&self, name: &str) -> Option<AttributeValue> {
        self.lock().attributes.get(name).cloned()
    }

    /// All attribute names, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        self.lock().attributes.names()
    }

    /// Full copy of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.id() == other.id()
    }
}

impl Eq for Session {}

impl Hash for Session {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl PartialOrd for Session {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Session {
    fn cmp(&self, other: &Self) -> Ordering {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Ordering::Equal;
        }
        let (creation, id) = {
            let state = self.lock();
            (state.creation_time, state.id.clone())
        };
        let (other_creation, other_id) = {
            let state = other.lock();
            (state.creation_time, state.id.clone())
        };
        creation.cmp(&other_creation).then(id.cmp(&other_id))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Session")
            .field("id", &state.id)
            .field("dirty", &state.dirty)
            .field("last_accessed", &state.last_accessed)
            .finish()
    }
}
