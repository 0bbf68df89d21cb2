//! Translation of raw cache entry notifications into session lifecycle
//! events.
//!
//! The external store delivers entry notifications at-least-once, possibly
//! reordered, possibly without values. [`SessionEventTranslator`] turns them
//! into deduplicated [`SessionEvent`]s using a process-wide ledger of ids
//! already announced as created. Observers are composed into a
//! [`NotificationHub`] that fans each notification out and isolates
//! per-observer faults, so one failing observer never starves another.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::session::SessionSnapshot;

/// Kind of a raw store notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOp {
    Create,
    Update,
    Destroy,
    Invalidate,
}

/// A raw entry notification from the store's feed.
///
/// Values are untyped because delivery is best-effort: a notification may
/// carry the affected session, some other value entirely, or nothing.
#[derive(Debug, Clone)]
pub struct EntryNotification {
    pub op: EntryOp,
    pub key: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: Option<serde_json::Value>,
}

impl EntryNotification {
    pub fn created(key: impl Into<String>, new_value: Option<serde_json::Value>) -> Self {
        Self {
            op: EntryOp::Create,
            key: key.into(),
            old_value: None,
            new_value,
        }
    }

    pub fn updated(
        key: impl Into<String>,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            op: EntryOp::Update,
            key: key.into(),
            old_value,
            new_value,
        }
    }

    pub fn destroyed(key: impl Into<String>, old_value: Option<serde_json::Value>) -> Self {
        Self {
            op: EntryOp::Destroy,
            key: key.into(),
            old_value,
            new_value: None,
        }
    }

    pub fn invalidated(key: impl Into<String>, old_value: Option<serde_json::Value>) -> Self {
        Self {
            op: EntryOp::Invalidate,
            key: key.into(),
            old_value,
            new_value: None,
        }
    }

    /// Resolve the session id: the key when present, else the id of a
    /// session-like value. A notification with neither is unidentifiable
    /// and cannot be processed safely.
    pub fn session_id(&self) -> Result<String> {
        if !self.key.is_empty() {
            return Ok(self.key.clone());
        }
        self.new_value
            .as_ref()
            .or(self.old_value.as_ref())
            .and_then(SessionSnapshot::from_value)
            .map(|snapshot| snapshot.id)
            .ok_or_else(|| Error::UnresolvableNotification(self.key.clone()))
    }
}

/// Capability interface for one observer of the notification feed.
///
/// Every hook defaults to a no-op so observers implement only the
/// notifications they care about.
pub trait EntryObserver: Send + Sync {
    fn on_create(&self, _notification: &EntryNotification) -> Result<()> {
        Ok(())
    }

    fn on_update(&self, _notification: &EntryNotification) -> Result<()> {
        Ok(())
    }

    fn on_destroy(&self, _notification: &EntryNotification) -> Result<()> {
        Ok(())
    }

    fn on_invalidate(&self, _notification: &EntryNotification) -> Result<()> {
        Ok(())
    }
}

/// Fan-out dispatcher over an ordered set of observers.
///
/// A failing observer is logged and the remaining observers still run; feed
/// delivery is fire-and-forget and must never be interrupted.
pub struct NotificationHub {
    observers: Vec<Arc<dyn EntryObserver>>,
}

impl NotificationHub {
    pub fn new(observers: Vec<Arc<dyn EntryObserver>>) -> Self {
        Self { observers }
    }

    /// Deliver one notification to every observer in order.
    pub fn dispatch(&self, notification: &EntryNotification) {
        for observer in &self.observers {
            let result = match notification.op {
                EntryOp::Create => observer.on_create(notification),
                EntryOp::Update => observer.on_update(notification),
                EntryOp::Destroy => observer.on_destroy(notification),
                EntryOp::Invalidate => observer.on_invalidate(notification),
            };
            if let Err(err) = result {
                error!(
                    key = %notification.key,
                    op = ?notification.op,
                    error = %err,
                    "Entry observer failed"
                );
            }
        }
    }
}

/// Kind of a translated session lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    Created,
    Deleted,
    Destroyed,
    Expired,
}

/// A high-level session lifecycle event.
///
/// Carries the full session snapshot when the notification had one, or just
/// the id otherwise.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session_id: String,
    pub session: Option<SessionSnapshot>,
}

impl SessionEvent {
    fn new(kind: SessionEventKind, session_id: String, session: Option<SessionSnapshot>) -> Self {
        Self {
            kind,
            session_id,
            session,
        }
    }
}

/// Downstream consumer of lifecycle events.
pub trait SessionEventSink: Send + Sync {
    fn publish(&self, event: SessionEvent) -> Result<()>;
}

/// Sink that drops events, for wiring without a consumer.
#[derive(Debug, Clone, Default)]
pub struct NoopEventSink;

impl SessionEventSink for NoopEventSink {
    fn publish(&self, _event: SessionEvent) -> Result<()> {
        Ok(())
    }
}

/// Maps raw entry notifications to deduplicated lifecycle events.
///
/// The ledger is a process-wide set of session ids already announced as
/// Created. It lives as long as the repository and suppresses the duplicate
/// create notifications a replicated store delivers for one logical insert,
/// as well as destroy echoes for sessions already forgotten.
pub struct SessionEventTranslator {
    ledger: Mutex<HashSet<String>>,
    sink: Arc<dyn SessionEventSink>,
}

impl SessionEventTranslator {
    pub fn new(sink: Arc<dyn SessionEventSink>) -> Self {
        Self {
            ledger: Mutex::new(HashSet::new()),
            sink,
        }
    }

    /// Whether the ledger currently remembers this id.
    pub fn remembers(&self, session_id: &str) -> bool {
        self.ledger.lock().contains(session_id)
    }

    /// The facade-driven explicit-delete path.
    ///
    /// Emits Deleted with the just-removed value even when the store issues
    /// no destroy notification for local removals.
    pub fn session_deleted(&self, session_id: &str, snapshot: Option<SessionSnapshot>) {
        self.ledger.lock().remove(session_id);
        debug!(session_id = %session_id, "Session deleted");
        self.publish(SessionEvent::new(
            SessionEventKind::Deleted,
            session_id.to_string(),
            snapshot,
        ));
    }

    /// Publish one event. Sink failures are logged here and never
    /// propagate; ledger and interest bookkeeping must always complete.
    fn publish(&self, event: SessionEvent) {
        let kind = event.kind;
        let session_id = event.session_id.clone();
        if let Err(err) = self.sink.publish(event) {
            warn!(
                session_id = %session_id,
                kind = ?kind,
                error = %err,
                "Event sink failed, event dropped"
            );
        }
    }

    /// Shared removal path for destroy and invalidate notifications.
    ///
    /// Resolves the session id *before* touching the ledger so an
    /// unidentifiable notification fails without mutating anything.
    fn forget_and_publish(
        &self,
        notification: &EntryNotification,
        kind: SessionEventKind,
    ) -> Result<()> {
        let session_id = notification.session_id()?;
        let snapshot = notification
            .old_value
            .as_ref()
            .and_then(SessionSnapshot::from_value);
        let remembered = self.ledger.lock().remove(&session_id);

        // At-least-once delivery: a repeat of a value-less notification for
        // an already-forgotten id is a duplicate, not a new removal.
        if !remembered && snapshot.is_none() {
            trace!(session_id = %session_id, kind = ?kind, "Duplicate removal notification ignored");
            return Ok(());
        }

        self.publish(SessionEvent::new(kind, session_id, snapshot));
        Ok(())
    }
}

impl EntryObserver for SessionEventTranslator {
    fn on_create(&self, notification: &EntryNotification) -> Result<()> {
        // Only a session-like value announces a session; and only the first
        // sighting of an id does (replica echoes and plain overwrites of a
        // known id are not fresh sessions).
        let Some(snapshot) = notification
            .new_value
            .as_ref()
            .and_then(SessionSnapshot::from_value)
        else {
            trace!(key = %notification.key, "Create notification without session value ignored");
            return Ok(());
        };

        let session_id = if notification.key.is_empty() {
            snapshot.id.clone()
        } else {
            notification.key.clone()
        };

        if !self.ledger.lock().insert(session_id.clone()) {
            trace!(session_id = %session_id, "Create notification for known session ignored");
            return Ok(());
        }

        debug!(session_id = %session_id, "Session created");
        self.publish(SessionEvent::new(
            SessionEventKind::Created,
            session_id,
            Some(snapshot),
        ));
        Ok(())
    }

    fn on_destroy(&self, notification: &EntryNotification) -> Result<()> {
        self.forget_and_publish(notification, SessionEventKind::Destroyed)
    }

    fn on_invalidate(&self, notification: &EntryNotification) -> Result<()> {
        self.forget_and_publish(notification, SessionEventKind::Expired)
    }
}
