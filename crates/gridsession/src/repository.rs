//! The session repository facade.
//!
//! Orchestrates create/find/save/delete against the external store using
//! the session entity, the codec, the event translator, and the interest
//! registrar. Every read path leaves the returned session in the same
//! post-processed state: committed, touched, and interest-registered.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::attributes::AttributeValue;
use crate::config::RepositoryConfig;
use crate::delta::{DeltaSessionCodec, SessionCodec};
use crate::error::Result;
use crate::events::{
    EntryObserver, NoopEventSink, NotificationHub, SessionEventSink, SessionEventTranslator,
};
use crate::interest::{InterestRegistrar, InterestSubscription, NoopSubscription};
use crate::session::{Session, SessionSnapshot};
use crate::store::SessionStore;

/// Well-known attribute holding the authenticated principal's name, indexed
/// for [`SessionRepository::find_by_principal_name`].
pub const PRINCIPAL_NAME_ATTRIBUTE: &str = "principal_name";

/// Facade over the external store.
pub struct SessionRepository<S: SessionStore> {
    store: Arc<S>,
    codec: Arc<dyn SessionCodec>,
    translator: Arc<SessionEventTranslator>,
    interest: Arc<InterestRegistrar>,
    config: RepositoryConfig,
}

impl<S: SessionStore> SessionRepository<S> {
    /// Build a repository with no event consumer and no subscription
    /// backend.
    pub fn new(store: Arc<S>, config: RepositoryConfig) -> Self {
        Self::with_collaborators(
            store,
            Arc::new(NoopEventSink),
            Arc::new(NoopSubscription),
            config,
        )
    }

    /// Build a repository wired to a lifecycle-event sink and an interest
    /// subscription backend.
    pub fn with_collaborators(
        store: Arc<S>,
        sink: Arc<dyn SessionEventSink>,
        subscription: Arc<dyn InterestSubscription>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            store,
            codec: Arc::new(DeltaSessionCodec::new(config.delta_enabled)),
            translator: Arc::new(SessionEventTranslator::new(sink)),
            interest: Arc::new(InterestRegistrar::new(config.topology, subscription)),
            config,
        }
    }

    /// Replace the codec, e.g. with a recording double in tests.
    pub fn with_codec(mut self, codec: Arc<dyn SessionCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// The repository's configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// The event translator, for inspecting the ledger.
    pub fn translator(&self) -> &Arc<SessionEventTranslator> {
        &self.translator
    }

    /// The interest registrar.
    pub fn interest_registrar(&self) -> &Arc<InterestRegistrar> {
        &self.interest
    }

    /// A hub over this repository's observers, in dispatch order, ready to
    /// be fed the store's notification feed.
    pub fn notification_hub(&self) -> NotificationHub {
        NotificationHub::new(vec![
            Arc::clone(&self.translator) as Arc<dyn EntryObserver>,
            Arc::clone(&self.interest) as Arc<dyn EntryObserver>,
        ])
    }

    /// Create a fresh session with the configured inactivity timeout.
    ///
    /// The session is not stored until its first [`save`].
    ///
    /// [`save`]: SessionRepository::save
    pub fn create_session(&self) -> Session {
        let session = match &self.config.dirty_predicate {
            Some(predicate) => Session::create_with_predicate(
                self.config.default_max_inactive,
                Arc::clone(predicate),
            ),
            None => Session::create(self.config.default_max_inactive),
        };
        trace!(session_id = %session.id(), "Session created locally");
        session
    }

    /// Fetch a session by id.
    ///
    /// A session whose inactivity timeout has elapsed is logically deleted
    /// and reported as absent.
    pub fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(snapshot) = self.store.get(session_id)? else {
            return Ok(None);
        };
        let session = self.restore(snapshot);
        if session.is_expired() {
            debug!(session_id = %session_id, "Session expired on fetch, deleting");
            self.delete_by_id(session_id)?;
            return Ok(None);
        }
        self.post_process(&session)?;
        Ok(Some(session))
    }

    /// Write a session's pending changes to the store.
    ///
    /// A clean session performs no store write at all. The session is
    /// committed only after the store acknowledges the write; a crash in
    /// between re-sends the delta, it never loses one.
    pub fn save(&self, session: &Session) -> Result<()> {
        if !session.has_delta() {
            trace!(session_id = %session.id(), "No changes, skipping save");
            return Ok(());
        }
        let session_id = session.id();
        let payload = self.codec.encode(session)?;
        self.store.put(&session_id, payload)?;
        session.commit();
        debug!(session_id = %session_id, "Session saved");
        Ok(())
    }

    /// Remove a session from the store and drive the destroy path directly,
    /// so Deleted fires even when the store pushes no destroy notification
    /// for local removals.
    ///
    /// Once the store acknowledges the removal, ledger bookkeeping and the
    /// Deleted event always complete; a failing subscription backend is
    /// logged and cannot suppress them.
    pub fn delete_by_id(&self, session_id: &str) -> Result<()> {
        let removed = self.store.remove(session_id)?;
        self.translator.session_deleted(session_id, removed);
        if let Err(err) = self.interest.unregister(session_id) {
            warn!(
                session_id = %session_id,
                error = %err,
                "Interest unregister failed after delete"
            );
        }
        Ok(())
    }

    /// All sessions whose indexed attribute equals the given value, each
    /// given the identical post-fetch treatment as [`find_by_id`].
    ///
    /// [`find_by_id`]: SessionRepository::find_by_id
    pub fn find_by_indexed_attribute(
        &self,
        name: &str,
        value: &AttributeValue,
    ) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for snapshot in self.store.find_by_attribute(name, value)? {
            let session = self.restore(snapshot);
            if session.is_expired() {
                let session_id = session.id();
                debug!(session_id = %session_id, "Session expired on query, deleting");
                self.delete_by_id(&session_id)?;
                continue;
            }
            self.post_process(&session)?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    /// All sessions belonging to the given principal.
    pub fn find_by_principal_name(&self, principal: &str) -> Result<Vec<Session>> {
        self.find_by_indexed_attribute(PRINCIPAL_NAME_ATTRIBUTE, &AttributeValue::from(principal))
    }

    fn restore(&self, snapshot: SessionSnapshot) -> Session {
        match &self.config.dirty_predicate {
            Some(predicate) => {
                Session::from_snapshot_with_predicate(snapshot, Arc::clone(predicate))
            }
            None => Session::from_snapshot(snapshot),
        }
    }

    /// Uniform treatment of every fetched session: commit the
    /// just-synchronized state, record the access, register interest.
    fn post_process(&self, session: &Session) -> Result<()> {
        session.commit();
        session.touch();
        self.interest.register(&session.id())?;
        Ok(())
    }
}
