//! Per-id interest registration for partial-replica topologies.
//!
//! A process backed by a partial replica (a "proxy" holding no data of its
//! own) must subscribe per session id to receive future notifications for
//! it. The registrar keeps its own process-wide tracked-id set, deliberately
//! separate from the event translator's ledger, and observes the same
//! notification feed: register on create, unregister on destroy and
//! invalidate. Both observers tolerate either dispatch order.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::Result;
use crate::events::{EntryNotification, EntryObserver};

/// How the local process relates to the store's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// Full replica: every notification arrives anyway, no subscription
    /// needed.
    Replica,

    /// Partial replica: explicit per-id subscription required.
    Proxy,
}

/// Subscription backend for a partial-replica store client.
pub trait InterestSubscription: Send + Sync {
    fn subscribe(&self, session_id: &str) -> Result<()>;
    fn unsubscribe(&self, session_id: &str) -> Result<()>;
}

/// Subscription backend that does nothing, for replica topologies and tests.
#[derive(Debug, Clone, Default)]
pub struct NoopSubscription;

impl InterestSubscription for NoopSubscription {
    fn subscribe(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }

    fn unsubscribe(&self, _session_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Idempotent per-id subscribe/unsubscribe bookkeeping.
pub struct InterestRegistrar {
    topology: Topology,
    tracked: Mutex<HashSet<String>>,
    subscription: Arc<dyn InterestSubscription>,
}

impl InterestRegistrar {
    pub fn new(topology: Topology, subscription: Arc<dyn InterestSubscription>) -> Self {
        Self {
            topology,
            tracked: Mutex::new(HashSet::new()),
            subscription,
        }
    }

    /// Subscribe to a session id. No-op outside proxy topology and for ids
    /// already tracked. The id is tracked only after the subscription
    /// succeeds, so a failed subscribe leaves no phantom entry.
    pub fn register(&self, session_id: &str) -> Result<()> {
        if self.topology != Topology::Proxy {
            return Ok(());
        }
        let mut tracked = self.tracked.lock();
        if tracked.contains(session_id) {
            trace!(session_id = %session_id, "Interest already registered");
            return Ok(());
        }
        self.subscription.subscribe(session_id)?;
        tracked.insert(session_id.to_string());
        debug!(session_id = %session_id, "Interest registered");
        Ok(())
    }

    /// Unsubscribe from a session id, symmetric to [`register`].
    ///
    /// [`register`]: InterestRegistrar::register
    pub fn unregister(&self, session_id: &str) -> Result<()> {
        if self.topology != Topology::Proxy {
            return Ok(());
        }
        let mut tracked = self.tracked.lock();
        if !tracked.contains(session_id) {
            return Ok(());
        }
        self.subscription.unsubscribe(session_id)?;
        tracked.remove(session_id);
        debug!(session_id = %session_id, "Interest unregistered");
        Ok(())
    }

    /// Whether the id is currently tracked.
    pub fn is_registered(&self, session_id: &str) -> bool {
        self.tracked.lock().contains(session_id)
    }
}

impl EntryObserver for InterestRegistrar {
    fn on_create(&self, notification: &EntryNotification) -> Result<()> {
        self.register(&notification.session_id()?)
    }

    fn on_destroy(&self, notification: &EntryNotification) -> Result<()> {
        self.unregister(&notification.session_id()?)
    }

    fn on_invalidate(&self, notification: &EntryNotification) -> Result<()> {
        self.unregister(&notification.session_id()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Counts subscription calls and optionally fails them.
    #[derive(Default)]
    struct CountingSubscription {
        subscribes: Mutex<Vec<String>>,
        unsubscribes: Mutex<Vec<String>>,
        fail: bool,
    }

    impl InterestSubscription for CountingSubscription {
        fn subscribe(&self, session_id: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Subscription("offline".to_string()));
            }
            self.subscribes.lock().push(session_id.to_string());
            Ok(())
        }

        fn unsubscribe(&self, session_id: &str) -> Result<()> {
            self.unsubscribes.lock().push(session_id.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_register_is_idempotent_in_proxy_topology() {
        let subscription = Arc::new(CountingSubscription::default());
        let registrar = InterestRegistrar::new(Topology::Proxy, subscription.clone());

        registrar.register("s1").unwrap();
        registrar.register("s1").unwrap();

        assert_eq!(subscription.subscribes.lock().len(), 1);
        assert!(registrar.is_registered("s1"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let subscription = Arc::new(CountingSubscription::default());
        let registrar = InterestRegistrar::new(Topology::Proxy, subscription.clone());

        registrar.register("s1").unwrap();
        registrar.unregister("s1").unwrap();
        registrar.unregister("s1").unwrap();

        assert_eq!(subscription.unsubscribes.lock().len(), 1);
        assert!(!registrar.is_registered("s1"));
    }

    #[test]
    fn test_replica_topology_is_a_noop() {
        let subscription = Arc::new(CountingSubscription::default());
        let registrar = InterestRegistrar::new(Topology::Replica, subscription.clone());

        registrar.register("s1").unwrap();
        registrar.unregister("s1").unwrap();

        assert!(subscription.subscribes.lock().is_empty());
        assert!(subscription.unsubscribes.lock().is_empty());
        assert!(!registrar.is_registered("s1"));
    }

    #[test]
    fn test_failed_subscribe_leaves_no_phantom_entry() {
        let subscription = Arc::new(CountingSubscription {
            fail: true,
            ..Default::default()
        });
        let registrar = InterestRegistrar::new(Topology::Proxy, subscription);

        assert!(registrar.register("s1").is_err());
        assert!(!registrar.is_registered("s1"));
    }

    #[test]
    fn test_observer_hooks_drive_registration() {
        let subscription = Arc::new(CountingSubscription::default());
        let registrar = InterestRegistrar::new(Topology::Proxy, subscription);

        registrar
            .on_create(&EntryNotification::created("s1", None))
            .unwrap();
        assert!(registrar.is_registered("s1"));

        registrar
            .on_invalidate(&EntryNotification::invalidated("s1", None))
            .unwrap();
        assert!(!registrar.is_registered("s1"));

        registrar
            .on_create(&EntryNotification::created("s2", None))
            .unwrap();
        registrar
            .on_destroy(&EntryNotification::destroyed("s2", None))
            .unwrap();
        assert!(!registrar.is_registered("s2"));
    }
}
