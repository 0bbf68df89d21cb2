//! Configuration for the session repository.
//!
//! All choices here are process-wide and fixed once the repository is
//! built; the delta/full serialization switch in particular is never
//! flipped per call.

use std::fmt;

use chrono::Duration;

use crate::attributes::DirtyPredicate;
use crate::interest::Topology;

/// Default inactivity timeout for new sessions, in seconds.
pub const DEFAULT_MAX_INACTIVE_SECS: i64 = 1800;

/// Configuration for the session repository.
#[derive(Clone)]
pub struct RepositoryConfig {
    /// Inactivity timeout given to newly created sessions. Non-positive
    /// disables expiration.
    pub default_max_inactive: Duration,

    /// Whether saves of already-synchronized sessions transmit deltas
    /// instead of full state.
    pub delta_enabled: bool,

    /// The local process's relation to the store's data.
    pub topology: Topology,

    /// Custom attribute dirty predicate, for attribute values that track
    /// their own pending changes. Structural inequality when unset.
    pub dirty_predicate: Option<DirtyPredicate>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_max_inactive: Duration::seconds(DEFAULT_MAX_INACTIVE_SECS),
            delta_enabled: true,
            topology: Topology::Replica,
            dirty_predicate: None,
        }
    }
}

impl RepositoryConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inactivity timeout for new sessions.
    pub fn with_max_inactive(mut self, interval: Duration) -> Self {
        self.default_max_inactive = interval;
        self
    }

    /// Enable or disable delta serialization.
    pub fn with_delta(mut self, enabled: bool) -> Self {
        self.delta_enabled = enabled;
        self
    }

    /// Set the store topology.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Set a custom attribute dirty predicate.
    pub fn with_dirty_predicate(mut self, predicate: DirtyPredicate) -> Self {
        self.dirty_predicate = Some(predicate);
        self
    }
}

impl fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("default_max_inactive", &self.default_max_inactive)
            .field("delta_enabled", &self.delta_enabled)
            .field("topology", &self.topology)
            .field("dirty_predicate", &self.dirty_predicate.is_some())
            .finish()
    }
}
