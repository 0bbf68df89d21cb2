//! Session state for external distributed caches.
//!
//! Web-tier processes keep a local, mutable view of each HTTP session while
//! the authoritative state lives in an external store. This crate provides:
//! - per-attribute dirty tracking so only changed data is re-transmitted
//! - full and incremental (delta) session encoding
//! - translation of raw, at-least-once store notifications into
//!   deduplicated lifecycle events (Created/Deleted/Destroyed/Expired)
//! - per-id interest subscription bookkeeping for partial-replica
//!   topologies
//!
//! # Example
//!
//! ```rust,ignore
//! use gridsession::{MemoryStore, RepositoryConfig, SessionRepository};
//!
//! let store = Arc::new(MemoryStore::new());
//! let repository = SessionRepository::new(store, RepositoryConfig::default());
//!
//! let session = repository.create_session();
//! session.set_attribute("user", "alice".into());
//! repository.save(&session)?;
//! ```

mod attributes;
mod config;
mod delta;
mod error;
mod events;
mod interest;
mod repository;
mod session;
mod store;

pub use attributes::{AttributeMap, AttributeValue, DirtyPredicate, structural_inequality};
pub use config::{DEFAULT_MAX_INACTIVE_SECS, RepositoryConfig};
pub use delta::{DeltaSessionCodec, SessionCodec, SessionDelta, SessionPayload};
pub use error::{Error, Result};
pub use events::{
    EntryNotification, EntryObserver, EntryOp, NoopEventSink, NotificationHub, SessionEvent,
    SessionEventKind, SessionEventSink, SessionEventTranslator,
};
pub use interest::{InterestRegistrar, InterestSubscription, NoopSubscription, Topology};
pub use repository::{PRINCIPAL_NAME_ATTRIBUTE, SessionRepository};
pub use session::{Session, SessionSnapshot};
pub use store::{MemoryStore, SessionStore};
