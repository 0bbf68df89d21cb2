//! Full and incremental session encoding.
//!
//! A full payload carries the entire session; a delta carries the cheap
//! scalars unconditionally plus only the changed attributes. Decoding a
//! delta onto a receiver that already holds the previous full state
//! reproduces the sender's observable state; attributes omitted from the
//! delta retain the receiver's prior value. Whether deltas are used at all
//! is a single process-wide choice fixed at startup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::AttributeValue;
use crate::error::{Error, Result};
use crate::session::{Session, SessionSnapshot, interval_from_secs};

/// Incremental encoding: scalars plus changed attribute pairs.
/// A `Null` value in a pair marks a removed attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDelta {
    pub id: String,
    pub last_accessed: DateTime<Utc>,
    pub max_inactive_secs: i64,
    pub attributes: Vec<(String, AttributeValue)>,
}

/// What a save transmits to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionPayload {
    Full(SessionSnapshot),
    Delta(SessionDelta),
}

impl SessionPayload {
    /// The session id the payload is keyed by.
    pub fn session_id(&self) -> &str {
        match self {
            SessionPayload::Full(snapshot) => &snapshot.id,
            SessionPayload::Delta(delta) => &delta.id,
        }
    }
}

/// Encode/decode strategy for session state.
///
/// Taken as a trait object by the repository so tests can substitute
/// recording or no-op codecs.
pub trait SessionCodec: Send + Sync {
    /// Encode a session for transmission.
    fn encode(&self, session: &Session) -> Result<SessionPayload>;

    /// Apply a payload onto a receiver session.
    fn decode(&self, payload: SessionPayload, target: &Session) -> Result<()>;
}

/// The production codec.
///
/// With deltas enabled it still sends a full payload for any session the
/// store has never acknowledged (first write, or first write after an id
/// change), because a delta is only meaningful against existing full state.
pub struct DeltaSessionCodec {
    delta_enabled: bool,
}

impl DeltaSessionCodec {
    pub fn new(delta_enabled: bool) -> Self {
        Self { delta_enabled }
    }

    /// A codec that always sends full payloads.
    pub fn full_only() -> Self {
        Self::new(false)
    }
}

impl SessionCodec for DeltaSessionCodec {
    fn encode(&self, session: &Session) -> Result<SessionPayload> {
        let state = session.lock();
        if self.delta_enabled && state.committed_once {
            Ok(SessionPayload::Delta(SessionDelta {
                id: state.id.clone(),
                last_accessed: state.last_accessed,
                max_inactive_secs: state.max_inactive.num_seconds(),
                attributes: state.attributes.to_delta(),
            }))
        } else {
            Ok(SessionPayload::Full(state.snapshot()))
        }
    }

    fn decode(&self, payload: SessionPayload, target: &Session) -> Result<()> {
        match payload {
            SessionPayload::Full(snapshot) => {
                let mut state = target.lock();
                state.id = snapshot.id;
                state.creation_time = snapshot.creation_time;
                state.last_accessed = snapshot.last_accessed;
                state.max_inactive = interval_from_secs(snapshot.max_inactive_secs);
                state.attributes.replace_all(snapshot.attributes);
                state.dirty = false;
                state.committed_once = true;
                Ok(())
            }
            SessionPayload::Delta(delta) => {
                let mut state = target.lock();
                // A delta only makes sense against previously-synchronized
                // full state, never a blank instance.
                if !state.committed_once {
                    return Err(Error::DeltaWithoutBase(delta.id));
                }
                state.id = delta.id;
                state.last_accessed = delta.last_accessed;
                state.max_inactive = interval_from_secs(delta.max_inactive_secs);
                state.attributes.apply_delta(delta.attributes);
                state.dirty = false;
                Ok(())
            }
        }
    }
}
