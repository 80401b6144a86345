//! Call session data model
//!
//! This module provides the lifecycle states and session records for a single
//! peer-to-peer call. All actual signaling and media operations are delegated
//! to the realtime platform behind the [`crate::platform`] seam.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platform::CallHandle;

/// Unique identifier for a call
pub type CallId = Uuid;

/// Opaque identity token for a call participant
///
/// The coordinator never interprets the contents; equality is the only
/// operation that matters (self-calls are rejected, signals are matched
/// against the local participant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Current state of the call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// No call in progress
    Idle,
    /// Probing camera/microphone capability and preparing the call handle
    Setup,
    /// Call handle prepared, devices verified, not yet joined
    Ready,
    /// Joined locally and ringing the remote participant
    Outgoing,
    /// Inbound ring waiting for a local decision
    Incoming,
    /// Both participants joined, media flowing
    Active,
    /// Call finished, waiting out the settle delay before resetting
    Ended,
}

impl CallState {
    /// Check whether a call attempt is currently engaged
    ///
    /// An engaged session refuses a second `setup()` and silently drops
    /// further inbound rings (first ring wins).
    pub fn is_engaged(&self) -> bool {
        matches!(
            self,
            CallState::Setup
                | CallState::Ready
                | CallState::Outgoing
                | CallState::Incoming
                | CallState::Active
        )
    }

    /// Check whether the session is between calls (`Idle` or `Ended`)
    pub fn is_settled(&self) -> bool {
        matches!(self, CallState::Idle | CallState::Ended)
    }

    /// Check whether media can flow in this state
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Active)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Idle => "idle",
            CallState::Setup => "setup",
            CallState::Ready => "ready",
            CallState::Outgoing => "outgoing",
            CallState::Incoming => "incoming",
            CallState::Active => "active",
            CallState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Descriptor for a pending inbound ring
///
/// Held by the session only while the state is [`CallState::Incoming`];
/// cleared on any transition away from it.
#[derive(Debug, Clone)]
pub struct RingDescriptor {
    /// Identifier of the call being offered
    pub call_id: CallId,
    /// Who is calling
    pub from: ParticipantId,
    /// Display label for the caller, if the identity store knows one
    pub from_display_name: Option<String>,
    /// When the ring arrived locally
    pub received_at: DateTime<Utc>,
}

/// One call lifecycle between exactly two identified participants
///
/// Owned exclusively by the coordinator's driver task; everything else sees
/// read-only snapshots. The handle is held for the lifetime of one call
/// attempt and released on the transition to `Ended` or back to `Idle`.
pub(crate) struct CallSession {
    /// The local participant this session belongs to
    pub local: ParticipantId,
    /// Current lifecycle state
    pub state: CallState,
    /// The other party of the current attempt, if any
    pub remote: Option<ParticipantId>,
    /// Platform handle for the current attempt
    pub handle: Option<Arc<dyn CallHandle>>,
    /// Inbound ring awaiting a decision; populated only in `Incoming`
    pub pending_incoming: Option<RingDescriptor>,
    /// Handle being rung; populated only in `Outgoing`
    pub pending_outgoing: Option<Arc<dyn CallHandle>>,
    /// Bumped on every transition that arms a timer, so a timer message
    /// that lost the race against a state change can be recognized as stale
    pub epoch: u64,
}

impl CallSession {
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            state: CallState::Idle,
            remote: None,
            handle: None,
            pending_incoming: None,
            pending_outgoing: None,
            epoch: 0,
        }
    }

    /// Identifier of the call attempt currently holding the handle
    pub fn call_id(&self) -> Option<CallId> {
        self.handle.as_ref().map(|h| h.id())
    }

    /// Drop every per-attempt field, keeping the local identity
    pub fn clear_attempt(&mut self) {
        self.remote = None;
        self.handle = None;
        self.pending_incoming = None;
        self.pending_outgoing = None;
    }
}

impl fmt::Debug for CallSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSession")
            .field("local", &self.local)
            .field("state", &self.state)
            .field("remote", &self.remote)
            .field("call_id", &self.call_id())
            .field("pending_incoming", &self.pending_incoming)
            .field("epoch", &self.epoch)
            .finish()
    }
}
