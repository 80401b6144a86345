//! Event delivery from the coordinator to the embedding layer
//!
//! The embedder observes the session two ways: a broadcast channel of typed
//! [`CallEvent`]s for task-style consumers, and the optional
//! [`CallEventHandler`] callback trait for UI bridges. Both carry derived
//! state only — the coordinator remains the single owner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CallError;
use crate::session::{CallId, CallState, RingDescriptor};

/// Decision returned by a handler for an inbound ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingAction {
    /// Join the call immediately
    Accept,
    /// Decline the call, notifying the caller
    Decline,
    /// Keep ringing; the decision comes later via `accept()`/`reject()`
    /// or the auto-decline timer
    Ignore,
}

/// Record of a call state transition
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    /// Call the transition belongs to, when one is held
    pub call_id: Option<CallId>,
    /// State entered
    pub new_state: CallState,
    /// State left
    pub previous_state: CallState,
    /// Cause, when one is worth surfacing ("remote rejected",
    /// "ring window expired", ...)
    pub reason: Option<String>,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

/// Events published by the coordinator
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The session moved to a new state
    StateChanged { info: CallStatusInfo },
    /// An inbound ring was recorded
    IncomingRing { info: RingDescriptor },
    /// An operation failed; the session recovered per its contract
    CallError {
        error: CallError,
        call_id: Option<CallId>,
    },
}

/// Callback-style consumer of coordinator events
///
/// Invoked from the coordinator's transition handler: implementations must
/// not call back into the action methods directly (post the work to a task
/// instead), or the mailbox deadlocks waiting on itself. Returning a
/// [`RingAction`] from `on_incoming_ring` is the supported way to decide a
/// ring inline.
#[async_trait]
pub trait CallEventHandler: Send + Sync {
    /// Decide an inbound ring; default leaves it ringing
    async fn on_incoming_ring(&self, _info: RingDescriptor) -> RingAction {
        RingAction::Ignore
    }

    /// Observe a state transition
    async fn on_state_changed(&self, _info: CallStatusInfo) {}

    /// Observe a classified failure
    async fn on_error(&self, _error: CallError, _call_id: Option<CallId>) {}
}
