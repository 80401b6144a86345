//! Realtime platform seam
//!
//! The coordinator consumes the hosted chat/video platform exclusively
//! through these traits: call object creation, join/ring/leave/reject verbs,
//! and a broadcast stream of call signals. Connection management, signaling
//! transport, media negotiation and persistence all live behind this
//! boundary and are never reimplemented here.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::identity::ParticipantProfile;
use crate::session::{CallId, ParticipantId};

/// Failure reported by the realtime platform
///
/// The coordinator wraps these into [`crate::CallError::Transport`] at its
/// boundary; embedders only ever see the wrapped form.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct PlatformError {
    pub message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Out-of-band call signal pushed by the platform
///
/// Each signal carries the identifier of the call it originated from so the
/// coordinator can reconcile it against the current attempt and discard
/// signals for call handles it no longer holds.
#[derive(Debug, Clone)]
pub enum CallSignal {
    /// An inbound call is ringing; carries the remote handle to join on accept
    Ring {
        call: Arc<dyn CallHandle>,
        from: ParticipantId,
        to: ParticipantId,
    },
    /// The remote participant accepted the call we are ringing
    Accepted { call_id: CallId, by: ParticipantId },
    /// The remote participant rejected the call
    Rejected { call_id: CallId, by: ParticipantId },
    /// The call was torn down
    Ended { call_id: CallId },
}

impl CallSignal {
    /// Identifier of the call this signal belongs to
    pub fn call_id(&self) -> CallId {
        match self {
            CallSignal::Ring { call, .. } => call.id(),
            CallSignal::Accepted { call_id, .. }
            | CallSignal::Rejected { call_id, .. }
            | CallSignal::Ended { call_id } => *call_id,
        }
    }
}

/// Opaque reference to an in-progress call object on the platform
///
/// Exclusively held by the coordinator for the lifetime of one call attempt.
#[async_trait]
pub trait CallHandle: fmt::Debug + Send + Sync {
    /// Platform identifier for this call
    fn id(&self) -> CallId;

    /// Join the call transport locally
    async fn join(&self) -> Result<(), PlatformError>;

    /// Signal the ring to the remote members of the call
    async fn ring(&self) -> Result<(), PlatformError>;

    /// Leave the call transport
    async fn leave(&self) -> Result<(), PlatformError>;

    /// Decline the call, notifying the caller
    async fn reject(&self) -> Result<(), PlatformError>;
}

/// Client connection to the hosted realtime platform
#[async_trait]
pub trait RealtimePlatform: Send + Sync {
    /// Establish the platform connection for a participant
    async fn connect(
        &self,
        profile: &ParticipantProfile,
        token: &str,
    ) -> Result<(), PlatformError>;

    /// Tear the connection down
    async fn disconnect(&self) -> Result<(), PlatformError>;

    /// Create a call object between two participants, not yet joined or rung
    async fn create_call(
        &self,
        local: &ParticipantId,
        remote: &ParticipantId,
    ) -> Result<Arc<dyn CallHandle>, PlatformError>;

    /// Subscribe to call signals addressed to the connected participant
    fn signals(&self) -> broadcast::Receiver<CallSignal>;
}
