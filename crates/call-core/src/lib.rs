//! Call-core: call session coordination layer for tutoring clients
//!
//! This crate owns the lifecycle of a single peer-to-peer call between a
//! coach and a student by delegating all signaling and media work to a
//! hosted realtime platform.
//!
//! ## Proper layer separation
//! ```text
//! embedding UI -> call-core -> {realtime platform, identity store, devices}
//! ```
//!
//! Call-core focuses on:
//! - The call lifecycle state machine (idle/setup/ready/outgoing/incoming/
//!   active/ended) and its invariants
//! - Reconciling asynchronously arriving platform signals against current
//!   state, dropping stale ones
//! - Cancellable ring-decline and post-call settle timers
//! - Typed failures with a defined recovery transition for each
//!
//! Connection management, signaling transport, media negotiation and
//! persistence are the platform's responsibility behind the
//! [`platform::RealtimePlatform`] seam; profile data stays behind
//! [`identity::IdentityResolver`].
//!
//! ## Basic call flow
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use tutorcall_call_core::{CoordinatorBuilder, RealtimePlatform};
//! # async fn example(platform: Arc<dyn RealtimePlatform>) -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = CoordinatorBuilder::new()
//!     .local("coach-7")
//!     .platform(platform)
//!     .build()
//!     .await?;
//! coordinator.start().await?;
//!
//! coordinator.setup_call("student-12").await?; // probe devices, prepare the call
//! coordinator.start_call().await?;             // join locally, ring the student
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod identity;
pub mod media;
pub mod platform;
pub mod session;

pub use client::{ClientSession, TokenProvider};
pub use coordinator::{
    CallSessionCoordinator, CoordinatorBuilder, CoordinatorConfig, CoordinatorStats,
};
pub use error::{CallError, CallResult, DeviceErrorKind};
pub use events::{CallEvent, CallEventHandler, CallStatusInfo, RingAction};
pub use identity::{IdentityResolver, ParticipantProfile, StaticIdentityResolver};
pub use media::{CaptureGrant, DeviceError, MediaDevices, UncheckedDevices};
pub use platform::{CallHandle, CallSignal, PlatformError, RealtimePlatform};
pub use session::{CallId, CallState, ParticipantId, RingDescriptor};

/// Call-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
