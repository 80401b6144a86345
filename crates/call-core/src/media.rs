//! Capture device probe seam
//!
//! `setup()` verifies camera/microphone capability before a call is offered:
//! the devices are acquired, then released immediately, so conflicts surface
//! early without holding the hardware. The transport re-acquires the devices
//! itself when the call is joined.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::DeviceErrorKind;

/// Failure raised by the capture probe, already classified
#[derive(Error, Debug, Clone)]
#[error("{reason}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub reason: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn in_use(reason: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::InUse, reason)
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::PermissionDenied, reason)
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(DeviceErrorKind::NotFound, reason)
    }
}

/// A transient hold on the capture devices; released on drop
pub trait CaptureGrant: Send {}

/// Camera/microphone capability access
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire the capture devices
    ///
    /// The coordinator drops the grant immediately after a successful probe.
    async fn acquire(&self) -> Result<Box<dyn CaptureGrant>, DeviceError>;
}

/// Device access for embedders without local capture hardware concerns
///
/// Always grants. Useful for headless embedders and tests where the
/// transport performs its own device handling.
#[derive(Debug, Default)]
pub struct UncheckedDevices;

struct UncheckedGrant;

impl CaptureGrant for UncheckedGrant {}

#[async_trait]
impl MediaDevices for UncheckedDevices {
    async fn acquire(&self) -> Result<Box<dyn CaptureGrant>, DeviceError> {
        Ok(Box::new(UncheckedGrant))
    }
}
