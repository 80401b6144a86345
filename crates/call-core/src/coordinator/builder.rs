//! Coordinator builder

use std::sync::Arc;

use crate::coordinator::{CallSessionCoordinator, CoordinatorConfig};
use crate::error::{CallError, CallResult};
use crate::events::CallEventHandler;
use crate::identity::{IdentityResolver, StaticIdentityResolver};
use crate::media::{MediaDevices, UncheckedDevices};
use crate::platform::RealtimePlatform;
use crate::session::ParticipantId;

/// Builder for a [`CallSessionCoordinator`]
///
/// The local participant and the platform are required; devices default to
/// [`UncheckedDevices`] and identity to an empty [`StaticIdentityResolver`].
pub struct CoordinatorBuilder {
    local: Option<ParticipantId>,
    platform: Option<Arc<dyn RealtimePlatform>>,
    devices: Arc<dyn MediaDevices>,
    identity: Arc<dyn IdentityResolver>,
    handler: Option<Arc<dyn CallEventHandler>>,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            local: None,
            platform: None,
            devices: Arc::new(UncheckedDevices),
            identity: Arc::new(StaticIdentityResolver::new()),
            handler: None,
            config: CoordinatorConfig::default(),
        }
    }

    /// Set the local participant the coordinator acts for
    pub fn local(mut self, id: impl Into<ParticipantId>) -> Self {
        self.local = Some(id.into());
        self
    }

    /// Set the realtime platform client
    pub fn platform(mut self, platform: Arc<dyn RealtimePlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set the capture device probe
    pub fn devices(mut self, devices: Arc<dyn MediaDevices>) -> Self {
        self.devices = devices;
        self
    }

    /// Set the identity resolver used to label rings
    pub fn identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    /// Install a callback-style event handler
    pub fn event_handler(mut self, handler: Arc<dyn CallEventHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the auto-decline window (convenience)
    pub fn ring_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.ring_timeout = timeout;
        self
    }

    /// Set the post-call settle delay (convenience)
    pub fn settle_delay(mut self, delay: std::time::Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Build the coordinator; `start()` it afterwards
    pub async fn build(self) -> CallResult<Arc<CallSessionCoordinator>> {
        let local = self.local.ok_or(CallError::Configuration {
            field: "local",
            reason: "local participant id is required".into(),
        })?;
        let platform = self.platform.ok_or(CallError::Configuration {
            field: "platform",
            reason: "realtime platform client is required".into(),
        })?;

        let coordinator = CallSessionCoordinator::new(
            local,
            platform,
            self.devices,
            self.identity,
            self.config,
        );
        if let Some(handler) = self.handler {
            coordinator.set_event_handler(handler).await;
        }
        Ok(coordinator)
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
