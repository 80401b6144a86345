//! Session-scoped owner of the platform connection
//!
//! The platform connection follows the login session, not the process:
//! [`ClientSession::login`] issues a token, connects the platform as the
//! given participant and hands out a started coordinator;
//! [`ClientSession::logout`] tears both down. Logging in as a different
//! participant disconnects the previous one first.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::coordinator::{CallSessionCoordinator, CoordinatorBuilder, CoordinatorConfig};
use crate::error::{CallError, CallResult};
use crate::identity::{IdentityResolver, ParticipantProfile, StaticIdentityResolver};
use crate::media::{MediaDevices, UncheckedDevices};
use crate::platform::{PlatformError, RealtimePlatform};
use crate::session::ParticipantId;

/// Credential issuance for the platform handshake
///
/// Token generation lives in the auth backend; this seam only carries the
/// result into `connect`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn issue_token(&self, id: &ParticipantId) -> Result<String, PlatformError>;
}

struct ActiveLogin {
    profile: ParticipantProfile,
    coordinator: Arc<CallSessionCoordinator>,
}

/// Owner of one participant's platform connection and coordinator
pub struct ClientSession {
    platform: Arc<dyn RealtimePlatform>,
    tokens: Arc<dyn TokenProvider>,
    devices: Arc<dyn MediaDevices>,
    identity: Arc<dyn IdentityResolver>,
    config: CoordinatorConfig,
    active: Mutex<Option<ActiveLogin>>,
}

impl ClientSession {
    pub fn new(platform: Arc<dyn RealtimePlatform>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            platform,
            tokens,
            devices: Arc::new(UncheckedDevices),
            identity: Arc::new(StaticIdentityResolver::new()),
            config: CoordinatorConfig::default(),
            active: Mutex::new(None),
        }
    }

    pub fn with_devices(mut self, devices: Arc<dyn MediaDevices>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Connect the platform as `profile` and return a started coordinator
    ///
    /// Idempotent for the same participant; a different participant tears
    /// the previous connection down first.
    pub async fn login(
        &self,
        profile: ParticipantProfile,
    ) -> CallResult<Arc<CallSessionCoordinator>> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.as_ref() {
            if current.profile.id == profile.id {
                debug!(participant = %profile.id, "already connected for this participant");
                return Ok(current.coordinator.clone());
            }
        }
        if let Some(previous) = active.take() {
            info!(
                previous = %previous.profile.id,
                next = %profile.id,
                "identity changed, tearing previous connection down"
            );
            self.teardown(previous).await;
        }

        let token = self
            .tokens
            .issue_token(&profile.id)
            .await
            .map_err(|e| CallError::transport("issue_token", e))?;
        self.platform
            .connect(&profile, &token)
            .await
            .map_err(|e| CallError::transport("connect", e))?;

        let coordinator = CoordinatorBuilder::new()
            .local(profile.id.clone())
            .platform(self.platform.clone())
            .devices(self.devices.clone())
            .identity(self.identity.clone())
            .config(self.config.clone())
            .build()
            .await?;
        coordinator.start().await?;

        info!(participant = %profile.id, "platform session established");
        *active = Some(ActiveLogin {
            profile,
            coordinator: coordinator.clone(),
        });
        Ok(coordinator)
    }

    /// Disconnect the platform and discard the coordinator
    pub async fn logout(&self) -> CallResult<()> {
        let mut active = self.active.lock().await;
        if let Some(login) = active.take() {
            info!(participant = %login.profile.id, "logging out");
            self.teardown(login).await;
        }
        Ok(())
    }

    /// The coordinator of the current login, if any
    pub async fn coordinator(&self) -> Option<Arc<CallSessionCoordinator>> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|login| login.coordinator.clone())
    }

    /// Whether a login is established and its coordinator is running
    pub async fn is_ready(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|login| login.coordinator.is_running())
            .unwrap_or(false)
    }

    /// The currently logged-in participant, if any
    pub async fn current_participant(&self) -> Option<ParticipantId> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|login| login.profile.id.clone())
    }

    async fn teardown(&self, login: ActiveLogin) {
        if let Err(error) = login.coordinator.stop().await {
            warn!(%error, "coordinator stop failed during teardown");
        }
        if let Err(error) = self.platform.disconnect().await {
            warn!(%error, "platform disconnect failed during teardown");
        }
    }
}
