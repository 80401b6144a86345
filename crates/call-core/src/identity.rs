//! Identity and profile resolution seam
//!
//! The auth/profile backend is an external collaborator; the coordinator
//! only asks it for display labels. Resolution results decorate ring
//! descriptors for presentation and never influence state-machine
//! correctness — an unresolved caller still rings.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::session::ParticipantId;

/// Identity record for a call participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub id: ParticipantId,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl ParticipantProfile {
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Best label for presentation: display name, then email local part,
    /// then the raw id
    pub fn label(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        if let Some(email) = &self.email {
            if let Some(local) = email.split('@').next() {
                if !local.is_empty() {
                    return local.to_string();
                }
            }
        }
        self.id.to_string()
    }
}

/// Lookup of participant profiles from the identity store
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a participant id to a profile, if known
    async fn resolve(&self, id: &ParticipantId) -> Option<ParticipantProfile>;
}

/// In-memory resolver backed by a concurrent map
///
/// Embedders that fetch profiles out-of-band can seed this and hand it to
/// the coordinator; tests use it directly.
#[derive(Debug, Default)]
pub struct StaticIdentityResolver {
    profiles: DashMap<ParticipantId, ParticipantProfile>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: ParticipantProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, id: &ParticipantId) -> Option<ParticipantProfile> {
        self.profiles.get(id).map(|entry| entry.value().clone())
    }
}
