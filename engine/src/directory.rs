//! Read-only view of the identity layer.

use crate::store::StoreError;
use crate::types::{ParticipantId, ParticipantProfile};
use campus_fest_core::BoxFuture;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Resolves participant profiles (email, display name, eligibility class).
pub trait ParticipantDirectory: Send + Sync {
    /// Look up a participant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the directory cannot be reached.
    fn participant(
        &self,
        id: ParticipantId,
    ) -> BoxFuture<'_, Result<Option<ParticipantProfile>, StoreError>>;
}

/// Directory held in memory, for tests and the demo
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    profiles: RwLock<HashMap<ParticipantId, ParticipantProfile>>,
}

impl InMemoryDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile
    pub async fn insert(&self, profile: ParticipantProfile) {
        self.profiles.write().await.insert(profile.id, profile);
    }
}

impl ParticipantDirectory for InMemoryDirectory {
    fn participant(
        &self,
        id: ParticipantId,
    ) -> BoxFuture<'_, Result<Option<ParticipantProfile>, StoreError>> {
        Box::pin(async move { Ok(self.profiles.read().await.get(&id).cloned()) })
    }
}
