//! Typed settings store over the storage capability.
//!
//! The persisted record is sparse and untyped; this layer resolves it into a
//! complete [`Settings`] value, backfilling defaults for absent or malformed
//! keys. A failed read resolves to defaults and a failed write leaves state
//! unchanged; storage trouble is never fatal anywhere in the system.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::error::CoreResult;
use crate::platform::{KeyValueStorage, Platform};
use crate::settings::{ChangeSet, SettingKey, Settings, SettingsPatch};

/// Handle to the single source of truth.
#[derive(Clone)]
pub struct SettingsStore {
    storage: Arc<dyn KeyValueStorage>,
}

impl SettingsStore {
    /// Create a store over a storage capability.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Create a store over a platform's storage.
    #[must_use]
    pub fn from_platform(platform: &Platform) -> Self {
        Self::new(Arc::clone(&platform.storage))
    }

    /// Load the complete record, defaults backfilling anything absent.
    pub async fn load(&self) -> Settings {
        match self.storage.get(&SettingKey::ALL).await {
            Ok(patch) => patch.into_settings(),
            Err(err) => {
                tracing::warn!("settings read failed, using defaults: {err}");
                Settings::default()
            }
        }
    }

    /// Read a subset of keys as a partial record. A failed read resolves to
    /// an empty patch.
    pub async fn get(&self, keys: &[SettingKey]) -> SettingsPatch {
        match self.storage.get(keys).await {
            Ok(patch) => patch,
            Err(err) => {
                tracing::warn!("settings read failed: {err}");
                SettingsPatch::default()
            }
        }
    }

    /// Write the present fields of `patch`.
    ///
    /// # Errors
    ///
    /// Propagates the storage failure; the persisted record is unchanged in
    /// that case and callers treat it as a no-op.
    pub async fn save(&self, patch: SettingsPatch) -> CoreResult<()> {
        self.storage.set(patch).await
    }

    /// Subscribe to change events from successful writes, across surfaces.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.storage.subscribe()
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").finish_non_exhaustive()
    }
}
