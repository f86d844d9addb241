//! The background coordinator.
//!
//! Reacts to lifecycle events and storage changes; between events it holds
//! no state of its own. Its one non-trivial job is the population pass:
//! nudging every eligible page to re-fetch the record and injecting the
//! Style Applier wherever the nudge finds no listener.

use futures::future::join_all;
use tokio::sync::mpsc;

use odx_core::delivery::{deliver, Delivery};
use odx_core::origin::is_restricted;
use odx_core::platform::{PageInfo, Platform};
use odx_core::protocol::{PageRequest, RuntimeRequest};
use odx_core::settings::{ChangeSet, SettingKey, Settings, SettingsPatch};
use odx_core::store::SettingsStore;

use crate::badge::sync_badge;

/// The background process.
#[derive(Debug, Clone)]
pub struct Coordinator {
    platform: Platform,
    store: SettingsStore,
}

impl Coordinator {
    /// Create a coordinator over a platform.
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        let store = SettingsStore::from_platform(&platform);
        Self { platform, store }
    }

    /// The coordinator's settings store handle.
    #[must_use]
    pub fn store(&self) -> &SettingsStore {
        &self.store
    }

    /// First-install reconciliation: persist defaults for any absent key,
    /// sync the badge, and populate pages if the effect is already on
    /// (an update preserving a prior enabled record).
    ///
    /// Keys that already hold a value are left untouched, so an extension
    /// update never resets user settings.
    pub async fn handle_installed(&self) {
        let current = self.store.get(&SettingKey::ALL).await;
        let defaults = SettingsPatch::full(&Settings::default());

        let mut backfill = SettingsPatch::default();
        for key in SettingKey::ALL {
            if current.value_of(key).is_none() {
                if let Some(value) = defaults.value_of(key) {
                    backfill.set_value(key, &value);
                }
            }
        }
        if !backfill.is_empty() {
            if let Err(err) = self.store.save(backfill).await {
                tracing::warn!("default backfill failed: {err}");
            }
        }

        let settings = self.store.load().await;
        sync_badge(&self.platform, settings.enabled).await;
        if settings.enabled {
            self.update_pages(true).await;
        }
    }

    /// Process-restart reconciliation: the record survives; re-assert the
    /// badge and, when the effect is on, reconcile every open page.
    pub async fn handle_startup(&self) {
        let settings = self.store.load().await;
        sync_badge(&self.platform, settings.enabled).await;
        if settings.enabled {
            self.update_pages(true).await;
        }
    }

    /// React to one storage change batch.
    ///
    /// Pages that already run an Applier pick the batch up themselves; the
    /// coordinator's part is the badge and, on a gating change, a population
    /// pass to reach pages with no Applier yet.
    pub async fn apply_changes(&self, set: &ChangeSet) {
        if set.is_empty() {
            return;
        }
        if let Some(change) = set.get(SettingKey::Enabled) {
            sync_badge(&self.platform, change.new_value.as_bool().unwrap_or(false)).await;
        }

        if set.contains(SettingKey::Enabled) || set.contains(SettingKey::ExcludedDomains) {
            self.update_pages(true).await;
        }
    }

    /// The population pass: nudge every eligible page to re-fetch the record,
    /// injecting the Applier where nothing answers.
    ///
    /// Restricted and URL-less pages are skipped outright. With
    /// `include_active` false the focused page is skipped too: the popup's
    /// direct channel to it is authoritative and must not race a concurrent
    /// nudge. The pass is idempotent: a page already holding the current
    /// values queues no visual work on re-initialize.
    pub async fn update_pages(&self, include_active: bool) {
        let pages = match self.platform.tabs.all_pages().await {
            Ok(pages) => pages,
            Err(err) => {
                tracing::warn!("page query failed, skipping population pass: {err}");
                return;
            }
        };

        let nudges = pages
            .iter()
            .filter(|page| Self::eligible(page, include_active))
            .map(|page| async move {
                let outcome =
                    deliver(&self.platform, page.id, PageRequest::Reinitialize, false).await;
                if matches!(outcome, Delivery::Unreachable) {
                    tracing::debug!("population pass could not reach {}", page.id);
                }
            });
        join_all(nudges).await;
    }

    fn eligible(page: &PageInfo, include_active: bool) -> bool {
        if page.active && !include_active {
            return false;
        }
        match &page.url {
            Some(url) => !is_restricted(url),
            None => false,
        }
    }

    /// Drive the coordinator until its runtime inbox closes.
    pub async fn run(self, mut inbox: mpsc::Receiver<RuntimeRequest>) {
        let mut changes = self.store.subscribe();
        let mut changes_open = true;

        loop {
            tokio::select! {
                request = inbox.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    match request {
                        RuntimeRequest::UpdateBackgroundTabs => self.update_pages(false).await,
                    }
                }

                change = changes.recv(), if changes_open => {
                    use tokio::sync::broadcast::error::RecvError;
                    match change {
                        Ok(set) => self.apply_changes(&set).await,
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "change stream lagged, full resync");
                            let settings = self.store.load().await;
                            sync_badge(&self.platform, settings.enabled).await;
                            if settings.enabled {
                                self.update_pages(true).await;
                            }
                        }
                        Err(RecvError::Closed) => changes_open = false,
                    }
                }
            }
        }
    }
}
