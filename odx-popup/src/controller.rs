//! The Controller: popup-side orchestration.
//!
//! Three debounce slots shape the write traffic of a slider drag:
//!
//! - preview (~15 ms): direct `UPDATE_STYLES` to the focused page, so the
//!   user sees the effect while dragging without flooding the channel;
//! - persist (~500 ms trailing): one storage write per drag; the
//!   `UPDATE_BACKGROUND_TABS` nudge runs from the same task once the write
//!   has resolved, so population never reads a record the write has not
//!   reached yet;
//! - fan-out (~500 ms trailing): the standalone nudge slot used by the
//!   immediate-persist operations, armed only after their write completes.
//!
//! Toggles (switch, exclusion, theme) skip the trailing debounces and
//! persist immediately; they are single events, not streams.

use std::time::Duration;

use odx_core::delivery::deliver;
use odx_core::origin;
use odx_core::platform::{PageId, Platform};
use odx_core::protocol::{PageRequest, RuntimeRequest};
use odx_core::settings::{SettingKey, Settings, SettingsPatch, Theme};
use odx_core::store::SettingsStore;
use odx_core::Debouncer;

use crate::view::{ControllerView, SliderSpec};

/// Delay before a drag preview reaches the focused page.
pub const PREVIEW_DEBOUNCE: Duration = Duration::from_millis(15);

/// Trailing quiet period before a drag's value is persisted.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_millis(500);

/// Trailing quiet period before the background population nudge.
pub const FANOUT_DEBOUNCE: Duration = Duration::from_millis(500);

/// One open popup session.
#[derive(Debug)]
pub struct Controller {
    platform: Platform,
    store: SettingsStore,
    settings: Settings,
    page: Option<PageId>,
    host: Option<String>,
    preview: Debouncer,
    persist: Debouncer,
    fanout: Debouncer,
}

impl Controller {
    /// Open a session: load the record and bind to the focused page.
    pub async fn open(platform: Platform) -> Self {
        let store = SettingsStore::from_platform(&platform);
        let settings = store.load().await;

        let focused = match platform.tabs.active_page().await {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!("active page query failed: {err}");
                None
            }
        };
        let page = focused.as_ref().map(|p| p.id);
        let host = focused
            .and_then(|p| p.url)
            .and_then(|url| origin::hostname(&url));

        Self {
            platform,
            store,
            settings,
            page,
            host,
            preview: Debouncer::new(PREVIEW_DEBOUNCE),
            persist: Debouncer::new(PERSIST_DEBOUNCE),
            fanout: Debouncer::new(FANOUT_DEBOUNCE),
        }
    }

    /// The session's local settings state.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Render the current view snapshot.
    #[must_use]
    pub fn view(&self) -> ControllerView {
        ControllerView::render(&self.settings, self.host.as_deref())
    }

    /// A slider moved during a drag. Updates local state and schedules a
    /// preview; nothing is persisted until the drag commits.
    pub fn slider_input(&mut self, key: SettingKey, value: i32) {
        let Some(spec) = SliderSpec::for_key(key) else {
            return;
        };
        self.set_metric(key, spec.clamp(value));
        self.schedule_preview(SettingsPatch::metrics(&self.settings));
    }

    /// A drag ended. Previews immediately and schedules the persist, which
    /// nudges the background pass once the write lands.
    pub async fn slider_commit(&mut self) {
        self.preview.cancel();
        self.preview_now(SettingsPatch::metrics(&self.settings))
            .await;
        self.schedule_persist(SettingsPatch::metrics(&self.settings));
    }

    /// A wheel notch over a slider: step, clamp, and run the same pipeline
    /// as a drag in progress, with the trailing persist armed.
    pub fn wheel(&mut self, key: SettingKey, notches: i32) {
        let Some(spec) = SliderSpec::for_key(key) else {
            return;
        };
        let current = self.metric(key);
        self.set_metric(key, spec.nudge(current, notches));
        self.schedule_preview(SettingsPatch::metrics(&self.settings));
        self.schedule_persist(SettingsPatch::metrics(&self.settings));
    }

    /// Flip the global switch. The persisted value is re-read first, so the
    /// flip inverts whatever another surface wrote while the popup was open
    /// rather than the snapshot taken at [`Controller::open`]. Persists
    /// immediately.
    pub async fn toggle_enabled(&mut self) {
        let persisted = self.store.get(&[SettingKey::Enabled]).await.enabled;
        self.settings.enabled = !persisted.unwrap_or(self.settings.enabled);
        let patch = SettingsPatch {
            enabled: Some(self.settings.enabled),
            ..SettingsPatch::default()
        };
        self.preview_now(patch.clone()).await;
        self.persist_now(patch).await;
        self.schedule_fanout();
    }

    /// Set whether the current page's host is excluded. No-op when no host
    /// resolved. Persists immediately.
    pub async fn set_excluded(&mut self, excluded: bool) {
        let Some(host) = self.host.clone() else {
            return;
        };
        if excluded {
            self.settings.excluded_domains.insert(host);
        } else {
            self.settings.excluded_domains.remove(&host);
        }
        let patch = SettingsPatch {
            excluded_domains: Some(self.settings.excluded_domains.clone()),
            ..SettingsPatch::default()
        };
        self.preview_now(patch.clone()).await;
        self.persist_now(patch).await;
        self.schedule_fanout();
    }

    /// Advance the popup theme one step in its cycle. Theme is a
    /// controller-local concern: persisted, never previewed to pages.
    pub async fn cycle_theme(&mut self) {
        self.settings.theme = self.settings.theme.next();
        self.persist_now(SettingsPatch {
            theme: Some(self.settings.theme),
            ..SettingsPatch::default()
        })
        .await;
    }

    /// Reset metrics and theme to defaults and clear the exclusion for the
    /// current host only. The global switch and other hosts' exclusions are
    /// untouched.
    pub async fn reset(&mut self) {
        let defaults = Settings::default();
        self.settings.letter_spacing = defaults.letter_spacing;
        self.settings.word_spacing = defaults.word_spacing;
        self.settings.line_height = defaults.line_height;
        self.settings.font_size = defaults.font_size;
        self.settings.theme = Theme::default();

        let mut patch = SettingsPatch::metrics(&self.settings);
        patch.theme = Some(self.settings.theme);

        if let Some(host) = self.host.clone() {
            if self.settings.excluded_domains.remove(&host) {
                patch.excluded_domains = Some(self.settings.excluded_domains.clone());
            }
        }

        self.preview_now(patch.clone()).await;
        self.persist_now(patch).await;
        self.schedule_fanout();
    }

    fn metric(&self, key: SettingKey) -> i32 {
        match key {
            SettingKey::LetterSpacing => self.settings.letter_spacing,
            SettingKey::WordSpacing => self.settings.word_spacing,
            SettingKey::LineHeight => self.settings.line_height,
            SettingKey::FontSize => self.settings.font_size,
            SettingKey::Enabled | SettingKey::ExcludedDomains | SettingKey::Theme => 0,
        }
    }

    fn set_metric(&mut self, key: SettingKey, value: i32) {
        match key {
            SettingKey::LetterSpacing => self.settings.letter_spacing = value,
            SettingKey::WordSpacing => self.settings.word_spacing = value,
            SettingKey::LineHeight => self.settings.line_height = value,
            SettingKey::FontSize => self.settings.font_size = value,
            SettingKey::Enabled | SettingKey::ExcludedDomains | SettingKey::Theme => {}
        }
    }

    async fn preview_now(&self, patch: SettingsPatch) {
        let Some(page) = self.page else {
            return;
        };
        send_preview(self.platform.clone(), page, patch).await;
    }

    fn schedule_preview(&mut self, patch: SettingsPatch) {
        let Some(page) = self.page else {
            return;
        };
        let platform = self.platform.clone();
        self.preview.call(send_preview(platform, page, patch));
    }

    async fn persist_now(&self, patch: SettingsPatch) {
        if let Err(err) = self.store.save(patch).await {
            tracing::warn!("settings write failed: {err}");
        }
    }

    /// Arm the trailing persist. The population nudge runs from the same
    /// task after the write resolves; a page injected by the pass therefore
    /// always loads the committed record. A failed write sends no nudge.
    fn schedule_persist(&mut self, patch: SettingsPatch) {
        let store = self.store.clone();
        let messaging = std::sync::Arc::clone(&self.platform.messaging);
        self.persist.call(async move {
            if let Err(err) = store.save(patch).await {
                tracing::warn!("settings write failed: {err}");
                return;
            }
            if let Err(err) = messaging
                .send_to_runtime(RuntimeRequest::UpdateBackgroundTabs)
                .await
            {
                tracing::debug!("population nudge failed: {err}");
            }
        });
    }

    fn schedule_fanout(&mut self) {
        let messaging = std::sync::Arc::clone(&self.platform.messaging);
        self.fanout.call(async move {
            if let Err(err) = messaging
                .send_to_runtime(RuntimeRequest::UpdateBackgroundTabs)
                .await
            {
                tracing::debug!("population nudge failed: {err}");
            }
        });
    }
}

/// Push a partial record at the focused page, injecting and resending when
/// nothing answers, so a freshly injected Applier still gets this patch.
async fn send_preview(platform: Platform, page: PageId, patch: SettingsPatch) {
    let request = PageRequest::UpdateStyles { settings: patch };
    let _ = deliver(&platform, page, request, true).await;
}
