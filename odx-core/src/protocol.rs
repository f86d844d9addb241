//! Cross-surface wire protocol.
//!
//! ## Message kinds
//!
//! ### Popup/background -> page
//!
//! - `{"action": "REINITIALIZE"}`: force a full re-fetch and re-apply;
//!   ack `{"success": true}`.
//! - `{"action": "UPDATE_STYLES", "settings": {...}}`: partial settings
//!   merge; ack `{"success": true}`.
//! - `{"action": "GET_STATE"}`: replied with the page's state snapshot.
//!
//! ### Popup -> background
//!
//! - `{"action": "UPDATE_BACKGROUND_TABS"}`: run a population pass over
//!   the non-active pages.
//!
//! Messages carry no ordering token. Receivers guard against stale delivery
//! by only updating fields that actually differ.

use serde::{Deserialize, Serialize};

use crate::settings::{Settings, SettingsPatch};

/// A request addressed to one page's Style Applier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageRequest {
    /// Re-run the load step unconditionally (recovery/force-sync).
    Reinitialize,
    /// Merge a partial settings record into the page's cached state.
    UpdateStyles {
        /// The changed fields.
        settings: SettingsPatch,
    },
    /// Ask for the page's current state snapshot.
    GetState,
}

/// A request addressed to the background coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeRequest {
    /// Reconcile every non-active page with the persisted record.
    UpdateBackgroundTabs,
}

/// One page's Style Applier state: a transient, possibly-stale mirror of the
/// settings subset the page renders from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageState {
    /// Global on/off switch, as last seen.
    pub enabled: bool,
    /// Derived: current hostname is in the exclusion list. Never
    /// transmitted raw; recomputed when the domain context or the list
    /// changes.
    pub excluded: bool,
    /// Letter spacing in milli-em.
    pub letter_spacing: i32,
    /// Word spacing in milli-em.
    pub word_spacing: i32,
    /// Line height in centi-units.
    pub line_height: i32,
    /// Font size in percent of root.
    pub font_size: i32,
}

impl PageState {
    /// Derive a page state from the full record and the page's hostname.
    #[must_use]
    pub fn derive(settings: &Settings, host: Option<&str>) -> Self {
        Self {
            enabled: settings.enabled,
            excluded: host.is_some_and(|h| settings.is_excluded(h)),
            letter_spacing: settings.letter_spacing,
            word_spacing: settings.word_spacing,
            line_height: settings.line_height,
            font_size: settings.font_size,
        }
    }

    /// Whether the visual effect should currently be asserted.
    #[must_use]
    pub const fn should_apply(&self) -> bool {
        self.enabled && !self.excluded
    }
}

/// A page's reply to a [`PageRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageResponse {
    /// The request was handled.
    Ack {
        /// Always `true`; a page that cannot handle a request simply does
        /// not answer.
        success: bool,
    },
    /// Snapshot reply to `GET_STATE`.
    State(PageState),
}

impl PageResponse {
    /// The standard acknowledgment.
    #[must_use]
    pub const fn ack() -> Self {
        Self::Ack { success: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_requests_use_action_tags() {
        let value = serde_json::to_value(PageRequest::Reinitialize).expect("serialize");
        assert_eq!(value, json!({ "action": "REINITIALIZE" }));

        let value = serde_json::to_value(PageRequest::UpdateStyles {
            settings: SettingsPatch {
                letter_spacing: Some(1000),
                ..SettingsPatch::default()
            },
        })
        .expect("serialize");
        assert_eq!(
            value,
            json!({ "action": "UPDATE_STYLES", "settings": { "letterSpacing": 1000 } })
        );

        let value = serde_json::to_value(RuntimeRequest::UpdateBackgroundTabs).expect("serialize");
        assert_eq!(value, json!({ "action": "UPDATE_BACKGROUND_TABS" }));
    }

    #[test]
    fn derive_computes_exclusion_from_hostname() {
        let mut settings = Settings::default();
        settings.enabled = true;
        settings.excluded_domains.insert("blocked.example".to_string());

        let state = PageState::derive(&settings, Some("blocked.example"));
        assert!(state.excluded);
        assert!(!state.should_apply());

        let state = PageState::derive(&settings, Some("open.example"));
        assert!(!state.excluded);
        assert!(state.should_apply());

        // No resolvable hostname: not excluded, applies when enabled.
        let state = PageState::derive(&settings, None);
        assert!(state.should_apply());
    }

    #[test]
    fn ack_round_trips_as_success_object() {
        let value = serde_json::to_value(PageResponse::ack()).expect("serialize");
        assert_eq!(value, json!({ "success": true }));
        let back: PageResponse = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, PageResponse::ack());
    }
}
