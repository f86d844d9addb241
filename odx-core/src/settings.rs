//! Settings schema, defaults, and partial-record merging.
//!
//! The persisted record is the single source of truth. Every field always
//! has a defined value: defaults backfill any absent or malformed key on
//! load, and writes always submit complete intended values for the keys they
//! touch.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Popup color theme. Controller-only; never propagated to pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Follow the OS preference.
    #[default]
    System,
    /// Always light.
    Light,
    /// Always dark.
    Dark,
}

impl Theme {
    /// The next theme in the cycle system → light → dark → system.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::System => Self::Light,
            Self::Light => Self::Dark,
            Self::Dark => Self::System,
        }
    }
}

/// Keys of the persisted settings record, in wire (camelCase) form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    /// Global on/off switch.
    Enabled,
    /// Letter spacing in milli-em.
    LetterSpacing,
    /// Word spacing in milli-em.
    WordSpacing,
    /// Line height in centi-units.
    LineHeight,
    /// Font size in percent of root.
    FontSize,
    /// Hostnames for which effects are suppressed.
    ExcludedDomains,
    /// Popup theme.
    Theme,
}

impl SettingKey {
    /// Every recognized key.
    pub const ALL: [Self; 7] = [
        Self::Enabled,
        Self::LetterSpacing,
        Self::WordSpacing,
        Self::LineHeight,
        Self::FontSize,
        Self::ExcludedDomains,
        Self::Theme,
    ];

    /// The four numeric text-metric keys.
    pub const METRICS: [Self; 4] = [
        Self::LetterSpacing,
        Self::WordSpacing,
        Self::LineHeight,
        Self::FontSize,
    ];

    /// Wire name of the key on the persisted record.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::LetterSpacing => "letterSpacing",
            Self::WordSpacing => "wordSpacing",
            Self::LineHeight => "lineHeight",
            Self::FontSize => "fontSize",
            Self::ExcludedDomains => "excludedDomains",
            Self::Theme => "theme",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Global on/off switch.
    pub enabled: bool,
    /// Letter spacing in milli-em (value / 1000 = em).
    pub letter_spacing: i32,
    /// Word spacing in milli-em (value / 1000 = em).
    pub word_spacing: i32,
    /// Line height in centi-units (value / 100 = unitless multiplier).
    pub line_height: i32,
    /// Font size in percent of root (value / 100 = rem multiplier).
    pub font_size: i32,
    /// Hostnames for which effects are suppressed even when enabled.
    /// Exact-match only; uniqueness enforced by the set.
    pub excluded_domains: BTreeSet<String>,
    /// Popup theme.
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            letter_spacing: 0,
            word_spacing: 0,
            line_height: 140,
            font_size: 100,
            excluded_domains: BTreeSet::new(),
            theme: Theme::System,
        }
    }
}

impl Settings {
    /// Whether effects are suppressed for `host`. Exact hostname match;
    /// subdomains of an excluded domain are not excluded.
    #[must_use]
    pub fn is_excluded(&self, host: &str) -> bool {
        self.excluded_domains.contains(host)
    }
}

/// A partial settings record: the unit of every write and every
/// cross-surface `UPDATE_STYLES` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    /// Global on/off switch, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Letter spacing in milli-em, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<i32>,
    /// Word spacing in milli-em, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_spacing: Option<i32>,
    /// Line height in centi-units, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_height: Option<i32>,
    /// Font size in percent, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<i32>,
    /// Exclusion list, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_domains: Option<BTreeSet<String>>,
    /// Popup theme, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

impl SettingsPatch {
    /// A patch carrying every field of `settings`.
    #[must_use]
    pub fn full(settings: &Settings) -> Self {
        Self {
            enabled: Some(settings.enabled),
            letter_spacing: Some(settings.letter_spacing),
            word_spacing: Some(settings.word_spacing),
            line_height: Some(settings.line_height),
            font_size: Some(settings.font_size),
            excluded_domains: Some(settings.excluded_domains.clone()),
            theme: Some(settings.theme),
        }
    }

    /// A patch carrying only the four numeric text metrics.
    #[must_use]
    pub fn metrics(settings: &Settings) -> Self {
        Self {
            letter_spacing: Some(settings.letter_spacing),
            word_spacing: Some(settings.word_spacing),
            line_height: Some(settings.line_height),
            font_size: Some(settings.font_size),
            ..Self::default()
        }
    }

    /// Whether no field is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// The keys present in this patch.
    #[must_use]
    pub fn keys(&self) -> Vec<SettingKey> {
        SettingKey::ALL
            .into_iter()
            .filter(|k| self.value_of(*k).is_some())
            .collect()
    }

    /// Merge this patch into `target`, returning the keys whose values
    /// actually changed.
    ///
    /// Fields equal to the current value do not count as changed. This is the
    /// staleness guard: a late message carrying values the target already
    /// holds produces no transition and no visual commit downstream.
    pub fn apply(&self, target: &mut Settings) -> Vec<SettingKey> {
        let mut changed = Vec::new();

        macro_rules! merge_field {
            ($field:ident, $key:expr) => {
                if let Some(value) = &self.$field {
                    if &target.$field != value {
                        target.$field = value.clone();
                        changed.push($key);
                    }
                }
            };
        }

        merge_field!(enabled, SettingKey::Enabled);
        merge_field!(letter_spacing, SettingKey::LetterSpacing);
        merge_field!(word_spacing, SettingKey::WordSpacing);
        merge_field!(line_height, SettingKey::LineHeight);
        merge_field!(font_size, SettingKey::FontSize);
        merge_field!(excluded_domains, SettingKey::ExcludedDomains);
        merge_field!(theme, SettingKey::Theme);

        changed
    }

    /// Overlay `other` onto this patch (present fields of `other` win).
    pub fn merge(&mut self, other: &Self) {
        macro_rules! overlay {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field.clone();
                }
            };
        }
        overlay!(enabled);
        overlay!(letter_spacing);
        overlay!(word_spacing);
        overlay!(line_height);
        overlay!(font_size);
        overlay!(excluded_domains);
        overlay!(theme);
    }

    /// The fields of this patch restricted to `keys`.
    #[must_use]
    pub fn subset(&self, keys: &[SettingKey]) -> Self {
        let mut out = Self::default();
        for key in keys {
            if let Some(value) = self.value_of(*key) {
                out.set_value(*key, &value);
            }
        }
        out
    }

    /// The fields where `new` differs from `old`.
    #[must_use]
    pub fn diff(old: &Settings, new: &Settings) -> Self {
        let mut patch = Self::full(new);
        if old.enabled == new.enabled {
            patch.enabled = None;
        }
        if old.letter_spacing == new.letter_spacing {
            patch.letter_spacing = None;
        }
        if old.word_spacing == new.word_spacing {
            patch.word_spacing = None;
        }
        if old.line_height == new.line_height {
            patch.line_height = None;
        }
        if old.font_size == new.font_size {
            patch.font_size = None;
        }
        if old.excluded_domains == new.excluded_domains {
            patch.excluded_domains = None;
        }
        if old.theme == new.theme {
            patch.theme = None;
        }
        patch
    }

    /// Resolve this patch into a complete record, defaults backfilling any
    /// absent field.
    #[must_use]
    pub fn into_settings(self) -> Settings {
        let mut settings = Settings::default();
        self.apply(&mut settings);
        settings
    }

    /// The JSON value of `key`, if present.
    #[must_use]
    pub fn value_of(&self, key: SettingKey) -> Option<Value> {
        match key {
            SettingKey::Enabled => self.enabled.map(Value::from),
            SettingKey::LetterSpacing => self.letter_spacing.map(Value::from),
            SettingKey::WordSpacing => self.word_spacing.map(Value::from),
            SettingKey::LineHeight => self.line_height.map(Value::from),
            SettingKey::FontSize => self.font_size.map(Value::from),
            SettingKey::ExcludedDomains => self
                .excluded_domains
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            SettingKey::Theme => self.theme.and_then(|v| serde_json::to_value(v).ok()),
        }
    }

    /// Set `key` from a JSON value. Malformed values are ignored: a field
    /// that does not deserialize is treated as absent, per the
    /// default-never-reject load policy.
    pub fn set_value(&mut self, key: SettingKey, value: &Value) {
        match key {
            SettingKey::Enabled => {
                if let Ok(v) = serde_json::from_value(value.clone()) {
                    self.enabled = Some(v);
                }
            }
            SettingKey::LetterSpacing => {
                if let Ok(v) = serde_json::from_value(value.clone()) {
                    self.letter_spacing = Some(v);
                }
            }
            SettingKey::WordSpacing => {
                if let Ok(v) = serde_json::from_value(value.clone()) {
                    self.word_spacing = Some(v);
                }
            }
            SettingKey::LineHeight => {
                if let Ok(v) = serde_json::from_value(value.clone()) {
                    self.line_height = Some(v);
                }
            }
            SettingKey::FontSize => {
                if let Ok(v) = serde_json::from_value(value.clone()) {
                    self.font_size = Some(v);
                }
            }
            SettingKey::ExcludedDomains => {
                if let Ok(v) = serde_json::from_value(value.clone()) {
                    self.excluded_domains = Some(v);
                }
            }
            SettingKey::Theme => {
                if let Ok(v) = serde_json::from_value(value.clone()) {
                    self.theme = Some(v);
                }
            }
        }
    }
}

/// One key's transition on the persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingChange {
    /// The key that changed.
    pub key: SettingKey,
    /// Prior value; `null` when the key was absent.
    pub old_value: Value,
    /// New value.
    pub new_value: Value,
}

/// The batch of changes produced by one successful write, delivered to every
/// subscriber of the persisted record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Per-key transitions, one entry per key that actually changed.
    pub changes: Vec<SettingChange>,
}

impl ChangeSet {
    /// Whether no key changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether `key` changed.
    #[must_use]
    pub fn contains(&self, key: SettingKey) -> bool {
        self.changes.iter().any(|c| c.key == key)
    }

    /// The transition for `key`, if it changed.
    #[must_use]
    pub fn get(&self, key: SettingKey) -> Option<&SettingChange> {
        self.changes.iter().find(|c| c.key == key)
    }

    /// The new values of this change set as a partial record.
    #[must_use]
    pub fn to_patch(&self) -> SettingsPatch {
        let mut patch = SettingsPatch::default();
        for change in &self.changes {
            patch.set_value(change.key, &change.new_value);
        }
        patch
    }
}
