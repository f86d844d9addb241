//! Display formatting and slider geometry.

use odx_core::settings::{SettingKey, Settings, Theme};

/// Format a milli-em metric for display.
///
/// Zero renders as a bare `0`; everything else as a two-decimal em value.
/// The float formatter's `-0.00` (tiny negatives rounding to zero) is
/// normalized to `0.00 em`.
#[must_use]
pub fn format_em(milli_em: i32) -> String {
    if milli_em == 0 {
        return "0".to_string();
    }
    let formatted = format!("{:.2}", f64::from(milli_em) / 1000.0);
    if formatted == "-0.00" {
        "0.00 em".to_string()
    } else {
        format!("{formatted} em")
    }
}

/// Format a centi-unit line height as a unitless two-decimal multiplier.
#[must_use]
pub fn format_line_height(centi: i32) -> String {
    let formatted = format!("{:.2}", f64::from(centi) / 100.0);
    if formatted == "-0.00" {
        "0.00".to_string()
    } else {
        formatted
    }
}

/// Format a font size percentage.
#[must_use]
pub fn format_font_size(percent: i32) -> String {
    format!("{percent}%")
}

/// Range and step of one metric slider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliderSpec {
    /// Smallest slider value.
    pub min: i32,
    /// Largest slider value.
    pub max: i32,
    /// Step per wheel notch.
    pub step: i32,
}

impl SliderSpec {
    /// The slider for a metric key; `None` for non-metric keys.
    #[must_use]
    pub const fn for_key(key: SettingKey) -> Option<Self> {
        match key {
            SettingKey::LetterSpacing | SettingKey::WordSpacing => Some(Self {
                min: -100,
                max: 2000,
                step: 5,
            }),
            SettingKey::LineHeight => Some(Self {
                min: 80,
                max: 250,
                step: 5,
            }),
            SettingKey::FontSize => Some(Self {
                min: 50,
                max: 200,
                step: 5,
            }),
            SettingKey::Enabled | SettingKey::ExcludedDomains | SettingKey::Theme => None,
        }
    }

    /// Clamp a value into range.
    #[must_use]
    pub const fn clamp(&self, value: i32) -> i32 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    /// Move `value` by `notches` wheel steps, clamped into range.
    #[must_use]
    pub const fn nudge(&self, value: i32, notches: i32) -> i32 {
        self.clamp(value + notches * self.step)
    }
}

/// Snapshot of everything the popup renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerView {
    /// Global switch state.
    pub enabled: bool,
    /// Current page's hostname, when one resolved.
    pub host: Option<String>,
    /// Whether the current page's host is excluded.
    pub excluded: bool,
    /// Whether the exclusion checkbox is usable (a host resolved).
    pub exclusion_available: bool,
    /// Sliders are inert while disabled or excluded.
    pub sliders_locked: bool,
    /// Letter spacing display text.
    pub letter_display: String,
    /// Word spacing display text.
    pub word_display: String,
    /// Line height display text.
    pub line_display: String,
    /// Font size display text.
    pub font_display: String,
    /// Popup theme.
    pub theme: Theme,
}

impl ControllerView {
    /// Render a view from the record and the current page's hostname.
    #[must_use]
    pub fn render(settings: &Settings, host: Option<&str>) -> Self {
        let excluded = host.is_some_and(|h| settings.is_excluded(h));
        // No resolvable host (restricted page): exclusion is moot and the
        // sliders lock, matching a page the effect cannot reach.
        let exclusion_available = host.is_some();
        Self {
            enabled: settings.enabled,
            host: host.map(String::from),
            excluded,
            exclusion_available,
            sliders_locked: !settings.enabled || excluded || !exclusion_available,
            letter_display: format_em(settings.letter_spacing),
            word_display: format_em(settings.word_spacing),
            line_display: format_line_height(settings.line_height),
            font_display: format_font_size(settings.font_size),
            theme: settings.theme,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn em_formatting_matches_display_rules() {
        assert_eq!(format_em(0), "0");
        assert_eq!(format_em(1000), "1.00 em");
        assert_eq!(format_em(250), "0.25 em");
        assert_eq!(format_em(-150), "-0.15 em");
        // Rounds to negative zero: normalized.
        assert_eq!(format_em(-4), "0.00 em");
    }

    #[test]
    fn line_height_and_font_size_formatting() {
        assert_eq!(format_line_height(140), "1.40");
        assert_eq!(format_line_height(205), "2.05");
        assert_eq!(format_font_size(100), "100%");
    }

    #[test]
    fn wheel_nudge_clamps_at_the_rails() {
        let spec = SliderSpec::for_key(SettingKey::FontSize).expect("metric");
        assert_eq!(spec.nudge(100, 1), 105);
        assert_eq!(spec.nudge(100, -1), 95);
        assert_eq!(spec.nudge(199, 1), 200);
        assert_eq!(spec.nudge(51, -1), 50);
        assert_eq!(spec.nudge(200, 3), 200);
    }

    #[test]
    fn non_metric_keys_have_no_slider() {
        assert!(SliderSpec::for_key(SettingKey::Enabled).is_none());
        assert!(SliderSpec::for_key(SettingKey::Theme).is_none());
        assert!(SliderSpec::for_key(SettingKey::ExcludedDomains).is_none());
    }

    #[test]
    fn view_locks_sliders_when_disabled_or_excluded() {
        let mut settings = Settings::default();
        let view = ControllerView::render(&settings, Some("example.com"));
        assert!(view.sliders_locked, "disabled locks sliders");

        settings.enabled = true;
        let view = ControllerView::render(&settings, Some("example.com"));
        assert!(!view.sliders_locked);
        assert_eq!(view.line_display, "1.40");

        settings.excluded_domains.insert("example.com".to_string());
        let view = ControllerView::render(&settings, Some("example.com"));
        assert!(view.excluded);
        assert!(view.sliders_locked, "exclusion locks sliders");

        // Restricted page: no host, checkbox unavailable, sliders locked.
        let view = ControllerView::render(&settings, None);
        assert!(!view.exclusion_available);
        assert!(view.sliders_locked);
    }
}
