//! Concrete visual effect derived from settings.
//!
//! The page effect is a marker class on the document root plus four CSS
//! custom properties the presentation assets consume. Formatting matches the
//! stylesheet contract exactly: em values to three decimals, line height and
//! rem scale to two.

use crate::protocol::PageState;

/// Marker class set on the page root while the effect is asserted.
pub const MARKER_CLASS: &str = "opendyslexic-active";

/// Letter spacing variable, em.
pub const VAR_LETTER_SPACING: &str = "--od-letter-spacing";

/// Word spacing variable, em.
pub const VAR_WORD_SPACING: &str = "--od-word-spacing";

/// Line height variable, unitless.
pub const VAR_LINE_HEIGHT: &str = "--od-line-height";

/// Font size variable, rem.
pub const VAR_FONT_SIZE: &str = "--od-font-size";

/// The four effect variables, rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleVars {
    /// e.g. `1.000em`.
    pub letter_spacing: String,
    /// e.g. `0.250em`.
    pub word_spacing: String,
    /// e.g. `1.40`.
    pub line_height: String,
    /// e.g. `1.00rem`.
    pub font_size: String,
}

impl StyleVars {
    /// Render the effect variables for a page state.
    #[must_use]
    pub fn from_state(state: &PageState) -> Self {
        Self {
            letter_spacing: format!("{:.3}em", f64::from(state.letter_spacing) / 1000.0),
            word_spacing: format!("{:.3}em", f64::from(state.word_spacing) / 1000.0),
            line_height: format!("{:.2}", f64::from(state.line_height) / 100.0),
            font_size: format!("{:.2}rem", f64::from(state.font_size) / 100.0),
        }
    }

    /// `(variable name, value)` pairs in declaration order.
    #[must_use]
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            (VAR_LETTER_SPACING, self.letter_spacing.as_str()),
            (VAR_WORD_SPACING, self.word_spacing.as_str()),
            (VAR_LINE_HEIGHT, self.line_height.as_str()),
            (VAR_FONT_SIZE, self.font_size.as_str()),
        ]
    }

    /// Just the variable names, for teardown.
    #[must_use]
    pub const fn names() -> [&'static str; 4] {
        [
            VAR_LETTER_SPACING,
            VAR_WORD_SPACING,
            VAR_LINE_HEIGHT,
            VAR_FONT_SIZE,
        ]
    }
}
