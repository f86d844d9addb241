//! Toolbar badge policy.

use odx_core::platform::Platform;

/// Badge text while the global switch is on.
pub const BADGE_ON: &str = "on";

/// Badge text while the global switch is off.
pub const BADGE_OFF: &str = "";

/// Badge background color, always set regardless of state.
pub const BADGE_COLOR: &str = "#0ea5e9";

/// Reflect the global switch on the toolbar badge.
///
/// The badge tracks only the switch, never per-page exclusion.
pub async fn sync_badge(platform: &Platform, enabled: bool) {
    let text = if enabled { BADGE_ON } else { BADGE_OFF };
    platform.badge.set(text, BADGE_COLOR).await;
}
