//! # ODX Background
//!
//! The always-available coordinator: reconciles state on lifecycle events
//! (install, startup), keeps the toolbar badge in sync with the global
//! switch, and runs population passes that bring every eligible page up to
//! date, injecting the Style Applier into pages that never got one.
//!
//! The coordinator is stateless between events; the persisted record is the
//! only source of truth it reads from or writes to.

pub mod badge;
pub mod coordinator;

pub use badge::{sync_badge, BADGE_COLOR, BADGE_OFF, BADGE_ON};
pub use coordinator::Coordinator;
