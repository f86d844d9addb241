//! # ODX Popup
//!
//! The Controller: the user-facing read/write surface over the persisted
//! record. Opens against the focused page, previews changes on it through
//! the direct channel, and persists through the store on a trailing
//! debounce so a slider drag costs one write, not hundreds.

pub mod controller;
pub mod view;

pub use controller::Controller;
pub use view::{format_em, format_font_size, format_line_height, ControllerView, SliderSpec};
