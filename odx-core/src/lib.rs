//! # ODX Core
//!
//! Settings-synchronization core for the ODX reading extension.
//! Keeps three surfaces consistent over an unreliable messaging channel:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 Settings Store                  │
//! │        (persisted record, source of truth)      │
//! └──────┬─────────────────┬───────────────┬────────┘
//!        │ change fan-out  │               │
//! ┌──────▼──────┐   ┌──────▼──────┐  ┌─────▼───────┐
//! │ Coordinator │   │  Controller │  │   Applier   │
//! │ (background)│   │   (popup)   │  │ (per page)  │
//! └─────────────┘   └─────────────┘  └─────────────┘
//! ```
//!
//! The Controller writes debounced snapshots to the store and pushes
//! low-latency previews straight to the active page. The Coordinator keeps
//! every other open page populated, injecting the Applier on demand when a
//! message finds no receiver. Convergence is best-effort: a page may be
//! transiently stale, but no failure is ever surfaced to the user.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod debounce;
pub mod delivery;
pub mod error;
pub mod origin;
pub mod platform;
pub mod protocol;
pub mod settings;
pub mod store;
pub mod style;

pub use debounce::Debouncer;
pub use delivery::{deliver, inject_into, Delivery};
pub use error::{CoreError, CoreResult};
pub use origin::{hostname, is_restricted, RESTRICTED_PREFIXES};
pub use platform::{
    Badge, KeyValueStorage, MessageError, PageId, PageInfo, PageMessaging, Platform,
    ScriptInjector, TabQuery,
};
pub use protocol::{PageRequest, PageResponse, PageState, RuntimeRequest};
pub use settings::{ChangeSet, SettingChange, SettingKey, Settings, SettingsPatch, Theme};
pub use store::SettingsStore;
pub use style::StyleVars;

/// Core crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
