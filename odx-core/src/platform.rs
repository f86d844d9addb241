//! Platform capability traits.
//!
//! The browser primitives (persistent storage, tab messaging, script
//! injection, tab query, the toolbar badge) are external collaborators.
//! Each is a single trait implemented once per target platform and selected
//! at startup; no code path branches on platform per call.
//!
//! [`memory`] provides a single-process implementation for tests and the
//! simulator.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::CoreResult;
use crate::protocol::{PageRequest, PageResponse, RuntimeRequest};
use crate::settings::{ChangeSet, SettingKey, SettingsPatch};

pub mod memory;

/// Identifier of one open page (browser tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page-{}", self.0)
    }
}

/// One open page as reported by the tab query capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// The page's identifier.
    pub id: PageId,
    /// The page's URL, if the platform exposes one.
    pub url: Option<String>,
    /// Whether this is the currently focused page.
    pub active: bool,
}

/// Errors from the messaging capability.
///
/// [`MessageError::NoReceiver`] is not a fault: it is the universal signal
/// that a page lacks a live Style Applier and is the trigger for the
/// injection fallback.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// No listener in the target page: the Applier was never injected.
    #[error("no receiver in {0}")]
    NoReceiver(PageId),

    /// The page disappeared mid-call (closed, navigated away).
    #[error("{0} is gone")]
    PageGone(PageId),

    /// Any other channel failure.
    #[error("messaging failed: {0}")]
    Other(String),
}

/// Persistent key-value record: the Settings Store's backing collaborator.
///
/// `get`/`set` may fail (quota, unavailable context); callers treat failure
/// as "no-op, state unchanged". Every successful `set` produces one
/// [`ChangeSet`] on the subscription channel, delivered to all subscribers
/// with no cross-writer ordering guarantee.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// Read the requested keys. Absent keys are simply missing from the
    /// returned patch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Storage`] when the record is unreadable.
    async fn get(&self, keys: &[SettingKey]) -> CoreResult<SettingsPatch>;

    /// Write the present fields of `patch`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Storage`] when the write is refused; the
    /// persisted record is unchanged in that case.
    async fn set(&self, patch: SettingsPatch) -> CoreResult<()>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<ChangeSet>;
}

/// Cross-surface messaging channel.
#[async_trait]
pub trait PageMessaging: Send + Sync {
    /// Deliver a request to one page's Style Applier and await its reply.
    ///
    /// # Errors
    ///
    /// [`MessageError::NoReceiver`] when no Applier listens in the page,
    /// [`MessageError::PageGone`] when the page vanishes mid-call.
    async fn send_to_page(
        &self,
        page: PageId,
        request: PageRequest,
    ) -> Result<PageResponse, MessageError>;

    /// Deliver a request to the background coordinator. Fire-and-forget;
    /// a missing coordinator is ignorable.
    ///
    /// # Errors
    ///
    /// [`MessageError::Other`] on channel failure.
    async fn send_to_runtime(&self, request: RuntimeRequest) -> Result<(), MessageError>;
}

/// Script/asset installer, scoped to all frames of the target page.
///
/// Assets must be installed before the behavioral script: the script
/// references classes and variables the assets define.
#[async_trait]
pub trait ScriptInjector: Send + Sync {
    /// Install the presentation assets (font faces, style rules).
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Injection`] for restricted, closed, or
    /// URL-less pages.
    async fn install_assets(&self, page: PageId) -> CoreResult<()>;

    /// Install the behavioral script.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Injection`] for restricted, closed, or
    /// URL-less pages.
    async fn install_script(&self, page: PageId) -> CoreResult<()>;
}

/// Registry of live pages.
#[async_trait]
pub trait TabQuery: Send + Sync {
    /// All open pages.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Tabs`] when the registry is unavailable.
    async fn all_pages(&self) -> CoreResult<Vec<PageInfo>>;

    /// The currently focused page, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::Tabs`] when the registry is unavailable.
    async fn active_page(&self) -> CoreResult<Option<PageInfo>>;
}

/// Persistent visible indicator on the toolbar.
#[async_trait]
pub trait Badge: Send + Sync {
    /// Set the badge text and background color.
    async fn set(&self, text: &str, color: &str);
}

/// The capability bundle, selected once at startup.
#[derive(Clone)]
pub struct Platform {
    /// Persistent key-value record.
    pub storage: Arc<dyn KeyValueStorage>,
    /// Cross-surface messaging.
    pub messaging: Arc<dyn PageMessaging>,
    /// Script/asset installer.
    pub injector: Arc<dyn ScriptInjector>,
    /// Registry of live pages.
    pub tabs: Arc<dyn TabQuery>,
    /// Toolbar badge.
    pub badge: Arc<dyn Badge>,
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
