//! Single-process platform implementation.
//!
//! Backs the integration tests and the simulator binary: storage is a sparse
//! record behind a lock with a broadcast fan-out, messaging routes requests
//! to per-page inboxes, and the injector records its calls and can attach a
//! live Applier through a script hook.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{CoreError, CoreResult};
use crate::origin::is_restricted;
use crate::platform::{
    Badge, KeyValueStorage, MessageError, PageId, PageInfo, PageMessaging, Platform,
    ScriptInjector, TabQuery,
};
use crate::protocol::{PageRequest, PageResponse, RuntimeRequest};
use crate::settings::{ChangeSet, SettingChange, SettingKey, SettingsPatch};

/// Capacity of the change broadcast channel.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Capacity of each page inbox.
const PAGE_INBOX_CAPACITY: usize = 16;

/// A request in flight to one page, with its reply slot.
#[derive(Debug)]
pub struct PageEnvelope {
    /// The request.
    pub request: PageRequest,
    /// Reply channel; dropping it without answering models a page that went
    /// away mid-call.
    pub reply: oneshot::Sender<PageResponse>,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// In-memory persisted record with optional JSON file persistence.
#[derive(Debug)]
pub struct MemoryStorage {
    record: RwLock<SettingsPatch>,
    tx: broadcast::Sender<ChangeSet>,
    data_file: Option<PathBuf>,
    fail_writes: AtomicBool,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty record with no persistence.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            record: RwLock::new(SettingsPatch::default()),
            tx,
            data_file: None,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Create a record persisted to a JSON file.
    ///
    /// The file is loaded if it exists; subsequent writes rewrite it. Write
    /// failures after creation are logged and swallowed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if an existing file cannot be read, or
    /// [`CoreError::Serialization`] if it cannot be parsed.
    pub fn with_data_file(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        let record = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            SettingsPatch::default()
        };
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            record: RwLock::new(record),
            tx,
            data_file: Some(path),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Make subsequent `set` calls fail, for failure-path tests.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the raw sparse record.
    #[must_use]
    pub fn raw(&self) -> SettingsPatch {
        self.record
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn persist(&self, record: &SettingsPatch) {
        let Some(ref path) = self.data_file else {
            return;
        };
        let json = match serde_json::to_string_pretty(record) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("Failed to serialize settings record: {e}");
                return;
            }
        };
        if let Err(e) = std::fs::write(path, json) {
            tracing::warn!("Failed to persist settings to {}: {e}", path.display());
        }
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, keys: &[SettingKey]) -> CoreResult<SettingsPatch> {
        let record = self
            .record
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(record.subset(keys))
    }

    async fn set(&self, patch: SettingsPatch) -> CoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CoreError::Storage("write quota exceeded".into()));
        }

        let change_set = {
            let mut record = self
                .record
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);

            let mut changes = Vec::new();
            for key in patch.keys() {
                let old_value = record.value_of(key);
                let new_value = patch.value_of(key).unwrap_or(serde_json::Value::Null);
                if old_value.as_ref() != Some(&new_value) {
                    changes.push(SettingChange {
                        key,
                        old_value: old_value.unwrap_or(serde_json::Value::Null),
                        new_value,
                    });
                }
            }
            record.merge(&patch);
            self.persist(&record);
            ChangeSet { changes }
        };

        if !change_set.is_empty() {
            // No receivers is fine.
            let _ = self.tx.send(change_set);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tabs
// ---------------------------------------------------------------------------

/// Registry of simulated pages, with at most one active.
#[derive(Debug, Default)]
pub struct MemoryTabs {
    pages: RwLock<Vec<PageInfo>>,
}

impl MemoryTabs {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page. Marking it active demotes any previous active page.
    pub fn insert_page(&self, id: PageId, url: Option<&str>, active: bool) {
        let mut pages = self
            .pages
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if active {
            for page in pages.iter_mut() {
                page.active = false;
            }
        }
        pages.retain(|p| p.id != id);
        pages.push(PageInfo {
            id,
            url: url.map(String::from),
            active,
        });
    }

    /// Remove a page (tab closed).
    pub fn remove_page(&self, id: PageId) {
        let mut pages = self
            .pages
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pages.retain(|p| p.id != id);
    }

    /// Look up one page.
    #[must_use]
    pub fn lookup(&self, id: PageId) -> Option<PageInfo> {
        let pages = self
            .pages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pages.iter().find(|p| p.id == id).cloned()
    }
}

#[async_trait]
impl TabQuery for MemoryTabs {
    async fn all_pages(&self) -> CoreResult<Vec<PageInfo>> {
        let pages = self
            .pages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(pages.clone())
    }

    async fn active_page(&self) -> CoreResult<Option<PageInfo>> {
        let pages = self
            .pages
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(pages.iter().find(|p| p.active).cloned())
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// Routes page requests to per-page inboxes and runtime requests to the
/// coordinator's inbox.
#[derive(Debug, Default)]
pub struct MemoryMessaging {
    pages: RwLock<HashMap<PageId, mpsc::Sender<PageEnvelope>>>,
    runtime: RwLock<Option<mpsc::Sender<RuntimeRequest>>>,
}

impl MemoryMessaging {
    /// Create a router with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a page listener, returning its inbox. Replaces any previous
    /// listener for the page.
    #[must_use]
    pub fn attach_page(&self, page: PageId) -> mpsc::Receiver<PageEnvelope> {
        let (tx, rx) = mpsc::channel(PAGE_INBOX_CAPACITY);
        let mut pages = self
            .pages
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pages.insert(page, tx);
        rx
    }

    /// Detach a page listener (page closed or navigated away).
    pub fn detach_page(&self, page: PageId) {
        let mut pages = self
            .pages
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        pages.remove(&page);
    }

    /// Attach the coordinator's runtime inbox.
    #[must_use]
    pub fn attach_runtime(&self) -> mpsc::Receiver<RuntimeRequest> {
        let (tx, rx) = mpsc::channel(PAGE_INBOX_CAPACITY);
        let mut runtime = self
            .runtime
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *runtime = Some(tx);
        rx
    }
}

#[async_trait]
impl PageMessaging for MemoryMessaging {
    async fn send_to_page(
        &self,
        page: PageId,
        request: PageRequest,
    ) -> Result<PageResponse, MessageError> {
        let sender = {
            let pages = self
                .pages
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            pages.get(&page).cloned()
        };
        let Some(sender) = sender else {
            return Err(MessageError::NoReceiver(page));
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = PageEnvelope {
            request,
            reply: reply_tx,
        };
        if sender.send(envelope).await.is_err() {
            // The inbox was dropped: the Applier is not listening.
            return Err(MessageError::NoReceiver(page));
        }
        reply_rx.await.map_err(|_| MessageError::PageGone(page))
    }

    async fn send_to_runtime(&self, request: RuntimeRequest) -> Result<(), MessageError> {
        let sender = {
            let runtime = self
                .runtime
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            runtime.clone()
        };
        let Some(sender) = sender else {
            tracing::debug!("no runtime listener for {request:?}");
            return Ok(());
        };
        sender
            .send(request)
            .await
            .map_err(|e| MessageError::Other(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Injection
// ---------------------------------------------------------------------------

/// What was installed into a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installed {
    /// Presentation assets (font faces, style rules).
    Assets,
    /// Behavioral script.
    Script,
}

/// Hook run after a behavioral script install, used by harnesses to attach
/// a live Applier at injection time.
pub type ScriptHook = dyn Fn(PageId) + Send + Sync;

/// Records installs and refuses restricted origins, like the real installer.
pub struct MemoryInjector {
    tabs: Arc<MemoryTabs>,
    calls: Mutex<Vec<(PageId, Installed)>>,
    script_hook: RwLock<Option<Arc<ScriptHook>>>,
}

impl MemoryInjector {
    /// Create an injector resolving page URLs through `tabs`.
    #[must_use]
    pub fn new(tabs: Arc<MemoryTabs>) -> Self {
        Self {
            tabs,
            calls: Mutex::new(Vec::new()),
            script_hook: RwLock::new(None),
        }
    }

    /// Install the post-script hook.
    pub fn set_script_hook(&self, hook: impl Fn(PageId) + Send + Sync + 'static) {
        let mut slot = self
            .script_hook
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(Arc::new(hook));
    }

    /// Every install call so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(PageId, Installed)> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn check_target(&self, page: PageId) -> CoreResult<()> {
        let info = self
            .tabs
            .lookup(page)
            .ok_or_else(|| CoreError::Injection(format!("{page} is closed")))?;
        match info.url {
            Some(url) if !is_restricted(&url) => Ok(()),
            Some(url) => Err(CoreError::Injection(format!("restricted origin: {url}"))),
            None => Err(CoreError::Injection(format!("{page} has no URL"))),
        }
    }

    fn record(&self, page: PageId, what: Installed) {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((page, what));
    }
}

#[async_trait]
impl ScriptInjector for MemoryInjector {
    async fn install_assets(&self, page: PageId) -> CoreResult<()> {
        self.check_target(page)?;
        self.record(page, Installed::Assets);
        Ok(())
    }

    async fn install_script(&self, page: PageId) -> CoreResult<()> {
        self.check_target(page)?;
        self.record(page, Installed::Script);
        let hook = {
            let slot = self
                .script_hook
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            slot.clone()
        };
        if let Some(hook) = hook {
            hook(page);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Badge
// ---------------------------------------------------------------------------

/// Records the toolbar badge state.
#[derive(Debug, Default)]
pub struct MemoryBadge {
    state: RwLock<(String, String)>,
}

impl MemoryBadge {
    /// Create a badge with empty text.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current badge text.
    #[must_use]
    pub fn text(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .0
            .clone()
    }

    /// Current badge color.
    #[must_use]
    pub fn color(&self) -> String {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .1
            .clone()
    }
}

#[async_trait]
impl Badge for MemoryBadge {
    async fn set(&self, text: &str, color: &str) {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *state = (text.to_string(), color.to_string());
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// The full in-memory platform, with concrete handles kept for harness use.
#[derive(Clone)]
pub struct MemoryPlatform {
    /// Concrete storage handle.
    pub storage: Arc<MemoryStorage>,
    /// Concrete messaging handle.
    pub messaging: Arc<MemoryMessaging>,
    /// Concrete injector handle.
    pub injector: Arc<MemoryInjector>,
    /// Concrete tab registry handle.
    pub tabs: Arc<MemoryTabs>,
    /// Concrete badge handle.
    pub badge: Arc<MemoryBadge>,
}

impl MemoryPlatform {
    /// Create a fresh platform with empty storage and no pages.
    #[must_use]
    pub fn new() -> Self {
        let tabs = Arc::new(MemoryTabs::new());
        Self {
            storage: Arc::new(MemoryStorage::new()),
            messaging: Arc::new(MemoryMessaging::new()),
            injector: Arc::new(MemoryInjector::new(Arc::clone(&tabs))),
            tabs,
            badge: Arc::new(MemoryBadge::new()),
        }
    }

    /// The capability bundle for component constructors.
    #[must_use]
    pub fn platform(&self) -> Platform {
        let storage: Arc<dyn KeyValueStorage> = self.storage.clone();
        let messaging: Arc<dyn PageMessaging> = self.messaging.clone();
        let injector: Arc<dyn ScriptInjector> = self.injector.clone();
        let tabs: Arc<dyn TabQuery> = self.tabs.clone();
        let badge: Arc<dyn Badge> = self.badge.clone();
        Platform {
            storage,
            messaging,
            injector,
            tabs,
            badge,
        }
    }
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_returns_written_values() {
        let storage = MemoryStorage::new();
        let patch = SettingsPatch {
            enabled: Some(true),
            letter_spacing: Some(250),
            ..SettingsPatch::default()
        };
        storage.set(patch).await.expect("set");

        let read = storage.get(&SettingKey::ALL).await.expect("get");
        assert_eq!(read.enabled, Some(true));
        assert_eq!(read.letter_spacing, Some(250));
        // Untouched keys stay absent.
        assert!(read.line_height.is_none());
    }

    #[tokio::test]
    async fn set_broadcasts_only_effective_changes() {
        let storage = MemoryStorage::new();
        let mut rx = storage.subscribe();

        let patch = SettingsPatch {
            enabled: Some(true),
            ..SettingsPatch::default()
        };
        storage.set(patch.clone()).await.expect("set");

        let set = rx.recv().await.expect("change set");
        assert_eq!(set.changes.len(), 1);
        let change = set.get(SettingKey::Enabled).expect("enabled change");
        assert_eq!(change.old_value, serde_json::Value::Null);
        assert_eq!(change.new_value, serde_json::json!(true));

        // Writing the same value again produces no event.
        storage.set(patch).await.expect("set");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_writes_leave_state_unchanged() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        let result = storage
            .set(SettingsPatch {
                enabled: Some(true),
                ..SettingsPatch::default()
            })
            .await;
        assert!(result.is_err());
        let read = storage.get(&SettingKey::ALL).await.expect("get");
        assert!(read.enabled.is_none());
    }

    #[tokio::test]
    async fn data_file_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");

        let storage = MemoryStorage::with_data_file(&path).expect("storage");
        storage
            .set(SettingsPatch {
                line_height: Some(180),
                ..SettingsPatch::default()
            })
            .await
            .expect("set");
        assert!(path.exists());

        let reloaded = MemoryStorage::with_data_file(&path).expect("reload");
        let read = reloaded.get(&[SettingKey::LineHeight]).await.expect("get");
        assert_eq!(read.line_height, Some(180));
    }

    #[tokio::test]
    async fn send_to_unattached_page_is_no_receiver() {
        let messaging = MemoryMessaging::new();
        let err = messaging
            .send_to_page(PageId(7), PageRequest::Reinitialize)
            .await
            .expect_err("should fail");
        assert!(matches!(err, MessageError::NoReceiver(PageId(7))));
    }

    #[tokio::test]
    async fn attached_page_answers() {
        let messaging = Arc::new(MemoryMessaging::new());
        let mut inbox = messaging.attach_page(PageId(1));
        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                let _ = envelope.reply.send(PageResponse::ack());
            }
        });

        let response = messaging
            .send_to_page(PageId(1), PageRequest::Reinitialize)
            .await
            .expect("response");
        assert_eq!(response, PageResponse::ack());
    }

    #[tokio::test]
    async fn dropped_inbox_is_no_receiver() {
        let messaging = MemoryMessaging::new();
        let inbox = messaging.attach_page(PageId(2));
        drop(inbox);
        let err = messaging
            .send_to_page(PageId(2), PageRequest::GetState)
            .await
            .expect_err("should fail");
        assert!(matches!(err, MessageError::NoReceiver(_)));
    }

    #[tokio::test]
    async fn injector_refuses_restricted_origins() {
        let tabs = Arc::new(MemoryTabs::new());
        tabs.insert_page(PageId(1), Some("chrome://settings"), false);
        tabs.insert_page(PageId(2), Some("https://example.com/"), false);
        let injector = MemoryInjector::new(Arc::clone(&tabs));

        assert!(injector.install_assets(PageId(1)).await.is_err());
        assert!(injector.install_assets(PageId(2)).await.is_ok());
        assert!(injector.install_script(PageId(2)).await.is_ok());
        assert_eq!(
            injector.calls(),
            vec![(PageId(2), Installed::Assets), (PageId(2), Installed::Script)]
        );
    }

    #[tokio::test]
    async fn active_page_is_unique() {
        let tabs = MemoryTabs::new();
        tabs.insert_page(PageId(1), Some("https://a.example/"), true);
        tabs.insert_page(PageId(2), Some("https://b.example/"), true);

        let active = tabs.active_page().await.expect("query").expect("active");
        assert_eq!(active.id, PageId(2));
        let actives = tabs
            .all_pages()
            .await
            .expect("query")
            .into_iter()
            .filter(|p| p.active)
            .count();
        assert_eq!(actives, 1);
    }
}
