//! The per-page event loop.
//!
//! Owns a [`StyleApplier`] and drives it from four sources: the page inbox
//! (direct requests), the storage change broadcast, the structural mutation
//! stream, and a rendering tick that flushes the coalesced commit. Restricted
//! origins return before attaching to anything, so senders see the same
//! no-receiver failure as a page with no script at all.

use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Sleep};

use odx_core::platform::memory::{MemoryPlatform, PageEnvelope};
use odx_core::platform::PageId;
use odx_core::protocol::{PageRequest, PageResponse};
use odx_core::store::SettingsStore;

use crate::applier::StyleApplier;
use crate::dom::{MemoryDom, PageDom};

/// Timing knobs for the event loop.
#[derive(Debug, Clone, Copy)]
pub struct ApplierConfig {
    /// Rendering tick period; one coalesced commit is flushed per tick.
    pub frame: Duration,
    /// Quiet period after a structural mutation before re-asserting.
    pub mutation_debounce: Duration,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(16),
            mutation_debounce: Duration::from_millis(20),
        }
    }
}

/// Run one page's Applier until its inbox closes, then return it for
/// inspection.
///
/// `mutations` carries one unit per observed structural change; the loop
/// collapses bursts into a single re-assertion after the quiet period.
pub async fn run_applier<D: PageDom>(
    dom: D,
    store: SettingsStore,
    mut inbox: mpsc::Receiver<PageEnvelope>,
    mut mutations: mpsc::Receiver<()>,
    config: ApplierConfig,
) -> StyleApplier<D> {
    let mut applier = StyleApplier::new(dom);
    if applier.is_restricted() {
        tracing::debug!(url = %applier.dom().url(), "restricted origin, applier not starting");
        return applier;
    }

    // Subscribe before the load: a write landing while the load is in
    // flight is then buffered by the receiver instead of lost.
    let mut changes = store.subscribe();
    let settings = store.load().await;
    applier.initialize(&settings);

    let mut changes_open = true;
    let mut mutations_open = true;
    let mut reassert_at: Option<Pin<Box<Sleep>>> = None;
    let mut frame = tokio::time::interval(config.frame);
    frame.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            envelope = inbox.recv() => {
                let Some(PageEnvelope { request, reply }) = envelope else {
                    break;
                };
                let response = match applier.handle_request(&request) {
                    Some(response) => response,
                    None => {
                        // REINITIALIZE: re-fetch the record, then run the
                        // load step again.
                        debug_assert!(matches!(request, PageRequest::Reinitialize));
                        let settings = store.load().await;
                        applier.initialize(&settings);
                        PageResponse::ack()
                    }
                };
                // A dropped reply slot means the caller gave up; fine.
                let _ = reply.send(response);
            }

            change = changes.recv(), if changes_open => {
                use tokio::sync::broadcast::error::RecvError;
                match change {
                    Ok(set) => applier.apply_changes(&set),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "change stream lagged, reloading settings");
                        let settings = store.load().await;
                        applier.initialize(&settings);
                    }
                    Err(RecvError::Closed) => changes_open = false,
                }
            }

            observed = mutations.recv(), if mutations_open => {
                match observed {
                    Some(()) => {
                        if applier.notify_mutation() {
                            // Bursts keep pushing the deadline out.
                            reassert_at = Some(Box::pin(tokio::time::sleep_until(
                                Instant::now() + config.mutation_debounce,
                            )));
                        }
                    }
                    None => mutations_open = false,
                }
            }

            () = async {
                if let Some(sleep) = reassert_at.as_mut() {
                    sleep.as_mut().await;
                }
            }, if reassert_at.is_some() => {
                reassert_at = None;
                applier.reassert();
            }

            _ = frame.tick() => {
                applier.flush_frame();
            }
        }
    }

    applier
}

/// Attach a simulated page to a [`MemoryPlatform`] and spawn its loop.
///
/// Returns the running task and the mutation feed. The task resolves to the
/// final Applier once the page is detached from messaging.
pub fn spawn_memory_applier(
    platform: &MemoryPlatform,
    page: PageId,
    url: &str,
) -> (JoinHandle<StyleApplier<MemoryDom>>, mpsc::Sender<()>) {
    let inbox = platform.messaging.attach_page(page);
    let store = SettingsStore::from_platform(&platform.platform());
    let dom = MemoryDom::new(url);
    let (mutation_tx, mutation_rx) = mpsc::channel(16);
    let handle = tokio::spawn(run_applier(
        dom,
        store,
        inbox,
        mutation_rx,
        ApplierConfig::default(),
    ));
    (handle, mutation_tx)
}
