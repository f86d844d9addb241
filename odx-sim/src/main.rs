//! # ODX Simulator
//!
//! Runs every surface (coordinator, page Appliers, popup Controller) on
//! the in-memory platform and walks through a realistic session: install,
//! enable, a slider drag, a wheel nudge, exclusion, reset. Logs what each
//! page's document ends up holding.
//!
//! Set `ODX_DATA_FILE` to persist the settings record across runs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use odx_background::Coordinator;
use odx_content::{spawn_memory_applier, MemoryDom, PageDom, StyleApplier};
use odx_core::platform::memory::{
    MemoryBadge, MemoryInjector, MemoryMessaging, MemoryPlatform, MemoryStorage, MemoryTabs,
};
use odx_core::platform::PageId;
use odx_core::settings::SettingKey;
use odx_core::style::MARKER_CLASS;
use odx_popup::Controller;

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,odx_sim=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,odx_sim=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

fn build_platform() -> anyhow::Result<MemoryPlatform> {
    let storage = match std::env::var("ODX_DATA_FILE") {
        Ok(path) => {
            tracing::info!("persisting settings to {path}");
            Arc::new(MemoryStorage::with_data_file(path)?)
        }
        Err(_) => Arc::new(MemoryStorage::new()),
    };
    let tabs = Arc::new(MemoryTabs::new());
    Ok(MemoryPlatform {
        storage,
        messaging: Arc::new(MemoryMessaging::new()),
        injector: Arc::new(MemoryInjector::new(Arc::clone(&tabs))),
        tabs,
        badge: Arc::new(MemoryBadge::new()),
    })
}

type ApplierHandles = Arc<Mutex<Vec<(PageId, JoinHandle<StyleApplier<MemoryDom>>)>>>;

fn report(page: PageId, applier: &StyleApplier<MemoryDom>) {
    let dom = applier.dom();
    tracing::info!(
        %page,
        url = %dom.url(),
        marker = dom.has_marker(),
        variables = dom.variable_count(),
        mutations = dom.mutation_count(),
        "final page state"
    );
    for name in odx_core::style::StyleVars::names() {
        if let Some(value) = dom.variable(name) {
            tracing::info!(%page, "  {name} = {value}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    tracing::info!(marker = MARKER_CLASS, "simulator starting");

    let memory = build_platform()?;
    let handles: ApplierHandles = Arc::new(Mutex::new(Vec::new()));

    // Three open pages: a focused article, a background page with no script
    // yet, and a restricted browser page.
    let article = PageId(1);
    let docs = PageId(2);
    let browser = PageId(3);
    memory
        .tabs
        .insert_page(article, Some("https://article.example/read"), true);
    memory
        .tabs
        .insert_page(docs, Some("https://docs.example/manual"), false);
    memory
        .tabs
        .insert_page(browser, Some("chrome://extensions"), false);

    // Injection leaves a live Applier behind, as it does in a real page.
    {
        let platform = memory.clone();
        let handles = Arc::clone(&handles);
        memory.injector.set_script_hook(move |page| {
            let url = platform
                .tabs
                .lookup(page)
                .and_then(|info| info.url)
                .unwrap_or_default();
            tracing::info!(%page, %url, "script injected, applier attaching");
            let (handle, _mutations) = spawn_memory_applier(&platform, page, &url);
            handles
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((page, handle));
        });
    }

    // The focused page already runs its script.
    {
        let (handle, _mutations) =
            spawn_memory_applier(&memory, article, "https://article.example/read");
        handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((article, handle));
    }

    // Background process: install-time reconciliation, then the event loop.
    let coordinator = Coordinator::new(memory.platform());
    coordinator.handle_installed().await;
    let runtime_inbox = memory.messaging.attach_runtime();
    tokio::spawn(coordinator.run(runtime_inbox));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(badge = %memory.badge.text(), "after install");

    // The user opens the popup and switches the effect on.
    let mut popup = Controller::open(memory.platform()).await;
    popup.toggle_enabled().await;
    tokio::time::sleep(Duration::from_millis(700)).await;
    tracing::info!(badge = %memory.badge.text(), "effect enabled");

    // A slider drag: many inputs, one commit, one persisted write.
    for value in [100, 200, 350, 500] {
        popup.slider_input(SettingKey::LetterSpacing, value);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    popup.slider_commit().await;

    // A wheel nudge over the font size slider.
    popup.wheel(SettingKey::FontSize, 4);
    tokio::time::sleep(Duration::from_millis(700)).await;
    tracing::info!(record = ?memory.storage.raw(), "after drag and wheel");

    // Exclude the focused page's host, then change of heart: reset.
    popup.set_excluded(true).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    popup.reset().await;
    popup.cycle_theme().await;
    tokio::time::sleep(Duration::from_millis(700)).await;
    tracing::info!(record = ?memory.storage.raw(), "after reset");

    // Wind down: detach every page and inspect the final documents.
    for (page, _) in handles
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .iter()
    {
        memory.messaging.detach_page(*page);
    }
    let collected = std::mem::take(
        &mut *handles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner),
    );
    for (page, handle) in collected {
        let applier = handle.await?;
        report(page, &applier);
    }

    tracing::info!(injections = ?memory.injector.calls(), "simulator done");
    Ok(())
}
