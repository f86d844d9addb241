//! End-to-end population: coordinator, storage, and live page Appliers on
//! one in-memory platform.

use std::time::Duration;

use odx_background::Coordinator;
use odx_content::spawn_memory_applier;
use odx_core::platform::memory::{Installed, MemoryPlatform};
use odx_core::platform::{KeyValueStorage, PageId, PageMessaging};
use odx_core::protocol::{PageRequest, PageResponse, RuntimeRequest};
use odx_core::settings::SettingsPatch;

async fn settle() {
    for _ in 0..4 {
        tokio::time::advance(Duration::from_millis(40)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }
}

fn enable_patch() -> SettingsPatch {
    SettingsPatch {
        enabled: Some(true),
        ..SettingsPatch::default()
    }
}

/// Wire the injector so a script install attaches a live Applier, the way a
/// real injection leaves a listening content script behind.
fn attach_appliers_on_injection(memory: &MemoryPlatform) {
    let platform = memory.clone();
    memory.injector.set_script_hook(move |page| {
        let url = platform
            .tabs
            .lookup(page)
            .and_then(|info| info.url)
            .unwrap_or_default();
        let (_handle, _mutations) = spawn_memory_applier(&platform, page, &url);
    });
}

#[tokio::test(start_paused = true)]
async fn enable_flip_reaches_live_silent_and_skips_restricted_pages() {
    let memory = MemoryPlatform::new();
    memory
        .tabs
        .insert_page(PageId(1), Some("https://live.example/"), true);
    memory
        .tabs
        .insert_page(PageId(2), Some("https://silent.example/"), false);
    memory
        .tabs
        .insert_page(PageId(3), Some("chrome://extensions"), false);
    attach_appliers_on_injection(&memory);

    // Page 1 already runs an Applier; pages 2 and 3 do not.
    let (_handle, _mutations) = spawn_memory_applier(&memory, PageId(1), "https://live.example/");

    let coordinator = Coordinator::new(memory.platform());
    let inbox = memory.messaging.attach_runtime();
    let store = coordinator.store().clone();
    tokio::spawn(coordinator.run(inbox));
    settle().await;

    store.save(enable_patch()).await.expect("save");
    settle().await;

    // The live page heard the change through its own subscription.
    let response = memory
        .messaging
        .send_to_page(PageId(1), PageRequest::GetState)
        .await
        .expect("reply");
    let PageResponse::State(state) = response else {
        panic!("expected state reply");
    };
    assert!(state.should_apply());

    // The silent page was injected and its fresh Applier answers now.
    let response = memory
        .messaging
        .send_to_page(PageId(2), PageRequest::GetState)
        .await
        .expect("reply after injection");
    let PageResponse::State(state) = response else {
        panic!("expected state reply");
    };
    assert!(state.should_apply());

    // The restricted page was never touched.
    let touched: Vec<_> = memory.injector.calls().iter().map(|(id, _)| *id).collect();
    assert!(touched.contains(&PageId(2)));
    assert!(!touched.contains(&PageId(3)));
}

#[tokio::test(start_paused = true)]
async fn update_background_tabs_populates_only_unfocused_pages() {
    let memory = MemoryPlatform::new();
    memory
        .storage
        .set(enable_patch())
        .await
        .expect("seed enabled");
    memory
        .tabs
        .insert_page(PageId(1), Some("https://focused.example/"), true);
    memory
        .tabs
        .insert_page(PageId(2), Some("https://background.example/"), false);
    attach_appliers_on_injection(&memory);

    let coordinator = Coordinator::new(memory.platform());
    let inbox = memory.messaging.attach_runtime();
    tokio::spawn(coordinator.run(inbox));
    settle().await;

    memory
        .messaging
        .send_to_runtime(RuntimeRequest::UpdateBackgroundTabs)
        .await
        .expect("runtime request");
    settle().await;

    let calls = memory.injector.calls();
    assert_eq!(
        calls,
        vec![(PageId(2), Installed::Assets), (PageId(2), Installed::Script)],
        "focused page is left to the popup's direct channel"
    );
}
