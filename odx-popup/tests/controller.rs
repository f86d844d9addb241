//! Controller pipeline against a live platform: debounced writes, direct
//! previews, and the reset semantics.

use std::time::Duration;

use odx_content::spawn_memory_applier;
use odx_core::platform::memory::MemoryPlatform;
use odx_core::platform::{KeyValueStorage, PageId, PageMessaging};
use odx_core::protocol::{PageRequest, PageResponse, RuntimeRequest};
use odx_core::settings::{SettingKey, SettingsPatch, Theme};
use odx_popup::Controller;

async fn settle(ms: u64) {
    // Poll freshly spawned tasks first so their sleep timers are
    // registered before the clock advances past them.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::advance(Duration::from_millis(ms)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// A platform with one focused page running a live Applier.
fn focused_platform(url: &str) -> (MemoryPlatform, PageId) {
    let memory = MemoryPlatform::new();
    let page = PageId(1);
    memory.tabs.insert_page(page, Some(url), true);
    let (_handle, _mutations) = spawn_memory_applier(&memory, page, url);
    (memory, page)
}

async fn page_state(memory: &MemoryPlatform, page: PageId) -> odx_core::protocol::PageState {
    let response = memory
        .messaging
        .send_to_page(page, PageRequest::GetState)
        .await
        .expect("reply");
    match response {
        PageResponse::State(state) => state,
        PageResponse::Ack { .. } => panic!("expected state reply"),
    }
}

#[tokio::test(start_paused = true)]
async fn drag_persists_once_with_the_final_value() {
    let (memory, page) = focused_platform("https://example.com/");
    let mut runtime_inbox = memory.messaging.attach_runtime();
    settle(40).await;

    let mut controller = Controller::open(memory.platform()).await;

    // A drag: many inputs, one commit.
    for value in (100..=300).step_by(50) {
        controller.slider_input(SettingKey::LetterSpacing, value);
        settle(5).await;
    }
    controller.slider_commit().await;

    // Before the trailing debounce: nothing persisted yet.
    assert!(memory.storage.raw().letter_spacing.is_none());

    settle(600).await;
    assert_eq!(memory.storage.raw().letter_spacing, Some(300));

    // Exactly one population nudge for the whole drag.
    assert_eq!(
        runtime_inbox.try_recv().expect("one nudge"),
        RuntimeRequest::UpdateBackgroundTabs
    );
    assert!(runtime_inbox.try_recv().is_err());

    // The focused page previewed the final value directly.
    settle(40).await;
    assert_eq!(page_state(&memory, page).await.letter_spacing, 300);
}

#[tokio::test(start_paused = true)]
async fn wheel_steps_clamp_and_arm_the_trailing_persist() {
    let (memory, _page) = focused_platform("https://example.com/");
    settle(40).await;

    let mut controller = Controller::open(memory.platform()).await;
    // Far past the rail: clamps at the maximum.
    controller.wheel(SettingKey::FontSize, 100);
    assert_eq!(controller.settings().font_size, 200);

    settle(600).await;
    assert_eq!(memory.storage.raw().font_size, Some(200));
}

#[tokio::test(start_paused = true)]
async fn toggle_persists_immediately_and_previews_the_focused_page() {
    let (memory, page) = focused_platform("https://example.com/");
    settle(40).await;

    let mut controller = Controller::open(memory.platform()).await;
    controller.toggle_enabled().await;

    // No trailing debounce on the switch.
    assert_eq!(memory.storage.raw().enabled, Some(true));

    settle(40).await;
    let state = page_state(&memory, page).await;
    assert!(state.enabled);
    assert!(state.should_apply());
}

#[tokio::test(start_paused = true)]
async fn exclusion_toggle_targets_the_current_host() {
    let (memory, page) = focused_platform("https://news.example/");
    memory
        .storage
        .set(SettingsPatch {
            enabled: Some(true),
            ..SettingsPatch::default()
        })
        .await
        .expect("seed");
    settle(40).await;

    let mut controller = Controller::open(memory.platform()).await;
    controller.set_excluded(true).await;

    let domains = memory.storage.raw().excluded_domains.expect("persisted");
    assert!(domains.contains("news.example"));

    settle(40).await;
    assert!(!page_state(&memory, page).await.should_apply());
}

#[tokio::test(start_paused = true)]
async fn reset_restores_defaults_but_spares_other_hosts_exclusions() {
    let (memory, _page) = focused_platform("https://current.example/");
    let mut domains = std::collections::BTreeSet::new();
    domains.insert("current.example".to_string());
    domains.insert("other.example".to_string());
    memory
        .storage
        .set(SettingsPatch {
            enabled: Some(true),
            letter_spacing: Some(800),
            font_size: Some(150),
            theme: Some(Theme::Dark),
            excluded_domains: Some(domains),
            ..SettingsPatch::default()
        })
        .await
        .expect("seed");
    settle(40).await;

    let mut controller = Controller::open(memory.platform()).await;
    controller.reset().await;

    let raw = memory.storage.raw();
    assert_eq!(raw.letter_spacing, Some(0));
    assert_eq!(raw.font_size, Some(100));
    assert_eq!(raw.theme, Some(Theme::System));
    assert_eq!(raw.enabled, Some(true), "the switch is not reset");
    let domains = raw.excluded_domains.expect("persisted");
    assert!(!domains.contains("current.example"));
    assert!(domains.contains("other.example"), "other hosts untouched");
}

#[tokio::test(start_paused = true)]
async fn population_nudge_follows_the_persisted_write() {
    let (memory, _page) = focused_platform("https://example.com/");
    let mut runtime_inbox = memory.messaging.attach_runtime();
    settle(40).await;

    let mut controller = Controller::open(memory.platform()).await;

    // A failed write must not nudge the background pass: a page injected
    // by the pass would load a record the drag never reached.
    memory.storage.set_fail_writes(true);
    controller.slider_input(SettingKey::LetterSpacing, 500);
    controller.slider_commit().await;
    settle(600).await;
    assert!(runtime_inbox.try_recv().is_err(), "no nudge without a write");

    memory.storage.set_fail_writes(false);
    controller.slider_input(SettingKey::LetterSpacing, 600);
    controller.slider_commit().await;
    settle(600).await;

    // The nudge arrives only once the value is in the record.
    assert_eq!(
        runtime_inbox.try_recv().expect("one nudge"),
        RuntimeRequest::UpdateBackgroundTabs
    );
    assert_eq!(memory.storage.raw().letter_spacing, Some(600));
}

#[tokio::test(start_paused = true)]
async fn toggle_inverts_the_persisted_value_not_the_open_snapshot() {
    let (memory, _page) = focused_platform("https://example.com/");
    settle(40).await;

    let mut controller = Controller::open(memory.platform()).await;
    // Another surface flips the switch while this popup sits open.
    memory
        .storage
        .set(SettingsPatch {
            enabled: Some(true),
            ..SettingsPatch::default()
        })
        .await
        .expect("seed");

    controller.toggle_enabled().await;
    assert_eq!(memory.storage.raw().enabled, Some(false));
    assert!(!controller.settings().enabled);
}

#[tokio::test(start_paused = true)]
async fn theme_cycles_and_persists_without_touching_pages() {
    let (memory, page) = focused_platform("https://example.com/");
    settle(40).await;

    let mut controller = Controller::open(memory.platform()).await;
    controller.cycle_theme().await;
    assert_eq!(memory.storage.raw().theme, Some(Theme::Light));
    controller.cycle_theme().await;
    assert_eq!(memory.storage.raw().theme, Some(Theme::Dark));

    // The page's state never carries a theme and stays at its defaults.
    settle(40).await;
    let state = page_state(&memory, page).await;
    assert!(!state.enabled);
}
