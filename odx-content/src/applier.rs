//! The Style Applier state machine.
//!
//! Synchronous core driven by the runtime loop: requests and change sets
//! mutate the cached [`PageState`]; visual work is queued as a single
//! pending [`Commit`] and applied by `flush_frame`, at most once per tick.

use odx_core::origin;
use odx_core::protocol::{PageRequest, PageResponse, PageState};
use odx_core::settings::{ChangeSet, Settings, SettingsPatch};
use odx_core::style::StyleVars;

use crate::dom::PageDom;

/// A queued visual commit. Newer requests replace an unflushed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Enter Active: define effect variables, then set the marker.
    Assert,
    /// Enter Inactive: clear the marker and all effect variables.
    Clear,
    /// Already Active: re-assert only the effect variables.
    Metrics,
}

/// One page's Style Applier.
#[derive(Debug)]
pub struct StyleApplier<D: PageDom> {
    dom: D,
    state: PageState,
    initialized: bool,
    pending: Option<Commit>,
}

impl<D: PageDom> StyleApplier<D> {
    /// Wrap a page's document root. No effect until [`initialize`] runs.
    ///
    /// [`initialize`]: StyleApplier::initialize
    pub fn new(dom: D) -> Self {
        Self {
            dom,
            state: PageState::default(),
            initialized: false,
            pending: None,
        }
    }

    /// The document root.
    pub fn dom(&self) -> &D {
        &self.dom
    }

    /// Mutable access to the document root, for harnesses simulating
    /// external page behavior.
    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    /// The cached page state.
    pub fn state(&self) -> PageState {
        self.state
    }

    /// Whether this page is a restricted origin the Applier must never
    /// touch.
    pub fn is_restricted(&self) -> bool {
        origin::is_restricted(&self.dom.url())
    }

    /// The load step: derive state from the full record and queue the
    /// matching transition. Silently no-ops on restricted origins. Also the
    /// re-initialize path, run unconditionally on `REINITIALIZE`.
    pub fn initialize(&mut self, settings: &Settings) {
        if self.is_restricted() {
            return;
        }
        self.initialized = true;
        self.state = PageState::derive(settings, self.dom.hostname().as_deref());
        self.queue_transition();
    }

    /// Handle a direct request. Returns the reply, or `None` for
    /// `REINITIALIZE`, which the runtime loop answers itself after
    /// re-fetching the store.
    pub fn handle_request(&mut self, request: &PageRequest) -> Option<PageResponse> {
        match request {
            PageRequest::Reinitialize => None,
            PageRequest::GetState => Some(PageResponse::State(self.state)),
            PageRequest::UpdateStyles { settings } => {
                self.merge(settings);
                Some(PageResponse::ack())
            }
        }
    }

    /// Handle a storage change fan-out batch.
    pub fn apply_changes(&mut self, changes: &ChangeSet) {
        if !self.initialized || changes.is_empty() {
            return;
        }
        self.merge(&changes.to_patch());
    }

    /// Merge a partial record into the cached state and queue the minimal
    /// visual work.
    ///
    /// Only fields that actually differ are updated, so a stale message
    /// arriving after a newer local change cannot regress state, and an
    /// identical payload twice queues nothing the second time.
    fn merge(&mut self, patch: &SettingsPatch) {
        if !self.initialized {
            return;
        }

        let was_applying = self.state.should_apply();
        let mut metrics_changed = false;
        let mut gating_changed = false;

        let mut merge_metric = |current: &mut i32, incoming: Option<i32>| {
            if let Some(value) = incoming {
                if *current != value {
                    *current = value;
                    metrics_changed = true;
                }
            }
        };
        merge_metric(&mut self.state.letter_spacing, patch.letter_spacing);
        merge_metric(&mut self.state.word_spacing, patch.word_spacing);
        merge_metric(&mut self.state.line_height, patch.line_height);
        merge_metric(&mut self.state.font_size, patch.font_size);

        if let Some(domains) = &patch.excluded_domains {
            let excluded = self
                .dom
                .hostname()
                .is_some_and(|host| domains.contains(&host));
            if self.state.excluded != excluded {
                self.state.excluded = excluded;
                gating_changed = true;
            }
        }

        if let Some(enabled) = patch.enabled {
            if self.state.enabled != enabled {
                self.state.enabled = enabled;
                gating_changed = true;
            }
        }

        if gating_changed && self.state.should_apply() != was_applying {
            self.queue_transition();
        } else if metrics_changed && self.state.should_apply() {
            // No transition: re-assert only the changed variables.
            self.queue(Commit::Metrics);
        }
    }

    /// Whether the structural-change watcher should be running. Only while
    /// the effect is meant to be asserted; no observer runs while Inactive.
    pub fn wants_observer(&self) -> bool {
        self.initialized && self.state.should_apply()
    }

    /// A structural change was observed. Returns whether the re-assertion
    /// debounce should be armed: only when the effect should be asserted but
    /// the marker has been stripped.
    pub fn notify_mutation(&mut self) -> bool {
        self.wants_observer() && !self.dom.has_marker()
    }

    /// Debounce expiry: re-assert the marker and variables.
    pub fn reassert(&mut self) {
        if self.wants_observer() {
            self.queue(Commit::Assert);
        }
    }

    /// Whether a visual commit is queued.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Apply the pending commit, if any. Called once per rendering tick;
    /// returns whether anything was flushed.
    pub fn flush_frame(&mut self) -> bool {
        let Some(commit) = self.pending.take() else {
            return false;
        };
        match commit {
            Commit::Assert => {
                self.write_variables();
                self.dom.add_marker();
            }
            Commit::Metrics => self.write_variables(),
            Commit::Clear => {
                self.dom.remove_marker();
                for name in StyleVars::names() {
                    self.dom.remove_variable(name);
                }
            }
        }
        true
    }

    fn write_variables(&mut self) {
        let vars = StyleVars::from_state(&self.state);
        for (name, value) in vars.entries() {
            self.dom.set_variable(name, value);
        }
    }

    fn queue_transition(&mut self) {
        if self.state.should_apply() {
            self.queue(Commit::Assert);
        } else {
            self.queue(Commit::Clear);
        }
    }

    fn queue(&mut self, commit: Commit) {
        if let Some(previous) = self.pending.replace(commit) {
            tracing::trace!("superseded pending commit {previous:?}");
        }
    }
}
