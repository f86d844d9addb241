//! # ODX Content
//!
//! The Style Applier: one instance per page/frame, translating settings into
//! the concrete visual effect. Two logical states, Inactive (no effect) and
//! Active (marker class plus effect variables asserted), with transitions
//! driven by direct messages, storage change fan-out, and a structural
//! mutation watcher that defends against frameworks stripping injected
//! attributes on re-render.
//!
//! Visual commits are frame-coalesced: at most one pending commit per tick,
//! newest wins.

pub mod applier;
pub mod dom;
pub mod runtime;

pub use applier::{Commit, StyleApplier};
pub use dom::{MemoryDom, PageDom};
pub use runtime::{run_applier, spawn_memory_applier, ApplierConfig};
