//! Page DOM abstraction.
//!
//! The Applier drives the page through a handful of hooks: a marker class on
//! the document root and CSS custom properties on its inline style. The real
//! content script implements this against the live document; [`MemoryDom`]
//! implements it for tests and the simulator, counting effective mutations.

use std::collections::BTreeMap;

use odx_core::origin;

/// Hooks into one page's document root.
pub trait PageDom: Send {
    /// The page's full URL.
    fn url(&self) -> String;

    /// The page's hostname, if resolvable. Restricted origins never resolve.
    fn hostname(&self) -> Option<String> {
        origin::hostname(&self.url())
    }

    /// Add the marker class to the document root.
    fn add_marker(&mut self);

    /// Remove the marker class.
    fn remove_marker(&mut self);

    /// Whether the marker class is currently present.
    fn has_marker(&self) -> bool;

    /// Define or update a CSS custom property on the root.
    fn set_variable(&mut self, name: &str, value: &str);

    /// Remove a CSS custom property from the root.
    fn remove_variable(&mut self, name: &str);
}

/// In-memory document root.
///
/// `mutations` counts effective changes only: re-adding a present marker or
/// re-setting a variable to its current value does not count. That makes the
/// counter a direct measure of visual churn for idempotence tests.
#[derive(Debug, Clone)]
pub struct MemoryDom {
    url: String,
    marker: bool,
    variables: BTreeMap<String, String>,
    mutations: u64,
}

impl MemoryDom {
    /// A document root at `url` with no marker and no variables.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            marker: false,
            variables: BTreeMap::new(),
            mutations: 0,
        }
    }

    /// Number of effective DOM mutations so far.
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    /// Value of a custom property, if defined.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Number of defined custom properties.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Simulate a framework re-render wiping the injected marker, the
    /// situation the mutation watcher defends against.
    pub fn strip_marker(&mut self) {
        self.marker = false;
    }
}

impl PageDom for MemoryDom {
    fn url(&self) -> String {
        self.url.clone()
    }

    fn add_marker(&mut self) {
        if !self.marker {
            self.marker = true;
            self.mutations += 1;
        }
    }

    fn remove_marker(&mut self) {
        if self.marker {
            self.marker = false;
            self.mutations += 1;
        }
    }

    fn has_marker(&self) -> bool {
        self.marker
    }

    fn set_variable(&mut self, name: &str, value: &str) {
        let current = self.variables.get(name);
        if current.map(String::as_str) != Some(value) {
            self.variables.insert(name.to_string(), value.to_string());
            self.mutations += 1;
        }
    }

    fn remove_variable(&mut self, name: &str) {
        if self.variables.remove(name).is_some() {
            self.mutations += 1;
        }
    }
}
