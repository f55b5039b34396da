//! Application state for the HTTP server.

use std::path::PathBuf;

/// Shared state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Directory holding the `scenario*` golden test directories served by
    /// the unit-test endpoint.
    pub test_suite_dir: PathBuf,
}

impl AppState {
    pub fn new(test_suite_dir: PathBuf) -> Self {
        Self { test_suite_dir }
    }
}
