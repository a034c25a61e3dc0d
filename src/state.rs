//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::store::ContentStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: ContentStore,
}

impl AppState {
    pub fn new(config: Config, store: ContentStore) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, store }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the content store
    pub fn store(&self) -> &ContentStore {
        &self.inner.store
    }
}
