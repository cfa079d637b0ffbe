use std::sync::{Arc, PoisonError, RwLock};

use super::settings::Settings;

/// Read-only view of the current settings.
///
/// Consumers call [`settings`](Self::settings) on every request or cycle
/// instead of keeping a copy, so an update is picked up without restarting
/// anything.
pub trait ConfigSource: Send + Sync {
    fn settings(&self) -> Arc<Settings>;
}

/// In-memory [`ConfigSource`] whose snapshot can be swapped at runtime.
#[derive(Debug, Default)]
pub struct SharedConfig {
    current: RwLock<Arc<Settings>>,
}

impl SharedConfig {
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    /// Replaces the whole snapshot.
    pub fn replace(&self, settings: Settings) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }

    /// Applies `change` to a copy of the current snapshot and publishes it.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Settings::clone(&current);
        change(&mut next);
        *current = Arc::new(next);
    }
}

impl ConfigSource for SharedConfig {
    fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }
}
