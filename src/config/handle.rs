//! Engine config with atomic replacement until the first render.
//!
//! Uses `arc-swap` for lock-free reads and atomic config replacement. Once
//! the engine starts rendering it calls [`ConfigHandle::lock`], after which
//! the configuration is read-only for the lifetime of the engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  ConfigHandle (ArcSwap)                      │
//! │                                                              │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     │
//! │  │  Render 1   │     │  Render 2   │     │   Caller    │     │
//! │  │  (thread)   │     │  (thread)   │     │  (setup)    │     │
//! │  └──────┬──────┘     └──────┬──────┘     └──────┬──────┘     │
//! │         │                   │                   │            │
//! │         ▼                   ▼                   ▼            │
//! │       load()              load()            update(..)       │
//! │    (lock-free)         (lock-free)    (fails once locked)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use super::{ConfigError, EngineConfig};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

pub struct ConfigHandle {
    current: ArcSwap<EngineConfig>,
    locked: AtomicBool,
    /// Serializes writers against `lock()`.
    write: Mutex<()>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
            locked: AtomicBool::new(false),
            write: Mutex::new(()),
        }
    }

    /// Get current config. Wait-free.
    #[inline]
    pub fn load(&self) -> Arc<EngineConfig> {
        self.current.load_full()
    }

    /// Apply `f` to a copy of the current config, validate it and publish it.
    pub fn update(&self, f: impl FnOnce(&mut EngineConfig)) -> Result<(), ConfigError> {
        let _guard = self.write.lock();
        if self.is_locked() {
            return Err(ConfigError::Locked);
        }
        let mut next = EngineConfig::clone(&self.current.load());
        f(&mut next);
        next.validate()?;
        self.current.store(Arc::new(next));
        Ok(())
    }

    /// Replace the config wholesale. Fails once locked.
    pub fn replace(&self, config: EngineConfig) -> Result<(), ConfigError> {
        self.update(|current| *current = config)
    }

    /// Freeze the configuration. Idempotent.
    pub fn lock(&self) {
        let _guard = self.write.lock();
        self.locked.store(true, Ordering::Release);
    }

    /// Fail with [`ConfigError::Locked`] once frozen.
    pub fn ensure_unlocked(&self) -> Result<(), ConfigError> {
        if self.is_locked() {
            Err(ConfigError::Locked)
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ConfigHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("config", &self.load())
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_before_lock() {
        let handle = ConfigHandle::new(EngineConfig::default());
        handle
            .update(|c| c.templates.default_extension = ".html".into())
            .unwrap();
        assert_eq!(handle.load().templates.extension(), "html");
    }

    #[test]
    fn test_update_rejects_invalid() {
        let handle = ConfigHandle::new(EngineConfig::default());
        let result = handle.update(|c| c.paths.application_root = "relative".into());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
        assert_eq!(handle.load().paths.application_root, "/");
    }

    #[test]
    fn test_update_after_lock_fails() {
        let handle = ConfigHandle::new(EngineConfig::default());
        handle.lock();
        handle.lock();
        let result = handle.update(|c| c.paths.application_root = "/app".into());
        assert!(matches!(result, Err(ConfigError::Locked)));
        assert!(matches!(handle.ensure_unlocked(), Err(ConfigError::Locked)));
        assert_eq!(handle.load().paths.application_root, "/");
    }

    #[test]
    fn test_readers_keep_old_snapshot() {
        let handle = ConfigHandle::new(EngineConfig::default());
        let before = handle.load();
        handle
            .update(|c| c.paths.shared_location = "~/Layouts".into())
            .unwrap();
        assert_eq!(before.paths.shared_location, "~/Shared");
        assert_eq!(handle.load().paths.shared_location, "~/Layouts");
    }
}
