#![allow(dead_code)]

use std::sync::{Mutex, MutexGuard, PoisonError};

use stripe_wire::config::{self, ScopedConfig};
use stripe_wire::{Config, LogLevel, Requestor};

pub const STRIPE_MOCK_BASE: &str = "http://localhost:12111";

static GLOBAL_CONFIG_LOCK: Mutex<()> = Mutex::new(());

/// Settings every test starts from: a local API base, a test key, no proxy
/// and no preassigned transport.
pub fn test_config() -> Config {
    Config::default()
        .with_api_base(STRIPE_MOCK_BASE)
        .with_api_key("sk_test_123")
        .with_log_level(LogLevel::Warning)
}

/// Exclusive use of the process-wide configuration and requestor for one
/// test. Everything is put back when it drops, panics included.
pub struct GlobalFixture {
    scope: Option<ScopedConfig>,
    _lock: MutexGuard<'static, ()>,
}

impl GlobalFixture {
    pub fn new() -> Self {
        let lock = GLOBAL_CONFIG_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Requestor::global().reset().expect("global requestor resets");
        let scope = config::override_global(|config| *config = test_config());

        Self {
            scope: Some(scope),
            _lock: lock,
        }
    }

    pub fn original(&self) -> Config {
        self.scope
            .as_ref()
            .and_then(|scope| scope.original())
            .cloned()
            .expect("fixture holds the original config")
    }
}

impl Drop for GlobalFixture {
    fn drop(&mut self) {
        drop(self.scope.take());
        let _ = Requestor::global().reset();
    }
}

pub fn lock_global_config() -> MutexGuard<'static, ()> {
    GLOBAL_CONFIG_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}
