//! The global entry point: register drivers and caches, then hand out a
//! [`SessionFactory`] per named environment. Built around a
//! `DashMap<String, Arc<dyn Driver>>` singleton, generalized to also carry
//! the frozen statement/result-map registry and the interceptor chain a
//! `Session` needs.

use crate::cache::Cache;
use crate::error::SqlweaveError;
use crate::interceptor::InterceptorChain;
use crate::registry::{FrozenRegistry, Registry};
use crate::session_factory::SessionFactory;
use crate::udbc::driver::Driver;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, OnceLock};

pub struct Environment {
    drivers: DashMap<String, Arc<dyn Driver>>,
    caches: DashMap<String, Arc<dyn Cache>>,
    interceptors: Mutex<InterceptorChain>,
    frozen: OnceLock<Arc<FrozenRegistry>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            drivers: DashMap::new(),
            caches: DashMap::new(),
            interceptors: Mutex::new(InterceptorChain::new()),
            frozen: OnceLock::new(),
        }
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under its own `driver.name()`. Errors if a
    /// driver with that name is already registered.
    pub fn register_driver(&self, driver: impl Driver + 'static) -> Result<(), SqlweaveError> {
        let name = driver.name().to_string();
        if self.drivers.contains_key(&name) {
            return Err(SqlweaveError::Configuration(format!("driver '{name}' already registered")));
        }
        self.drivers.insert(name, Arc::new(driver));
        Ok(())
    }

    pub fn register_cache(&self, namespace: impl Into<String>, cache: Arc<dyn Cache>) {
        self.caches.insert(namespace.into(), cache);
    }

    pub fn interceptors(&self) -> std::sync::MutexGuard<'_, InterceptorChain> {
        self.interceptors.lock().expect("interceptor chain mutex poisoned")
    }

    /// Freezes the global statement/result-map registry on first use.
    /// Mapper XML is loaded via `#[ctor]` before `main` runs, so by the
    /// time any `session_factory` call happens every namespace is
    /// already registered.
    fn frozen_registry(&self) -> Result<Arc<FrozenRegistry>, SqlweaveError> {
        if let Some(frozen) = self.frozen.get() {
            return Ok(frozen.clone());
        }
        let frozen = Registry::global().freeze()?;
        for (namespace, cfg) in &frozen.caches {
            self.caches.entry(namespace.clone()).or_insert_with(|| crate::cache::build(cfg));
        }
        let frozen = Arc::new(frozen);
        let _ = self.frozen.set(frozen.clone());
        Ok(frozen)
    }

    pub fn session_factory(&self, name: &str) -> Option<SessionFactory> {
        let driver = self.drivers.get(name)?.value().clone();
        let registry = self.frozen_registry().ok()?;
        let caches = self.caches.iter().map(|e| (e.key().clone(), e.value().clone())).collect();
        Some(SessionFactory::new(driver, registry, caches, self.interceptors().clone()))
    }
}

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

pub fn global() -> &'static Environment {
    ENVIRONMENT.get_or_init(Environment::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udbc::connection::Connection;
    use async_trait::async_trait;

    struct StubDriver(&'static str);

    #[async_trait]
    impl Driver for StubDriver {
        fn name(&self) -> &str {
            self.0
        }
        fn r#type(&self) -> &str {
            "stub"
        }
        fn placeholder(&self, _seq: usize, _name: &str) -> String {
            "?".to_string()
        }
        async fn acquire(&self) -> Result<Box<dyn Connection>, SqlweaveError> {
            unimplemented!()
        }
        async fn close(&self) -> Result<(), SqlweaveError> {
            Ok(())
        }
    }

    #[test]
    fn registering_the_same_driver_name_twice_is_an_error() {
        let env = Environment::new();
        env.register_driver(StubDriver("dup-env-test")).unwrap();
        let err = env.register_driver(StubDriver("dup-env-test")).unwrap_err();
        assert!(matches!(err, SqlweaveError::Configuration(_)));
    }

    #[test]
    fn session_factory_is_none_for_an_unregistered_name() {
        let env = Environment::new();
        assert!(env.session_factory("does-not-exist").is_none());
    }

    #[test]
    fn session_factory_is_some_once_the_driver_is_registered() {
        let env = Environment::new();
        env.register_driver(StubDriver("registered-env-test")).unwrap();
        assert!(env.session_factory("registered-env-test").is_some());
    }
}
