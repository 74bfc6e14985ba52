//! One environment's session-producing handle: a driver paired with the
//! frozen registry and caches that were in scope when the environment
//! was built. Opens a fully-wired `Session` rather than a bare connection
//! wrapper.

use crate::cache::Cache;
use crate::interceptor::InterceptorChain;
use crate::registry::FrozenRegistry;
use crate::session::Session;
use crate::udbc::driver::Driver;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct SessionFactory {
    driver: Arc<dyn Driver>,
    registry: Arc<FrozenRegistry>,
    caches: HashMap<String, Arc<dyn Cache>>,
    interceptors: InterceptorChain,
}

impl SessionFactory {
    pub(crate) fn new(
        driver: Arc<dyn Driver>,
        registry: Arc<FrozenRegistry>,
        caches: HashMap<String, Arc<dyn Cache>>,
        interceptors: InterceptorChain,
    ) -> Self {
        Self { driver, registry, caches, interceptors }
    }

    pub fn open_session(&self) -> Session {
        Session::new(self.driver.clone(), self.registry.clone(), self.caches.clone(), self.interceptors.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::udbc::connection::Connection;
    use async_trait::async_trait;

    struct StubDriver;

    #[async_trait]
    impl Driver for StubDriver {
        fn name(&self) -> &str {
            "stub"
        }
        fn r#type(&self) -> &str {
            "stub"
        }
        fn placeholder(&self, _seq: usize, _name: &str) -> String {
            "?".to_string()
        }
        async fn acquire(&self) -> Result<Box<dyn Connection>, crate::error::SqlweaveError> {
            unimplemented!()
        }
        async fn close(&self) -> Result<(), crate::error::SqlweaveError> {
            Ok(())
        }
    }

    #[test]
    fn open_session_starts_with_no_transaction() {
        let registry = Arc::new(Registry::default().freeze().unwrap());
        let factory = SessionFactory::new(Arc::new(StubDriver), registry, HashMap::new(), InterceptorChain::new());
        let session = factory.open_session();
        assert!(!session.is_transaction_active());
    }

    #[test]
    fn each_open_session_is_independent() {
        let registry = Arc::new(Registry::default().freeze().unwrap());
        let factory = SessionFactory::new(Arc::new(StubDriver), registry, HashMap::new(), InterceptorChain::new());
        let mut a = factory.open_session();
        let b = factory.open_session();
        a.close();
        // b was produced from the same factory but is its own instance.
        assert!(!b.is_transaction_active());
    }
}
