//! The driver contract and the process-wide driver registry (spec.md §4.4).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::connection::{BaseConnection, Paradigm};
use crate::error::{DbResult, Error};
use crate::url::ConnectionUrl;

/// Credentials and free-form options passed from a connection request down
/// to the driver that ultimately opens the connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub extra: HashMap<String, String>,
}

/// Per-backend connection factory.
///
/// A driver accepts a URL, recognizes whether it owns that URL, connects
/// with credentials and options, and identifies its paradigm. Implementors
/// must be stateless enough to be shared process-wide behind an `Arc`.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Stable identity used for idempotent registration and for tests that
    /// pin registration order. Two drivers with the same `name` are
    /// considered the same driver.
    fn name(&self) -> &str;

    /// The storage-model family this driver connects to.
    fn paradigm(&self) -> Paradigm;

    /// The default port used when a URL for this driver's backend omits one.
    /// Drivers for backends with no notion of a network port (e.g. `sqlite`)
    /// return `0`.
    fn default_port(&self) -> u16;

    /// The URI scheme name(s) this driver recognizes (the `<backend>` in
    /// `cpp_dbc:<backend>://...`).
    fn url_schemes(&self) -> &[&str];

    /// Returns `true` if this driver owns the given URL.
    fn accepts_url(&self, url: &ConnectionUrl) -> bool {
        self.url_schemes().contains(&url.backend())
    }

    /// Connects to the backend described by `url`, returning a connection
    /// implementing whichever paradigm contract this driver's `paradigm()`
    /// declares. Returned as the base contract; callers downcast (or, more
    /// commonly, go through a paradigm-specific pool that already knows the
    /// concrete type).
    async fn connect(
        &self,
        url: &ConnectionUrl,
        options: &ConnectOptions,
    ) -> DbResult<Arc<dyn BaseConnection>>;

    /// Builds a URL for this backend from components, when the caller wants
    /// to avoid hand-formatting strings. Optional: the default is
    /// unsupported.
    fn build_uri(
        &self,
        _host: &str,
        _port: Option<u16>,
        _database: Option<&str>,
        _options: &HashMap<String, String>,
    ) -> DbResult<String> {
        Err(Error::backend_error(format!(
            "driver {} does not implement build_uri",
            self.name()
        )))
    }
}

/// Process-wide, sequentially-queried registry of drivers.
///
/// Dispatch is first-match-wins: `get_connection` iterates drivers in
/// registration order and uses the first whose `accepts_url` returns `true`.
/// Registration order is therefore observable and part of this type's
/// contract — tests should pin it.
pub struct DriverRegistry {
    drivers: RwLock<Vec<Arc<dyn Driver>>>,
}

impl DriverRegistry {
    fn new() -> Self {
        Self {
            drivers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a driver. Idempotent on driver identity (`Driver::name`):
    /// registering the same name twice has the effect of a single
    /// registration, keeping the original's position in the order.
    pub fn register_driver(&self, driver: Arc<dyn Driver>) {
        let mut drivers = self.drivers.write().unwrap();
        if drivers.iter().any(|d| d.name() == driver.name()) {
            return;
        }
        drivers.push(driver);
    }

    /// Returns the first registered driver that accepts `url`, in
    /// registration order.
    pub fn get_driver(&self, url: &ConnectionUrl) -> DbResult<Arc<dyn Driver>> {
        let drivers = self.drivers.read().unwrap();
        drivers
            .iter()
            .find(|d| d.accepts_url(url))
            .cloned()
            .ok_or_else(|| Error::url_not_accepted(url.as_str()))
    }

    /// Parses `url`, dispatches to the first accepting driver, and connects.
    pub async fn get_connection(
        &self,
        url: &str,
        options: &ConnectOptions,
    ) -> DbResult<Arc<dyn BaseConnection>> {
        let url = ConnectionUrl::parse(url)?;
        let driver = self.get_driver(&url)?;
        driver.connect(&url, options).await
    }

    /// Snapshot of currently registered drivers, in registration order.
    /// Used for introspection and by tests asserting dispatch order.
    pub fn registered_drivers(&self) -> Vec<Arc<dyn Driver>> {
        self.drivers.read().unwrap().clone()
    }
}

static REGISTRY: Lazy<DriverRegistry> = Lazy::new(DriverRegistry::new);

/// The process-wide driver registry.
pub fn registry() -> &'static DriverRegistry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::BaseConnection;

    struct FakeConn(String);

    #[async_trait]
    impl BaseConnection for FakeConn {
        async fn close(&self) -> DbResult<()> {
            Ok(())
        }
        fn is_closed(&self) -> bool {
            false
        }
        async fn return_to_pool(&self) -> DbResult<()> {
            Ok(())
        }
        fn is_pooled(&self) -> bool {
            false
        }
        fn get_url(&self) -> &str {
            &self.0
        }
    }

    struct FakeDriver {
        name: &'static str,
        schemes: Vec<&'static str>,
    }

    #[async_trait]
    impl Driver for FakeDriver {
        fn name(&self) -> &str {
            self.name
        }
        fn paradigm(&self) -> Paradigm {
            Paradigm::Relational
        }
        fn default_port(&self) -> u16 {
            0
        }
        fn url_schemes(&self) -> &[&str] {
            &self.schemes
        }
        async fn connect(
            &self,
            url: &ConnectionUrl,
            _options: &ConnectOptions,
        ) -> DbResult<Arc<dyn BaseConnection>> {
            Ok(Arc::new(FakeConn(url.as_str().to_owned())))
        }
    }

    #[test]
    fn first_match_wins_in_registration_order() {
        let registry = DriverRegistry::new();
        registry.register_driver(Arc::new(FakeDriver {
            name: "first",
            schemes: vec!["widget"],
        }));
        registry.register_driver(Arc::new(FakeDriver {
            name: "second",
            schemes: vec!["widget"],
        }));

        let url = ConnectionUrl::parse("cpp_dbc:widget://host").unwrap();
        let driver = registry.get_driver(&url).unwrap();
        assert_eq!(driver.name(), "first");
    }

    #[test]
    fn registering_same_name_twice_is_idempotent() {
        let registry = DriverRegistry::new();
        registry.register_driver(Arc::new(FakeDriver {
            name: "only",
            schemes: vec!["widget"],
        }));
        registry.register_driver(Arc::new(FakeDriver {
            name: "only",
            schemes: vec!["widget"],
        }));

        assert_eq!(registry.registered_drivers().len(), 1);
    }

    #[test]
    fn unaccepted_url_is_an_error() {
        let registry = DriverRegistry::new();
        let url = ConnectionUrl::parse("cpp_dbc:nothing://host").unwrap();
        assert!(registry.get_driver(&url).is_err());
    }
}
