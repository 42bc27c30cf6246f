//! Pool configuration (spec.md §6 "Configuration").

use std::time::Duration;

/// Tunables for a [`super::Pool`], shared across all three paradigms.
///
/// `transaction_isolation`, when set, is applied to relational and columnar
/// connections that support it; document backends ignore it.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub initial_size: u32,
    pub max_size: u32,
    pub min_idle: u32,
    pub max_wait: Duration,
    pub validation_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_on_borrow: bool,
    pub test_on_return: bool,
    pub transaction_isolation: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 1,
            max_size: 10,
            min_idle: 1,
            max_wait: Duration::from_secs(30),
            validation_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            test_on_borrow: true,
            test_on_return: false,
            transaction_isolation: None,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_size(mut self, n: u32) -> Self {
        self.initial_size = n;
        self
    }

    pub fn with_max_size(mut self, n: u32) -> Self {
        self.max_size = n;
        self
    }

    pub fn with_min_idle(mut self, n: u32) -> Self {
        self.min_idle = n;
        self
    }

    pub fn with_max_wait(mut self, d: Duration) -> Self {
        self.max_wait = d;
        self
    }

    pub fn with_validation_timeout(mut self, d: Duration) -> Self {
        self.validation_timeout = d;
        self
    }

    pub fn with_idle_timeout(mut self, d: Option<Duration>) -> Self {
        self.idle_timeout = d;
        self
    }

    pub fn with_max_lifetime(mut self, d: Option<Duration>) -> Self {
        self.max_lifetime = d;
        self
    }

    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }

    pub fn with_test_on_return(mut self, enabled: bool) -> Self {
        self.test_on_return = enabled;
        self
    }

    pub fn with_transaction_isolation(mut self, level: Option<String>) -> Self {
        self.transaction_isolation = level;
        self
    }
}
