//! Rate provider boundary with a last-known-good cached fallback.
//!
//! The ledger core itself never fetches rates; it only ever receives an
//! already-resolved [`RateTable`]. This module is the caller-side plumbing
//! that produces those tables.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use tally_common::RateTable;

use crate::error::FxResult;

/// Source of exchange-rate tables (units-per-EUR).
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Produce a fresh rate table from the live source.
    fn fetch_rates(&self) -> FxResult<RateTable>;
}

/// Configuration for rate refreshing.
#[derive(Debug, Clone)]
pub struct RateRefreshConfig {
    /// How long a fetched table stays fresh before a refresh is attempted.
    pub refresh_interval: Duration,
}

impl Default for RateRefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::hours(24),
        }
    }
}

struct CachedRates {
    table: RateTable,
    fetched_at: DateTime<Utc>,
}

/// Wraps a [`RateProvider`] with refresh-at-most and last-known-good
/// fallback semantics.
pub struct CachedRateProvider {
    inner: Arc<dyn RateProvider>,
    config: RateRefreshConfig,
    last_good: RwLock<Option<CachedRates>>,
}

impl CachedRateProvider {
    /// Create with the default 24h refresh interval.
    pub fn new(inner: Arc<dyn RateProvider>) -> Self {
        Self::with_config(inner, RateRefreshConfig::default())
    }

    /// Create with a custom refresh configuration.
    pub fn with_config(inner: Arc<dyn RateProvider>, config: RateRefreshConfig) -> Self {
        Self {
            inner,
            config,
            last_good: RwLock::new(None),
        }
    }

    /// Get the current rate table.
    ///
    /// Returns the cached table while fresh; refreshes from the live
    /// source when stale; falls back to the last-known-good table when
    /// the live source is unreachable. Errors only when no table has
    /// ever been fetched.
    pub fn rates(&self) -> FxResult<RateTable> {
        if let Some(cached) = self.last_good.read().as_ref() {
            if Utc::now().signed_duration_since(cached.fetched_at) < self.config.refresh_interval {
                debug!(provider = self.inner.name(), "Using cached rates");
                return Ok(cached.table.clone());
            }
        }

        match self.inner.fetch_rates() {
            Ok(table) => {
                debug!(
                    provider = self.inner.name(),
                    currencies = table.len(),
                    "Refreshed rates"
                );
                *self.last_good.write() = Some(CachedRates {
                    table: table.clone(),
                    fetched_at: Utc::now(),
                });
                Ok(table)
            }
            Err(e) => {
                let guard = self.last_good.read();
                match guard.as_ref() {
                    Some(cached) => {
                        warn!(
                            provider = self.inner.name(),
                            error = %e,
                            "Rate refresh failed, serving last known good table"
                        );
                        Ok(cached.table.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }
}

/// Fixed-table provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct StaticRateProvider {
    name: String,
    table: RwLock<RateTable>,
    failure: RwLock<Option<String>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl StaticRateProvider {
    /// Create a provider serving the given table.
    pub fn new(name: impl Into<String>, table: RateTable) -> Self {
        Self {
            name: name.into(),
            table: RwLock::new(table),
            failure: RwLock::new(None),
        }
    }

    /// Replace the served table.
    pub fn set_table(&self, table: RateTable) {
        *self.table.write() = table;
    }

    /// Make every subsequent fetch fail with the given message.
    pub fn set_failing(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    /// Clear an injected failure.
    pub fn clear_failure(&self) {
        *self.failure.write() = None;
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl RateProvider for StaticRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_rates(&self) -> FxResult<RateTable> {
        if let Some(message) = self.failure.read().as_ref() {
            return Err(crate::error::FxError::Provider(message.clone()));
        }
        Ok(self.table.read().clone())
    }
}
