//! Snapshot fetcher - coalesced polling of the telemetry endpoint.
//!
//! Exactly one request is ever in flight: `fetch_latest` takes `&mut self`,
//! so a second fetch cannot start while one is outstanding, and the
//! sequential poll loop naturally skips (coalesces) a poll that comes due
//! while the previous one is still pending. The minimum-interval check
//! guards against over-polling when a host drives `fetch_latest` directly
//! from its frame callback.
//!
//! Transport failures never reach the render path: they are logged and the
//! last good cache is served.

use crate::snapshot::{Fingerprint, VehicleRecord};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a telemetry source.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// The backend telemetry endpoint, as the engine sees it.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetches the current fleet report.
    async fn fetch(&self) -> Result<Vec<VehicleRecord>, TelemetryError>;
}

/// The fetcher's view of the latest known fleet.
#[derive(Debug, Clone, Default)]
pub struct CachedSnapshot {
    pub records: Vec<VehicleRecord>,
    pub fingerprint: Fingerprint,
    /// Engine-clock time of the last successful fetch
    pub fetched_at: Duration,
    /// The fingerprint differs from the previous successful fetch.
    /// Downstream work can be skipped when this is false.
    pub changed: bool,
}

/// Coalescing poller over a [`TelemetrySource`].
pub struct SnapshotFetcher {
    source: Arc<dyn TelemetrySource>,
    min_interval: Duration,
    cache: CachedSnapshot,
    last_attempt: Option<Duration>,
    has_fetched: bool,
}

impl SnapshotFetcher {
    pub fn new(source: Arc<dyn TelemetrySource>, min_interval: Duration) -> Self {
        Self {
            source,
            min_interval,
            cache: CachedSnapshot::default(),
            last_attempt: None,
            has_fetched: false,
        }
    }

    /// Returns the most recent snapshot, fetching only if the minimum poll
    /// interval has elapsed since the last attempt. On failure the cache is
    /// returned with `changed == false`.
    pub async fn fetch_latest(&mut self, now: Duration) -> &CachedSnapshot {
        if let Some(last) = self.last_attempt {
            if now.saturating_sub(last) < self.min_interval {
                self.cache.changed = false;
                return &self.cache;
            }
        }
        self.last_attempt = Some(now);

        match self.source.fetch().await {
            Ok(records) => {
                let fingerprint = Fingerprint::of(&records);
                let changed = !self.has_fetched || fingerprint != self.cache.fingerprint;
                self.has_fetched = true;
                self.cache = CachedSnapshot {
                    records,
                    fingerprint,
                    fetched_at: now,
                    changed,
                };
            }
            Err(error) => {
                tracing::warn!(%error, "telemetry poll failed, serving cached snapshot");
                self.cache.changed = false;
            }
        }

        &self.cache
    }

    /// The cached snapshot without attempting a fetch.
    pub fn cached(&self) -> &CachedSnapshot {
        &self.cache
    }
}
