//! Core environment trait for the FleetView loops.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the poll and animation
/// loops can run in both production (tokio) and simulation (virtual clock)
/// environments.
///
/// # Implementations
///
/// - **Production**: `TokioEnv` - wraps `tokio::time`
/// - **Simulation**: `SimEnv` (in `fleetview_sim`) - manually advanced clock
///
/// # Determinism
///
/// All methods that would normally introduce non-determinism (time,
/// scheduling) are controlled by the implementation.
#[async_trait]
pub trait FleetEnv: Send + Sync + 'static {
    /// Returns the current monotonic time since environment creation.
    ///
    /// This is the clock the interpolation engine runs on. In simulation,
    /// this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time for telemetry timestamps.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task (the poll loop, primarily).
    ///
    /// In production: `tokio::spawn`
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the environment's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
