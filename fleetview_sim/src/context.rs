//! Simulation environment implementing FleetEnv for deterministic testing.

use async_trait::async_trait;
use fleetview_env::FleetEnv;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Simulation environment backed by a manually advanced virtual clock.
///
/// This implements `FleetEnv` using:
/// - A virtual clock that the scenario runner advances tick by tick
/// - Simulated sleep that advances virtual time instead of waiting
pub struct SimEnv {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,
}

impl SimEnv {
    /// Creates a new SimEnv with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
        }
    }

    /// Creates an Arc-wrapped environment for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time += duration.as_nanos() as u64;
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time = time_ns;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap()
    }
}

impl Clone for SimEnv {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
        }
    }
}

#[async_trait]
impl FleetEnv for SimEnv {
    fn now(&self) -> Duration {
        Duration::from_nanos(*self.virtual_time_ns.lock().unwrap())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        // In simulation, sleep advances virtual time
        self.advance_time(duration);
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let _name = name.to_string();
        tokio::spawn(async move {
            future.await;
        });
    }

    fn seed(&self) -> u64 {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_env_time() {
        let env = SimEnv::new(42);
        assert_eq!(env.now(), Duration::ZERO);

        env.advance_time(Duration::from_secs(1));
        assert_eq!(env.now(), Duration::from_secs(1));

        env.advance_time(Duration::from_millis(500));
        assert_eq!(env.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_sim_env_seed() {
        let env = SimEnv::new(12345);
        assert_eq!(env.seed(), 12345);
    }

    #[test]
    fn test_sim_env_clone_shares_time() {
        let env1 = SimEnv::new(42);
        let env2 = env1.clone();

        env1.advance_time(Duration::from_secs(5));

        // Both should see the same time
        assert_eq!(env1.now(), env2.now());
    }
}
