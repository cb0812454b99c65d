//! Production implementation of FleetEnv using Tokio.

use crate::FleetEnv;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Production environment backed by Tokio.
///
/// This is the "real" implementation used in deployments. Time comes from
/// the system clock; tasks land on the host's tokio runtime.
pub struct TokioEnv {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioEnv {
    /// Creates a new TokioEnv.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Creates an Arc-wrapped environment for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FleetEnv for TokioEnv {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let _name = name.to_string(); // Would be used for tracing
        tokio::spawn(async move {
            future.await;
        });
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_env_time() {
        let env = TokioEnv::new();
        let t1 = env.now();
        env.sleep(Duration::from_millis(10)).await;
        let t2 = env.now();

        assert!(t2 > t1);
        assert!(t2 - t1 >= Duration::from_millis(10));
    }

    #[test]
    fn test_tokio_env_seed() {
        let env = TokioEnv::new();
        assert_eq!(env.seed(), 0);
    }
}
