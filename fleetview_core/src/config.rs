//! Engine configuration.
//!
//! All values are static for the lifetime of the engine: backend selection
//! and tuning constants are a startup decision, not runtime-reconfigurable
//! state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which renderer backend the engine drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Custom-shader batch rendering through the host map engine
    Gpu,
    /// One recycled visual element per entity (small fleets, no GPU)
    Retained,
}

/// Configuration for the FleetView engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Renderer backend, chosen at startup (no automatic failover)
    pub backend: BackendKind,

    /// Telemetry poll interval (default: 150ms)
    pub poll_interval: Duration,

    /// Expected-interval slack absorbing network jitter:
    /// expected = poll_interval * slack (default: 1.15)
    pub interval_slack: f64,

    /// Movement below this distance (world units) is treated as noise and
    /// does not reset interpolation (default: 2.5e-8, roughly 1m)
    pub noise_threshold: f64,

    /// Per-second gain of the secondary exponential micro-smoothing pass;
    /// `None` renders the eased position directly (default: 14.0)
    pub micro_smoothing: Option<f64>,

    /// Per-second rate of the critically-damped scale/opacity approach
    /// (default: 9.0)
    pub approach_rate: f64,

    /// Fraction of the remaining angle difference applied per tick
    /// (default: 0.25, a full reversal settles within a handful of ticks)
    pub rotation_gain: f64,

    /// Angle differences below this snap directly, radians (default: 0.02)
    pub angle_snap: f64,

    /// Entities fading out are purged once opacity drops below this
    /// (default: 0.02)
    pub fade_epsilon: f64,

    /// Maximum entities the GPU backend draws per frame; the rest are
    /// dropped deterministically (default: 4096)
    pub gpu_pool_size: usize,

    /// Sprite quad edge length in screen pixels at scale 1 (default: 16)
    pub quad_size_px: f32,

    /// Rounded-rectangle corner radius in half-quad units (default: 0.4)
    pub corner_radius: f32,

    /// Border thickness in half-quad units (default: 0.18)
    pub border_width: f32,

    /// Entity count above which the label layer decimates (default: 200)
    pub label_threshold: usize,

    /// Label refresh interval while decimating (default: 1s)
    pub label_refresh: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gpu,
            poll_interval: Duration::from_millis(150),
            interval_slack: 1.15,
            noise_threshold: 2.5e-8,
            micro_smoothing: Some(14.0),
            approach_rate: 9.0,
            rotation_gain: 0.25,
            angle_snap: 0.02,
            fade_epsilon: 0.02,
            gpu_pool_size: 4096,
            quad_size_px: 16.0,
            corner_radius: 0.4,
            border_width: 0.18,
            label_threshold: 200,
            label_refresh: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Expected time between snapshot arrivals, with jitter slack applied.
    pub fn expected_interval(&self) -> f64 {
        self.poll_interval.as_secs_f64() * self.interval_slack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_interval_applies_slack() {
        let config = EngineConfig {
            poll_interval: Duration::from_millis(200),
            interval_slack: 1.2,
            ..Default::default()
        };
        assert!((config.expected_interval() - 0.24).abs() < 1e-12);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.backend, BackendKind::Gpu);
        assert_eq!(back.gpu_pool_size, config.gpu_pool_size);
    }
}
