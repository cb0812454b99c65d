//! Interpolation engine - the single source of truth for "where is this
//! entity right now".
//!
//! Both renderer backends consume rendered state produced here; neither
//! carries its own blending math, so visual motion can never diverge
//! between them. All advancement is time-based: the math is independent of
//! the host's frame rate.

use crate::config::EngineConfig;
use crate::store::{Entity, EntityPhase};
use std::f64::consts::{PI, TAU};
use std::time::Duration;

/// Sine ease-in-out over [0, 1].
pub fn ease_in_out_sine(t: f64) -> f64 {
    0.5 * (1.0 - (PI * t).cos())
}

/// Normalizes an angle difference into (-PI, PI] so rotation always takes
/// the shorter arc.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle % TAU;
    if a <= -PI {
        a += TAU;
    } else if a > PI {
        a -= TAU;
    }
    a
}

/// Stateless advancement of entity rendered fields toward their targets.
///
/// Per-entity state lives in the [`Entity`] itself; the interpolator only
/// carries tuning constants.
#[derive(Debug, Clone)]
pub struct Interpolator {
    /// Expected seconds between snapshot arrivals (poll interval + slack)
    expected_interval: f64,
    /// Optional per-second gain of the micro-smoothing pass
    micro_smoothing: Option<f64>,
    /// Per-second rate of the damped scale/opacity approach
    approach_rate: f64,
    /// Fraction of the remaining angle difference applied per tick
    rotation_gain: f64,
    /// Angle differences below this snap directly (radians)
    angle_snap: f64,
}

impl Interpolator {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            expected_interval: config.expected_interval(),
            micro_smoothing: config.micro_smoothing,
            approach_rate: config.approach_rate,
            rotation_gain: config.rotation_gain,
            angle_snap: config.angle_snap,
        }
    }

    /// Advances one entity's rendered fields by one tick.
    ///
    /// `now` is the engine clock; `dt` the time since the previous tick.
    pub fn advance(&self, entity: &mut Entity, now: Duration, dt: Duration) {
        let dt = dt.as_secs_f64();

        // Progress is a pure function of elapsed time since the last
        // target update, so it is monotonic between updates and saturates
        // at 1.
        let elapsed = now.saturating_sub(entity.last_update).as_secs_f64();
        entity.progress = (elapsed / self.expected_interval).min(1.0);

        let eased = ease_in_out_sine(entity.progress);
        let blended = entity.prev_pos + (entity.target_pos - entity.prev_pos) * eased;

        entity.curr_pos = match self.micro_smoothing {
            // Second pass: exponential approach toward the eased point,
            // soaking up the residual jolt of snapshot arrival
            Some(gain) => {
                let k = 1.0 - (-gain * dt).exp();
                entity.curr_pos + (blended - entity.curr_pos) * k
            }
            None => blended,
        };

        // Critically-damped approach for scale/opacity: converges without
        // overshoot for both the spawn 0->1 ramp and the despawn ->0 decay.
        let k = 1.0 - (-self.approach_rate * dt).exp();
        entity.scale += (entity.target_scale - entity.scale) * k;
        entity.opacity += (entity.target_opacity - entity.opacity) * k;

        // Shortest-arc heading
        let diff = normalize_angle(entity.target_angle - entity.angle);
        if diff.abs() < self.angle_snap {
            entity.angle = entity.target_angle;
        } else {
            entity.angle = normalize_angle(entity.angle + diff * self.rotation_gain);
        }

        if entity.phase == EntityPhase::Spawning && entity.opacity > 0.95 {
            entity.phase = EntityPhase::Active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::VehicleRecord;
    use crate::store::EntityStore;
    use approx::assert_relative_eq;

    fn record(id: &str, lon: f64, lat: f64) -> VehicleRecord {
        VehicleRecord {
            id: id.to_string(),
            lon,
            lat,
            is_ev: false,
            battery_percent: 100.0,
            is_charging: false,
            is_queued: false,
            is_stranded: false,
            is_circling: false,
            assigned_station: None,
            v2g_active: false,
        }
    }

    fn interp() -> Interpolator {
        Interpolator::from_config(&EngineConfig::default())
    }

    fn t(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_ease_endpoints() {
        assert_relative_eq!(ease_in_out_sine(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(ease_in_out_sine(0.5), 0.5, epsilon = 1e-12);
        assert_relative_eq!(ease_in_out_sine(1.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_angle_range() {
        assert_relative_eq!(normalize_angle(0.0), 0.0);
        assert_relative_eq!(normalize_angle(3.0 * PI), PI, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(-PI), PI, epsilon = 1e-12);
        assert_relative_eq!(normalize_angle(PI + 0.1), -PI + 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_progress_monotonic_and_saturating() {
        let mut store = EntityStore::with_defaults();
        store.apply_snapshot(&[record("v1", 13.4, 52.5)], t(0));
        store.apply_snapshot(&[record("v1", 13.5, 52.5)], t(150));

        let interp = interp();
        let mut entity = store.get("v1").unwrap().clone();

        let mut last_progress = 0.0;
        for tick in 1..=60 {
            let now = t(150 + tick * 16);
            interp.advance(&mut entity, now, t(16));
            assert!(
                entity.progress >= last_progress,
                "progress regressed at tick {}",
                tick
            );
            assert!(entity.progress <= 1.0);
            last_progress = entity.progress;
        }
        assert_relative_eq!(entity.progress, 1.0);
    }

    #[test]
    fn test_heading_reversal_takes_shorter_arc() {
        let mut store = EntityStore::with_defaults();
        store.apply_snapshot(&[record("v1", 13.4, 52.5)], t(0));

        let interp = interp();
        let mut entity = store.get("v1").unwrap().clone();

        // +350 degrees of target means -10 degrees of actual rotation
        entity.angle = 0.0;
        entity.target_angle = 350.0_f64.to_radians();

        interp.advance(&mut entity, t(16), t(16));
        assert!(
            entity.angle < 0.0,
            "rotated the long way around: {}",
            entity.angle
        );
        assert!(entity.angle > (-15.0_f64).to_radians());
    }

    #[test]
    fn test_heading_reversal_settles_within_a_handful_of_ticks() {
        let mut store = EntityStore::with_defaults();
        store.apply_snapshot(&[record("v1", 13.4, 52.5)], t(0));

        let interp = interp();
        let mut entity = store.get("v1").unwrap().clone();
        entity.target_angle = PI * 0.99; // near-full reversal

        for tick in 1..=20 {
            interp.advance(&mut entity, t(tick * 16), t(16));
        }
        assert_relative_eq!(entity.angle, entity.target_angle, epsilon = 1e-9);
    }

    #[test]
    fn test_opacity_approach_never_overshoots() {
        let mut store = EntityStore::with_defaults();
        store.apply_snapshot(&[record("v1", 13.4, 52.5)], t(0));

        let interp = interp();
        let mut entity = store.get("v1").unwrap().clone();

        for tick in 1..=120 {
            interp.advance(&mut entity, t(tick * 16), t(16));
            assert!(entity.opacity <= 1.0 + 1e-12);
            assert!(entity.scale <= 1.0 + 1e-12);
        }
        assert!(entity.opacity > 0.99);
    }

    #[test]
    fn test_position_approaches_target_monotonically() {
        let mut store = EntityStore::with_defaults();
        store.apply_snapshot(&[record("v1", 13.40, 52.5)], t(0));
        store.apply_snapshot(&[record("v1", 13.41, 52.5)], t(500));

        let interp = interp();
        let mut entity = store.get("v1").unwrap().clone();
        let start = entity.prev_pos;
        let target = entity.target_pos;

        let mut last_distance = (target - entity.curr_pos).norm();
        for tick in 1..=3 {
            let now = t(500 + tick * 16);
            interp.advance(&mut entity, now, t(16));

            let d = (target - entity.curr_pos).norm();
            assert!(d < last_distance, "not approaching target at tick {}", tick);
            last_distance = d;

            // Strictly between the endpoints
            assert!(entity.curr_pos.x > start.x);
            assert!(entity.curr_pos.x < target.x);
        }
    }

    #[test]
    fn test_spawn_phase_promotes_to_active() {
        let mut store = EntityStore::with_defaults();
        store.apply_snapshot(&[record("v1", 13.4, 52.5)], t(0));

        let interp = interp();
        let mut entity = store.get("v1").unwrap().clone();
        assert_eq!(entity.phase, EntityPhase::Spawning);

        for tick in 1..=60 {
            interp.advance(&mut entity, t(tick * 16), t(16));
        }
        assert_eq!(entity.phase, EntityPhase::Active);
    }
}
