//! Ground truth fleet oracle.
//!
//! The oracle plays the backend telemetry endpoint: it maintains the true
//! state of a synthetic vehicle fleet (kinematics, battery, charging
//! lifecycle) and emits the snapshot the engine would poll. All randomness
//! comes from a seeded ChaCha8 RNG over a sorted vehicle map, so a given
//! seed always produces the same snapshot sequence.

use fleetview_core::VehicleRecord;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

/// Meters per degree of latitude (and of longitude at the equator).
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Driving/charging mode of a simulated vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleMode {
    /// Normal driving
    Cruising,
    /// Low battery, circling for a charging spot
    Circling,
    /// Waiting in line at a station
    Queued,
    /// Plugged in, battery rising
    Charging,
    /// Plugged in, feeding the grid (V2G)
    Discharging,
    /// Battery empty, immobile
    Stranded,
}

/// One ground-truth vehicle.
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub id: u64,
    pub lon: f64,
    pub lat: f64,
    /// Heading in radians, 0 = east
    pub heading: f64,
    pub speed_mps: f64,
    pub is_ev: bool,
    /// State of charge [0, 100]
    pub battery: f64,
    pub mode: VehicleMode,
    pub station: Option<u32>,
    pub active: bool,
}

/// The oracle - maintains ground truth and emits snapshots.
pub struct FleetOracle {
    rng: ChaCha8Rng,

    /// Sorted by id so RNG consumption order is deterministic
    vehicles: BTreeMap<u64, SimVehicle>,

    next_id: u64,
    current_time: f64,

    heading_drift: Normal<f64>,
}

impl FleetOracle {
    /// Creates a new oracle with the given physics seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            vehicles: BTreeMap::new(),
            next_id: 0,
            current_time: 0.0,
            heading_drift: Normal::new(0.0, 0.35).expect("constant std dev is valid"),
        }
    }

    /// Spawns one vehicle and returns its id.
    pub fn spawn_vehicle(&mut self, lon: f64, lat: f64, is_ev: bool) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        let vehicle = SimVehicle {
            id,
            lon,
            lat,
            heading: self.rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
            speed_mps: self.rng.gen_range(6.0..18.0),
            is_ev,
            battery: if is_ev {
                self.rng.gen_range(30.0..100.0)
            } else {
                100.0
            },
            mode: VehicleMode::Cruising,
            station: None,
            active: true,
        };
        self.vehicles.insert(id, vehicle);

        id
    }

    /// Spawns `count` vehicles scattered around a center point.
    pub fn spawn_fleet(&mut self, count: usize, center: (f64, f64), ev_share: f64) {
        for _ in 0..count {
            let lon = center.0 + self.rng.gen_range(-0.02..0.02);
            let lat = center.1 + self.rng.gen_range(-0.02..0.02);
            let is_ev = self.rng.gen_bool(ev_share.clamp(0.0, 1.0));
            self.spawn_vehicle(lon, lat, is_ev);
        }
    }

    /// Marks a vehicle as gone (it disappears from future snapshots).
    pub fn remove_vehicle(&mut self, id: u64) {
        if let Some(vehicle) = self.vehicles.get_mut(&id) {
            vehicle.active = false;
        }
    }

    /// Removes `count` vehicles, highest ids first.
    pub fn remove_newest(&mut self, count: usize) {
        let ids: Vec<u64> = self
            .vehicles
            .values()
            .rev()
            .filter(|v| v.active)
            .take(count)
            .map(|v| v.id)
            .collect();
        for id in ids {
            self.remove_vehicle(id);
        }
    }

    /// Advances the fleet by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;

        for vehicle in self.vehicles.values_mut() {
            if !vehicle.active {
                continue;
            }

            let moving = matches!(vehicle.mode, VehicleMode::Cruising | VehicleMode::Circling);
            if moving {
                vehicle.heading += self.heading_drift.sample(&mut self.rng) * dt;

                let step_m = vehicle.speed_mps * dt;
                let lat_rad = vehicle.lat.to_radians();
                vehicle.lon += vehicle.heading.cos() * step_m
                    / (METERS_PER_DEGREE * lat_rad.cos().max(0.01));
                vehicle.lat += vehicle.heading.sin() * step_m / METERS_PER_DEGREE;
            }

            if vehicle.is_ev {
                Self::step_battery(vehicle, dt, moving, &mut self.rng);
            }
        }
    }

    /// Battery drain/charge and the charging lifecycle transitions.
    fn step_battery(vehicle: &mut SimVehicle, dt: f64, moving: bool, rng: &mut ChaCha8Rng) {
        match vehicle.mode {
            VehicleMode::Charging => vehicle.battery += 4.0 * dt,
            VehicleMode::Discharging => vehicle.battery -= 1.0 * dt,
            _ if moving => vehicle.battery -= 0.25 * vehicle.speed_mps * dt * 0.1,
            _ => {}
        }
        vehicle.battery = vehicle.battery.clamp(0.0, 100.0);

        vehicle.mode = match vehicle.mode {
            VehicleMode::Cruising if vehicle.battery <= 0.0 => VehicleMode::Stranded,
            VehicleMode::Cruising if vehicle.battery < 20.0 => VehicleMode::Circling,
            VehicleMode::Circling if vehicle.battery <= 0.0 => VehicleMode::Stranded,
            VehicleMode::Circling if rng.gen_bool((0.4 * dt).clamp(0.0, 1.0)) => {
                vehicle.station = Some((vehicle.id % 7) as u32);
                VehicleMode::Queued
            }
            VehicleMode::Queued if rng.gen_bool((0.5 * dt).clamp(0.0, 1.0)) => {
                VehicleMode::Charging
            }
            VehicleMode::Charging if vehicle.battery >= 85.0 => {
                if rng.gen_bool(0.2) {
                    VehicleMode::Discharging
                } else {
                    vehicle.station = None;
                    VehicleMode::Cruising
                }
            }
            VehicleMode::Discharging if vehicle.battery <= 60.0 => {
                vehicle.station = None;
                VehicleMode::Cruising
            }
            mode => mode,
        };
    }

    /// Emits the snapshot a telemetry poll would return right now.
    pub fn snapshot(&self) -> Vec<VehicleRecord> {
        self.vehicles
            .values()
            .filter(|v| v.active)
            .map(|v| VehicleRecord {
                id: format!("v{}", v.id),
                lon: v.lon,
                lat: v.lat,
                is_ev: v.is_ev,
                battery_percent: v.battery,
                is_charging: v.mode == VehicleMode::Charging,
                is_queued: v.mode == VehicleMode::Queued,
                is_stranded: v.mode == VehicleMode::Stranded,
                is_circling: v.mode == VehicleMode::Circling,
                assigned_station: v.station.map(|s| format!("s{}", s)),
                v2g_active: v.mode == VehicleMode::Discharging,
            })
            .collect()
    }

    /// Returns the current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    /// Number of vehicles that would appear in a snapshot.
    pub fn active_count(&self) -> usize {
        self.vehicles.values().filter(|v| v.active).count()
    }

    pub fn vehicle(&self, id: u64) -> Option<&SimVehicle> {
        self.vehicles.get(&id)
    }

    /// Forces a vehicle into a mode (scenario choreography).
    pub fn force_mode(&mut self, id: u64, mode: VehicleMode) {
        if let Some(vehicle) = self.vehicles.get_mut(&id) {
            vehicle.mode = mode;
            if mode == VehicleMode::Stranded {
                vehicle.battery = 0.0;
            }
        }
    }
}
