//! Entity store - per-vehicle interpolation state and lifecycle.
//!
//! The store is the only state shared between the poll side and the render
//! side. Snapshot application mutates target/raw fields; the interpolation
//! engine mutates rendered fields; both read everything. Lifecycle per
//! entity:
//!
//! ```text
//! UNSEEN -> SPAWNING (0->1 fade) -> ACTIVE -> DESPAWNING (->0) -> REMOVED
//! ```
//!
//! ACTIVE re-enters itself on every new snapshot (progress resets);
//! DESPAWNING returns to ACTIVE if the id reappears before removal.
//!
//! Given an identical snapshot sequence and elapsed time, store state is a
//! pure function of its inputs: no clock reads, no randomness.

use crate::snapshot::{VehicleRecord, VehicleStatus};
use crate::space;
use nalgebra::Vector2;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Configuration for the EntityStore
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Movement below this distance (world units) does not reset
    /// interpolation
    pub noise_threshold: f64,

    /// Rendered opacity below which a despawning entity is purged
    pub fade_epsilon: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 2.5e-8,
            fade_epsilon: 0.02,
        }
    }
}

/// Lifecycle phase of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPhase {
    /// Fading in after first sighting
    Spawning,
    /// Steady interpolation against fresh snapshots
    Active,
    /// Absent from the latest snapshot, fading out
    Despawning,
}

/// The engine's internal tracked representation of one vehicle across time.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Stable pool slot, assigned at creation (drives deterministic
    /// ordering and element recycling in the backends)
    pub slot: u32,

    // === Position (Web-Mercator world units) ===
    /// Interpolation origin (where the last blend started)
    pub prev_pos: Vector2<f64>,
    /// Rendered/smoothed position
    pub curr_pos: Vector2<f64>,
    /// Latest known truth
    pub target_pos: Vector2<f64>,

    /// Engine-clock time of the last target update
    pub last_update: Duration,
    /// Normalized [0, 1] progress from prev toward target
    pub progress: f64,

    // === Heading (radians) ===
    pub angle: f64,
    pub target_angle: f64,

    // === Presentation ===
    pub scale: f64,
    pub target_scale: f64,
    pub opacity: f64,
    pub target_opacity: f64,

    /// Raw attributes from the latest sighting (classifier input)
    pub raw: VehicleStatus,

    /// Last reported WGS84 position (label layer truth)
    pub lonlat: [f64; 2],

    pub phase: EntityPhase,
}

impl Entity {
    /// Seeds a freshly sighted entity: previous = current = target, with
    /// opacity/scale ramping 0 -> 1 so it fades in instead of popping.
    fn seed(slot: u32, record: &VehicleRecord, now: Duration) -> Self {
        let pos = space::project(record.lon, record.lat);
        Self {
            slot,
            prev_pos: pos,
            curr_pos: pos,
            target_pos: pos,
            last_update: now,
            progress: 1.0,
            angle: 0.0,
            target_angle: 0.0,
            scale: 0.0,
            target_scale: 1.0,
            opacity: 0.0,
            target_opacity: 1.0,
            raw: record.status(),
            lonlat: [record.lon, record.lat],
            phase: EntityPhase::Spawning,
        }
    }
}

/// Per-id interpolation state for the whole fleet.
pub struct EntityStore {
    entities: HashMap<String, Entity>,
    config: StoreConfig,

    /// Slots of purged entities, reused before minting new ones
    free_slots: Vec<u32>,
    next_slot: u32,

    /// Scratch set for presence checks, reused across snapshots
    seen: HashSet<String>,
}

impl EntityStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            entities: HashMap::new(),
            config,
            free_slots: Vec::new(),
            next_slot: 0,
            seen: HashSet::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(StoreConfig::default())
    }

    /// Applies one snapshot to the store.
    ///
    /// - unseen id: seeded with a spawn fade-in
    /// - tracked id, moved beyond the noise threshold: previous <- current,
    ///   new target, progress reset, heading recomputed from the movement
    ///   vector
    /// - tracked id, within the noise threshold: untouched (idempotence)
    /// - tracked id missing from the snapshot: fade-out begins, entity kept
    pub fn apply_snapshot(&mut self, records: &[VehicleRecord], now: Duration) {
        self.seen.clear();

        for record in records {
            if !record.is_valid() {
                continue;
            }
            if !self.seen.insert(record.id.clone()) {
                // Duplicate id inside one snapshot: first sighting wins
                continue;
            }

            match self.entities.entry(record.id.clone()) {
                Entry::Vacant(vacant) => {
                    let slot = match self.free_slots.pop() {
                        Some(slot) => slot,
                        None => {
                            let slot = self.next_slot;
                            self.next_slot += 1;
                            slot
                        }
                    };
                    vacant.insert(Entity::seed(slot, record, now));
                }
                Entry::Occupied(mut occupied) => {
                    let entity = occupied.get_mut();
                    let pos = space::project(record.lon, record.lat);
                    let delta = pos - entity.target_pos;

                    if delta.norm() > self.config.noise_threshold {
                        entity.prev_pos = entity.curr_pos;
                        entity.target_pos = pos;
                        entity.progress = 0.0;
                        entity.last_update = now;
                        entity.target_angle = space::heading(&entity.prev_pos, &pos);
                    }

                    entity.raw = record.status();
                    entity.lonlat = [record.lon, record.lat];

                    if entity.phase == EntityPhase::Despawning {
                        // Reappeared before removal: restore targets
                        entity.phase = EntityPhase::Active;
                        entity.target_opacity = 1.0;
                        entity.target_scale = 1.0;
                    }
                }
            }
        }

        // Tracked ids absent from this snapshot begin their fade-out
        for (id, entity) in self.entities.iter_mut() {
            if !self.seen.contains(id) && entity.phase != EntityPhase::Despawning {
                entity.phase = EntityPhase::Despawning;
                entity.target_opacity = 0.0;
                entity.target_scale = 0.0;
            }
        }
    }

    /// Removes entities that finished fading out and are still absent from
    /// the latest snapshot. Run once per tick, after rendering.
    pub fn purge(&mut self) {
        let epsilon = self.config.fade_epsilon;
        let free_slots = &mut self.free_slots;
        self.entities.retain(|_, entity| {
            let done = entity.phase == EntityPhase::Despawning && entity.opacity < epsilon;
            if done {
                free_slots.push(entity.slot);
            }
            !done
        });
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entity)> {
        self.entities.iter()
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.values_mut()
    }
}
