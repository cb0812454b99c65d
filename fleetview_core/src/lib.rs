//! FleetView Core - Real-Time Fleet Visualization Engine
//!
//! This library turns a low-frequency stream of vehicle telemetry
//! (polled every 120-200 ms) into smooth, high-frame-rate animated motion
//! of point-entities on an interactive map surface:
//! 1. **Sparse Snapshots Problem**: continuous motion manufactured from
//!    irregular snapshots via eased, time-based interpolation
//! 2. **Popping Problem**: spawn/despawn lifecycles resolved as fades,
//!    never as visual pops
//! 3. **Scale Problem**: one GPU draw call per frame plus deterministic
//!    decimation as fleets grow into the thousands

pub mod classify;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod gpu_layer;
pub mod interp;
pub mod labels;
pub mod render;
pub mod retained;
pub mod snapshot;
pub mod space;
pub mod store;
pub mod telemetry_zmq;

// Re-export key types for convenience
pub use config::{BackendKind, EngineConfig};
pub use engine::FleetEngine;
pub use fetcher::{SnapshotFetcher, TelemetryError, TelemetrySource};
pub use render::{EntitySprite, GpuFrame, RenderBackend, RenderError};
pub use snapshot::VehicleRecord;
pub use store::{Entity, EntityPhase, EntityStore};
