//! FleetView Deterministic Simulation Testing (DST) harness.
//!
//! Drives the visualization engine against a synthetic ground-truth fleet
//! on a virtual clock. Every run is a pure function of its seed: the
//! oracle's physics, the drive timing (poll jitter, dropped polls) and the
//! engine itself contain no other entropy, so any failing seed reproduces
//! exactly.
//!
//! # Components
//!
//! - [`SimEnv`]: virtual-clock implementation of `fleetview_env::FleetEnv`
//! - [`FleetOracle`]: ground truth vehicle fleet playing the backend
//!   telemetry endpoint
//! - [`ScenarioRunner`]: interleaves polls and animation ticks, checking
//!   the engine's interpolation/lifecycle invariants after every tick
//! - [`SimExport`]: JSON frame dump for offline inspection

pub mod context;
pub mod exporter;
pub mod fleet;
pub mod runner;
pub mod scenarios;

pub use context::SimEnv;
pub use exporter::{RenderedEntity, SimExport, SimFrame, TruthPosition};
pub use fleet::{FleetOracle, SimVehicle, VehicleMode};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
