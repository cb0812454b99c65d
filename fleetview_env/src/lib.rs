//! FleetView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the FleetView
//! engine to run in both **Production** (tokio) and **Simulation**
//! (virtual clock) environments.
//!
//! # Core Concept
//!
//! The engine runs two cooperating loops: a slow telemetry poll loop and a
//! fast per-frame animation loop. For Deterministic Simulation Testing
//! (DST), we intercept the two things those loops touch:
//! - Time (`now()`, `sleep()`)
//! - Task scheduling (`spawn()`)
//!
//! With time virtualized, any jitter/ordering bug becomes reproducible via
//! its seed number.
//!
//! # Example
//!
//! ```ignore
//! use fleetview_env::FleetEnv;
//!
//! async fn poll_loop<E: FleetEnv>(env: &E) {
//!     loop {
//!         fetch_and_publish().await;
//!         env.sleep(Duration::from_millis(150)).await;
//!     }
//! }
//! ```

mod context;
mod tokio_impl;

pub use context::FleetEnv;
pub use tokio_impl::TokioEnv;
