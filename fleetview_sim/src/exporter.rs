//! JSON exporter for offline frame inspection.
//!
//! Dumps ground truth and rendered entity state per frame so a scenario
//! run can be replayed and eyeballed outside the harness.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// Ground-truth position of one vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruthPosition {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
}

/// Rendered state of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedEntity {
    pub id: String,
    /// Web-Mercator world position
    pub x: f64,
    pub y: f64,
    pub opacity: f64,
    pub progress: f64,
}

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    /// Ground truth vehicle positions
    pub truth: Vec<TruthPosition>,

    /// Engine rendered state
    pub rendered: Vec<RenderedEntity>,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final result
    pub passed: bool,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool) {
        self.passed = passed;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
