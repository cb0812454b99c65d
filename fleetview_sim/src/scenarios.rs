//! Simulation scenarios for the DST harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// FV-001: nominal fleet, steady polling
    SteadyCruise,

    /// FV-002: vehicles appearing/disappearing every second
    SpawnChurn,

    /// FV-003: irregular poll timing plus dropped polls
    JitterStorm,

    /// FV-004: 1000 vehicles against a 200-feature label budget
    FlashFleet,

    /// FV-005: mass battery failures and V2G discharges
    StrandedWave,

    /// FV-006: 120Hz animation ticks against 120ms polling
    RapidFire,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyCruise,
            ScenarioId::SpawnChurn,
            ScenarioId::JitterStorm,
            ScenarioId::FlashFleet,
            ScenarioId::StrandedWave,
            ScenarioId::RapidFire,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyCruise => "steady_cruise",
            ScenarioId::SpawnChurn => "spawn_churn",
            ScenarioId::JitterStorm => "jitter_storm",
            ScenarioId::FlashFleet => "flash_fleet",
            ScenarioId::StrandedWave => "stranded_wave",
            ScenarioId::RapidFire => "rapid_fire",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyCruise => "Nominal 20-vehicle fleet, steady 150ms polling",
            ScenarioId::SpawnChurn => "Continuous spawn/despawn churn, fades must never pop",
            ScenarioId::JitterStorm => "60-400ms poll jitter with 20% dropped polls",
            ScenarioId::FlashFleet => "1000 vehicles, decimation capped at 200 features",
            ScenarioId::StrandedWave => "Mass stranding + V2G, classification priority visible",
            ScenarioId::RapidFire => "120Hz ticks against 120ms polls, motion must coast",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_cruise" | "steadycruise" | "fv-001" => Ok(ScenarioId::SteadyCruise),
            "spawn_churn" | "spawnchurn" | "fv-002" => Ok(ScenarioId::SpawnChurn),
            "jitter_storm" | "jitterstorm" | "fv-003" => Ok(ScenarioId::JitterStorm),
            "flash_fleet" | "flashfleet" | "fv-004" => Ok(ScenarioId::FlashFleet),
            "stranded_wave" | "strandedwave" | "fv-005" => Ok(ScenarioId::StrandedWave),
            "rapid_fire" | "rapidfire" | "fv-006" => Ok(ScenarioId::RapidFire),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
