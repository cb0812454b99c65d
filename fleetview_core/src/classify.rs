//! Color/state classification.
//!
//! Pure, priority-ordered mapping from raw vehicle attributes to a render
//! color. Both renderer backends and the label layer consume the same
//! classification, so visual state never diverges between them.

use crate::snapshot::VehicleStatus;
use serde::{Deserialize, Serialize};

/// Render color class for one vehicle. Ordered by display priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorClass {
    /// Actively discharging into the grid (V2G)
    Discharge,
    /// Out of charge, immobile
    Stranded,
    /// Plugged in and charging
    Charging,
    /// Waiting in line at a station
    Queued,
    /// Circling for a charging spot
    Circling,
    /// EV below the critical battery tier (< 20%)
    BatteryCritical,
    /// EV below the warning battery tier (< 50%)
    BatteryLow,
    /// EV with a healthy battery
    BatteryOk,
    /// Non-EV traffic
    Default,
}

/// Classifies raw attributes into a color class. First match wins:
/// discharge > stranded > charging > queued > circling > battery tier >
/// default.
pub fn classify(status: &VehicleStatus) -> ColorClass {
    if status.v2g_active {
        ColorClass::Discharge
    } else if status.is_stranded {
        ColorClass::Stranded
    } else if status.is_charging {
        ColorClass::Charging
    } else if status.is_queued {
        ColorClass::Queued
    } else if status.is_circling {
        ColorClass::Circling
    } else if status.is_ev {
        if status.battery_percent < 20.0 {
            ColorClass::BatteryCritical
        } else if status.battery_percent < 50.0 {
            ColorClass::BatteryLow
        } else {
            ColorClass::BatteryOk
        }
    } else {
        ColorClass::Default
    }
}

impl ColorClass {
    /// RGBA render color for this class.
    pub fn rgba(self) -> [u8; 4] {
        match self {
            ColorClass::Discharge => [64, 224, 208, 255],       // Turquoise
            ColorClass::Stranded => [192, 57, 43, 255],         // Dark red
            ColorClass::Charging => [52, 152, 219, 255],        // Blue
            ColorClass::Queued => [241, 196, 15, 255],          // Yellow
            ColorClass::Circling => [230, 126, 34, 255],        // Amber
            ColorClass::BatteryCritical => [231, 76, 60, 255],  // Red
            ColorClass::BatteryLow => [243, 156, 18, 255],      // Orange
            ColorClass::BatteryOk => [46, 204, 113, 255],       // Green
            ColorClass::Default => [149, 165, 166, 255],        // Gray
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(battery: f64) -> VehicleStatus {
        VehicleStatus {
            is_ev: true,
            battery_percent: battery,
            ..Default::default()
        }
    }

    #[test]
    fn test_discharge_beats_stranded() {
        let status = VehicleStatus {
            is_ev: true,
            is_stranded: true,
            v2g_active: true,
            battery_percent: 5.0,
            ..Default::default()
        };
        assert_eq!(classify(&status), ColorClass::Discharge);
    }

    #[test]
    fn test_stranded_beats_charging() {
        let status = VehicleStatus {
            is_ev: true,
            is_stranded: true,
            is_charging: true,
            ..Default::default()
        };
        assert_eq!(classify(&status), ColorClass::Stranded);
    }

    #[test]
    fn test_battery_tiers() {
        assert_eq!(classify(&ev(10.0)), ColorClass::BatteryCritical);
        assert_eq!(classify(&ev(19.9)), ColorClass::BatteryCritical);
        assert_eq!(classify(&ev(20.0)), ColorClass::BatteryLow);
        assert_eq!(classify(&ev(49.9)), ColorClass::BatteryLow);
        assert_eq!(classify(&ev(50.0)), ColorClass::BatteryOk);
        assert_eq!(classify(&ev(100.0)), ColorClass::BatteryOk);
    }

    #[test]
    fn test_plain_vehicle_is_default() {
        let status = VehicleStatus {
            battery_percent: 3.0, // battery tiers only apply to EVs
            ..Default::default()
        };
        assert_eq!(classify(&status), ColorClass::Default);
    }

    #[test]
    fn test_queued_beats_circling() {
        let status = VehicleStatus {
            is_ev: true,
            is_queued: true,
            is_circling: true,
            ..Default::default()
        };
        assert_eq!(classify(&status), ColorClass::Queued);
    }
}
