//! Decimated label layer.
//!
//! A third, cheap representation of the fleet used for iconography and
//! hit-testing on the host's declarative point/label source. Above the
//! configured entity-count threshold the layer strides the fleet down to a
//! bounded feature count and rate-limits refreshes; below it, every tick
//! refreshes at full fidelity. Features carry the raw reported position,
//! not the interpolated one.

use crate::classify;
use crate::config::EngineConfig;
use crate::store::EntityStore;
use std::time::Duration;

/// One point feature pushed to the host's label source.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelFeature {
    pub id: String,
    pub lon: f64,
    pub lat: f64,
    pub rgba: [u8; 4],
}

/// The host map engine's declarative point/label data source.
pub trait LabelSink: Send {
    /// Replaces the source's feature set wholesale.
    fn set_data(&mut self, features: &[LabelFeature]);
}

/// Strided, rate-limited label refresher.
pub struct DecimatedLabels {
    threshold: usize,
    refresh_interval: Duration,
    last_refresh: Option<Duration>,
    features: Vec<LabelFeature>,
}

impl DecimatedLabels {
    pub fn new(threshold: usize, refresh_interval: Duration) -> Self {
        Self {
            threshold,
            refresh_interval,
            last_refresh: None,
            features: Vec::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.label_threshold, config.label_refresh)
    }

    /// Refreshes the sink from the store, decimating above the threshold.
    pub fn refresh(&mut self, store: &EntityStore, now: Duration, sink: &mut dyn LabelSink) {
        let total = store.len();
        let decimating = total > self.threshold;

        if decimating {
            if let Some(last) = self.last_refresh {
                if now.saturating_sub(last) < self.refresh_interval {
                    return;
                }
            }
        }

        // Slot order makes the stride selection stable across refreshes
        let mut entries: Vec<_> = store.iter().collect();
        entries.sort_unstable_by_key(|(_, entity)| entity.slot);

        let stride = if decimating {
            total.div_ceil(self.threshold)
        } else {
            1
        };

        self.features.clear();
        for (id, entity) in entries.into_iter().step_by(stride) {
            self.features.push(LabelFeature {
                id: id.clone(),
                lon: entity.lonlat[0],
                lat: entity.lonlat[1],
                rgba: classify::classify(&entity.raw).rgba(),
            });
        }

        sink.set_data(&self.features);
        self.last_refresh = Some(now);
    }
}
