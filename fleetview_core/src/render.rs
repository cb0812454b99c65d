//! Renderer backend seam.
//!
//! The engine extracts interpolated per-entity draw state into
//! [`EntitySprite`]s once per frame; a backend only materializes those
//! sprites. Keeping extraction here (and blending in [`crate::interp`])
//! means the GPU and retained paths cannot drift apart visually.

use crate::classify;
use crate::store::EntityStore;
use thiserror::Error;

/// Interpolated draw state for one entity, shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySprite {
    /// Stable pool slot (element recycling, deterministic ordering)
    pub slot: u32,
    /// Web-Mercator world position
    pub world: [f32; 2],
    /// Heading, radians
    pub angle: f32,
    pub scale: f32,
    pub opacity: f32,
    /// Classifier color
    pub rgba: [u8; 4],
}

/// The per-repaint GPU frame handed in by the host map engine.
pub struct GpuFrame<'a, 'pass> {
    pub queue: &'a wgpu::Queue,
    pub pass: &'a mut wgpu::RenderPass<'pass>,
    /// The host's world-to-clip matrix for this frame
    pub view_proj: [[f32; 4]; 4],
    /// Viewport size in physical pixels
    pub viewport_px: [f32; 2],
}

/// Errors from renderer backends.
#[derive(Debug, Error)]
pub enum RenderError {
    /// WGSL compilation or pipeline creation failed. Fatal to the GPU
    /// backend; the host must select the retained backend instead.
    #[error("Pipeline creation failed: {0}")]
    Pipeline(String),

    /// The backend requires a GPU frame but the host repaint provided none
    #[error("No GPU frame available for this repaint")]
    FrameUnavailable,
}

/// A renderer backend: materializes sprites onto the map surface.
///
/// Backends are swappable at runtime by replacing the boxed reference;
/// in-flight draw state of the previous backend is discarded, not awaited.
pub trait RenderBackend: Send {
    /// Draws one frame. `gpu` is `Some` when the host repaint carries a
    /// GPU frame; the retained backend ignores it.
    fn draw(
        &mut self,
        sprites: &[EntitySprite],
        gpu: Option<GpuFrame<'_, '_>>,
    ) -> Result<(), RenderError>;

    fn name(&self) -> &'static str;
}

/// Extracts sprites for every live entity, reusing `out`.
///
/// Sprites are ordered by slot so that downstream truncation (GPU pool,
/// decimation) is deterministic regardless of hash-map iteration order.
pub fn collect_sprites(store: &EntityStore, out: &mut Vec<EntitySprite>) {
    out.clear();
    for (_, entity) in store.iter() {
        out.push(EntitySprite {
            slot: entity.slot,
            world: [entity.curr_pos.x as f32, entity.curr_pos.y as f32],
            angle: entity.angle as f32,
            scale: entity.scale as f32,
            opacity: entity.opacity.clamp(0.0, 1.0) as f32,
            rgba: classify::classify(&entity.raw).rgba(),
        });
    }
    out.sort_unstable_by_key(|sprite| sprite.slot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::VehicleRecord;
    use std::time::Duration;

    fn record(id: &str, lon: f64) -> VehicleRecord {
        VehicleRecord {
            id: id.to_string(),
            lon,
            lat: 52.5,
            is_ev: true,
            battery_percent: 80.0,
            is_charging: false,
            is_queued: false,
            is_stranded: false,
            is_circling: false,
            assigned_station: None,
            v2g_active: false,
        }
    }

    #[test]
    fn test_collect_sprites_is_slot_ordered() {
        let mut store = EntityStore::with_defaults();
        let records: Vec<VehicleRecord> = (0..50)
            .map(|i| record(&format!("v{}", i), 13.0 + i as f64 * 0.001))
            .collect();
        store.apply_snapshot(&records, Duration::ZERO);

        let mut sprites = Vec::new();
        collect_sprites(&store, &mut sprites);

        assert_eq!(sprites.len(), 50);
        for pair in sprites.windows(2) {
            assert!(pair[0].slot < pair[1].slot);
        }
    }

    #[test]
    fn test_collect_sprites_reuses_buffer() {
        let mut store = EntityStore::with_defaults();
        store.apply_snapshot(&[record("v1", 13.4)], Duration::ZERO);

        let mut sprites = Vec::with_capacity(8);
        collect_sprites(&store, &mut sprites);
        let cap = sprites.capacity();
        collect_sprites(&store, &mut sprites);
        assert_eq!(sprites.capacity(), cap);
    }
}
