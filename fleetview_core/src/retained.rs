//! Retained-element renderer backend (fallback).
//!
//! One persistent visual element per entity, mutated in place each frame
//! and recycled through a free-list pool: a vanished entity's element is
//! hidden and returned, never destroyed, so spawn/despawn churn causes no
//! allocation in the host. Same interpolation and classification as the
//! GPU path; only materialization differs. Cost grows roughly linearly
//! with fleet size, so this backend is meant for small fleets or hosts
//! without a GPU context.

use crate::render::{EntitySprite, GpuFrame, RenderBackend, RenderError};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// The host map engine's retained visual elements, by opaque handle.
pub trait ElementHost: Send {
    /// Creates a new hidden element and returns its handle.
    fn create(&mut self) -> u32;

    /// Applies interpolated draw state to an element (position, rotation,
    /// color, opacity, scale).
    fn apply(&mut self, element: u32, sprite: &EntitySprite);

    /// Hides an element; it stays alive for reuse.
    fn hide(&mut self, element: u32);
}

/// Pooled retained-element backend over any [`ElementHost`].
pub struct RetainedRenderer<H: ElementHost> {
    host: H,

    /// Entity slot -> live element handle
    active: HashMap<u32, u32>,
    /// Hidden elements awaiting reuse
    free: Vec<u32>,
    /// Scratch presence set, reused across frames
    seen: HashSet<u32>,
}

impl<H: ElementHost> RetainedRenderer<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            active: HashMap::new(),
            free: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Number of elements currently bound to entities.
    pub fn active_elements(&self) -> usize {
        self.active.len()
    }

    /// Number of hidden elements in the reuse pool.
    pub fn pooled_elements(&self) -> usize {
        self.free.len()
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

impl<H: ElementHost> RenderBackend for RetainedRenderer<H> {
    fn draw(
        &mut self,
        sprites: &[EntitySprite],
        _gpu: Option<GpuFrame<'_, '_>>,
    ) -> Result<(), RenderError> {
        self.seen.clear();

        for sprite in sprites {
            self.seen.insert(sprite.slot);

            let element = match self.active.entry(sprite.slot) {
                Entry::Occupied(occupied) => *occupied.get(),
                Entry::Vacant(vacant) => {
                    let element = match self.free.pop() {
                        Some(element) => element,
                        None => self.host.create(),
                    };
                    *vacant.insert(element)
                }
            };

            self.host.apply(element, sprite);
        }

        // Entities gone from the sprite set: hide and return to the pool
        let host = &mut self.host;
        let free = &mut self.free;
        let seen = &self.seen;
        self.active.retain(|slot, element| {
            if seen.contains(slot) {
                true
            } else {
                host.hide(*element);
                free.push(*element);
                false
            }
        });

        Ok(())
    }

    fn name(&self) -> &'static str {
        "retained"
    }
}
