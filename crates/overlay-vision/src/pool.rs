use tracing::debug;

use crate::{Quat, Rgba, Vec3};

/// Rendering-side collaborator that owns the actual visual objects.
///
/// The pool decides lifetime; the factory only creates and updates.
pub trait MarkerFactory {
    type Handle;

    fn create_marker(&mut self, color: Rgba) -> Self::Handle;
    fn set_active(&mut self, marker: &Self::Handle, active: bool);
    fn set_transform(&mut self, marker: &Self::Handle, position: Vec3, rotation: Quat, size: (f32, f32));
    fn set_color(&mut self, marker: &Self::Handle, color: Rgba);
    fn set_label_text(&mut self, marker: &Self::Handle, text: &str, color: Rgba, font_size: u32);
}

/// Everything drawn into one slot for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerUpdate<'a> {
    pub position: Vec3,
    pub rotation: Quat,
    pub size: (f32, f32),
    pub label: &'a str,
    pub color: Rgba,
    pub font_size: u32,
}

#[derive(Debug, Clone)]
pub struct MarkerSlot<H> {
    pub index: usize,
    pub active: bool,
    pub handle: H,
}

/// Grow-only arena of markers. Slot `i` keeps its handle for the pool's
/// lifetime; unused slots are hidden, never destroyed.
pub struct MarkerPool<F: MarkerFactory> {
    factory: F,
    slots: Vec<MarkerSlot<F::Handle>>,
}

impl<F: MarkerFactory> MarkerPool<F> {
    pub fn new(factory: F) -> Self {
        Self { factory, slots: Vec::new() }
    }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    pub fn slots(&self) -> &[MarkerSlot<F::Handle>] { &self.slots }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.active).count()
    }

    pub fn factory(&self) -> &F { &self.factory }

    /// Show `update` in slot `index`, creating slots up to it if needed.
    pub fn draw(&mut self, index: usize, update: &MarkerUpdate<'_>) {
        while self.slots.len() <= index {
            let i = self.slots.len();
            let handle = self.factory.create_marker(update.color);
            debug!("pool: created slot {}", i);
            // intermediate slots (only reachable when indices are skipped) start hidden
            let active = i == index;
            if !active {
                self.factory.set_active(&handle, false);
            }
            self.slots.push(MarkerSlot { index: i, active, handle });
        }

        let slot = &mut self.slots[index];
        if !slot.active {
            self.factory.set_active(&slot.handle, true);
            slot.active = true;
        }
        self.factory.set_color(&slot.handle, update.color);
        self.factory.set_transform(&slot.handle, update.position, update.rotation, update.size);
        self.factory.set_label_text(&slot.handle, update.label, update.color, update.font_size);
    }

    /// Hide every slot at or after `start`.
    pub fn deactivate_from(&mut self, start: usize) {
        for slot in self.slots.iter_mut().skip(start) {
            if slot.active {
                self.factory.set_active(&slot.handle, false);
                slot.active = false;
            }
        }
    }

    pub fn deactivate_all(&mut self) {
        self.deactivate_from(0);
    }
}
