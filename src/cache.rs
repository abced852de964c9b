//! Latest-frame cache: one atomically swapped slot per tracked window
//!
//! The slot map is copy-on-write behind an `ArcSwap`, so `publish` and
//! `latest` never take a lock. Adding or removing a slot clones the map,
//! which only happens on track/untrack.

use arc_swap::{ArcSwap, ArcSwapOption};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use crate::types::{Frame, WindowId};

type SlotMap = HashMap<WindowId, Arc<ArcSwapOption<Frame>>>;

/// Result of a publish attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Stored,
    /// The slot already holds a frame with an equal or newer sequence
    Stale,
    /// No slot exists for the window (never tracked, or untracked)
    Untracked,
}

#[derive(Debug, Default)]
pub struct FrameCache {
    slots: ArcSwap<SlotMap>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty slot; returns false if one already exists
    pub fn insert_slot(&self, window: WindowId) -> bool {
        let mut inserted = false;
        self.slots.rcu(|slots| {
            let mut next = SlotMap::clone(slots);
            inserted = !next.contains_key(&window);
            next.entry(window).or_default();
            next
        });
        inserted
    }

    /// Drop the slot and its frame; readers holding a copy keep it alive
    pub fn remove_slot(&self, window: WindowId) -> bool {
        let mut removed = false;
        self.slots.rcu(|slots| {
            let mut next = SlotMap::clone(slots);
            removed = next.remove(&window).is_some();
            next
        });
        removed
    }

    /// Atomically replace the window's current frame
    pub fn publish(&self, frame: Frame) -> PublishOutcome {
        let Some(slot) = self.slots.load().get(&frame.window).cloned() else {
            return PublishOutcome::Untracked;
        };

        let window = frame.window;
        let sequence = frame.sequence;
        let new = Arc::new(frame);
        loop {
            let current = slot.load();
            if let Some(existing) = &*current
                && existing.sequence >= sequence
            {
                trace!(window = %window, sequence, current = existing.sequence, "Rejected stale frame");
                return PublishOutcome::Stale;
            }
            let previous = slot.compare_and_swap(&current, Some(Arc::clone(&new)));
            if ptr_eq(&*previous, &*current) {
                return PublishOutcome::Stored;
            }
        }
    }

    /// Current frame for the window, if any
    pub fn latest(&self, window: WindowId) -> Option<Frame> {
        let slots = self.slots.load();
        let slot = slots.get(&window)?;
        slot.load_full().map(|frame| Frame::clone(&frame))
    }

    pub fn len(&self) -> usize {
        self.slots.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ptr_eq(a: &Option<Arc<Frame>>, b: &Option<Arc<Frame>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
