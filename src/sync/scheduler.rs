//! Tick scheduler for entity traits.
//!
//! Traits live in a slab and are referenced by slot index from two
//! buckets: high priority (runs every tick) and throttled (runs every
//! `frequency` ticks with a correspondingly larger delta). Each tick ends
//! with a flush of every trait that requested a sync, published on the
//! outbound bus as a binary request.
//!
//! The scheduler is single-threaded and owned by the game loop.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use super::{EntityTrait, TraitContext, TraitKey};
use crate::bus::CommandBus;
use crate::command::{BinaryPayload, Command, CommandMessage, EntityId};

struct Slot {
    key: TraitKey,
    state: Box<dyn EntityTrait>,
    frequency: u32,
    pending_sync: bool,
    active: bool,
}

/// Drives entity traits and flushes their sync requests.
pub struct SyncScheduler {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<TraitKey, usize>,
    high_priority: Vec<usize>,
    throttled: Vec<usize>,
    dirty: Vec<usize>,
    /// Reused for every sync payload.
    scratch: BytesMut,
    tick: u64,
    outbound: CommandBus<CommandMessage>,
}

impl SyncScheduler {
    /// Create a scheduler publishing sync requests on `outbound`.
    pub fn new(outbound: CommandBus<CommandMessage>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            high_priority: Vec::new(),
            throttled: Vec::new(),
            dirty: Vec::new(),
            scratch: BytesMut::with_capacity(256),
            tick: 0,
            outbound,
        }
    }

    /// Register a trait for `owner`.
    ///
    /// Returns `false` if the owner already has a trait with this name.
    pub fn register(&mut self, owner: EntityId, state: impl EntityTrait) -> bool {
        self.register_boxed(owner, Box::new(state))
    }

    pub fn register_boxed(&mut self, owner: EntityId, state: Box<dyn EntityTrait>) -> bool {
        let key = TraitKey::new(owner, state.name());
        if self.index.contains_key(&key) {
            tracing::warn!("Trait {} already registered, ignoring", key);
            return false;
        }

        let frequency = state.update_frequency().max(1);
        let slot = Slot {
            key: key.clone(),
            state,
            frequency,
            pending_sync: false,
            active: true,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };

        if frequency == 1 {
            self.high_priority.push(idx);
        } else {
            self.throttled.push(idx);
        }
        tracing::debug!("Registered trait {} (every {} ticks)", key, frequency);
        self.index.insert(key, idx);
        true
    }

    /// Remove one trait. Returns `false` if it was not registered.
    pub fn unregister(&mut self, owner: EntityId, name: &str) -> bool {
        let key = TraitKey::new(owner, name);
        let Some(idx) = self.index.remove(&key) else {
            tracing::warn!("Trait {} is not registered, nothing to remove", key);
            return false;
        };
        self.evict(idx);
        true
    }

    /// Remove every trait of `owner`. Returns how many were removed.
    pub fn unregister_owner(&mut self, owner: EntityId) -> usize {
        let owned: Vec<usize> = self
            .index
            .iter()
            .filter(|(key, _)| key.owner == owner)
            .map(|(_, &idx)| idx)
            .collect();
        self.index.retain(|key, _| key.owner != owner);
        for &idx in &owned {
            self.evict(idx);
        }
        if !owned.is_empty() {
            tracing::debug!("Removed {} traits of entity {}", owned.len(), owner);
        }
        owned.len()
    }

    fn evict(&mut self, idx: usize) {
        self.high_priority.retain(|&i| i != idx);
        self.throttled.retain(|&i| i != idx);
        self.dirty.retain(|&i| i != idx);
        self.slots[idx] = None;
        self.free.push(idx);
    }

    /// Flag a trait for sync from outside its own update.
    ///
    /// It is flushed at the end of the next tick.
    pub fn request_sync(&mut self, owner: EntityId, name: &str) -> bool {
        let Some(&idx) = self.index.get(&TraitKey::new(owner, name)) else {
            tracing::warn!("Sync requested for unknown trait {}/{}", owner, name);
            return false;
        };
        if let Some(slot) = self.slots[idx].as_mut() {
            mark_dirty(slot, idx, &mut self.dirty);
        }
        true
    }

    /// Pause or resume updates for a trait. Pending syncs are still flushed.
    pub fn set_active(&mut self, owner: EntityId, name: &str, active: bool) -> bool {
        let Some(&idx) = self.index.get(&TraitKey::new(owner, name)) else {
            return false;
        };
        match self.slots[idx].as_mut() {
            Some(slot) => {
                slot.active = active;
                true
            }
            None => false,
        }
    }

    /// Run one tick: updates, then the sync flush.
    pub fn tick(&mut self, delta: f32) {
        self.tick += 1;
        let tick = self.tick;

        for &idx in &self.high_priority {
            run_slot(&mut self.slots, &mut self.dirty, idx, delta, tick);
        }
        for &idx in &self.throttled {
            let Some(frequency) = self.slots[idx].as_ref().map(|s| s.frequency) else {
                continue;
            };
            if tick % u64::from(frequency) == 0 {
                run_slot(&mut self.slots, &mut self.dirty, idx, delta * frequency as f32, tick);
            }
        }

        self.flush();
    }

    fn flush(&mut self) {
        for idx in self.dirty.drain(..) {
            let Some(slot) = self.slots[idx].as_mut() else {
                continue;
            };
            if !slot.pending_sync {
                continue;
            }
            slot.pending_sync = false;

            self.scratch.clear();
            self.scratch.put_u32(slot.key.owner);
            if let Err(e) = slot.state.write_sync(&mut self.scratch) {
                tracing::error!("Trait {} failed to serialize: {}", slot.key, e);
                continue;
            }

            let command = Command::Binary(slot.state.sync_command());
            let payload = BinaryPayload::new(self.scratch.split().freeze());
            tracing::trace!("Flushing {} ({} bytes)", slot.key, payload.len());
            self.outbound.publish(&(command, payload.into()));
        }
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn contains(&self, owner: EntityId, name: &str) -> bool {
        self.index.contains_key(&TraitKey::new(owner, name))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Traits waiting for the next flush.
    pub fn pending_syncs(&self) -> usize {
        self.dirty.len()
    }
}

fn mark_dirty(slot: &mut Slot, idx: usize, dirty: &mut Vec<usize>) {
    if !slot.pending_sync {
        slot.pending_sync = true;
        dirty.push(idx);
    }
}

fn run_slot(slots: &mut [Option<Slot>], dirty: &mut Vec<usize>, idx: usize, delta: f32, tick: u64) {
    let Some(slot) = slots[idx].as_mut() else {
        return;
    };
    if !slot.active {
        return;
    }
    let mut ctx = TraitContext::new(slot.key.owner, delta, tick);
    slot.state.update(&mut ctx);
    if ctx.sync_requested() {
        mark_dirty(slot, idx, dirty);
    }
}
