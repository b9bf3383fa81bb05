//! Entity traits - per-entity behaviour updated by the scheduler.

use std::fmt;

use bytes::BytesMut;

use crate::command::{BinaryCommand, EntityId};
use crate::error::Result;

/// Update frequency of traits that run every tick.
pub const EVERY_TICK: u32 = 1;

/// A unit of per-entity state driven by [`SyncScheduler`](super::SyncScheduler).
///
/// The scheduler owns the trait; the owning entity is referenced only by id.
///
/// # Example
///
/// ```
/// use bytes::{BufMut, BytesMut};
/// use tickwire::sync::{EntityTrait, TraitContext};
///
/// struct Health {
///     current: i32,
///     regen_per_sec: f32,
///     carry: f32,
/// }
///
/// impl EntityTrait for Health {
///     fn name(&self) -> &str {
///         "health"
///     }
///
///     fn update_frequency(&self) -> u32 {
///         10
///     }
///
///     fn update(&mut self, ctx: &mut TraitContext) {
///         self.carry += self.regen_per_sec * ctx.delta();
///         if self.carry >= 1.0 {
///             self.current += self.carry as i32;
///             self.carry = self.carry.fract();
///             ctx.request_sync();
///         }
///     }
///
///     fn write_sync(&self, out: &mut BytesMut) -> tickwire::Result<()> {
///         out.put_i32(self.current);
///         Ok(())
///     }
/// }
/// ```
pub trait EntityTrait: Send + 'static {
    /// Name, unique per owner.
    fn name(&self) -> &str;

    /// Run every `n`th tick. Values of 0 and 1 mean every tick.
    fn update_frequency(&self) -> u32 {
        EVERY_TICK
    }

    /// Advance the trait. `ctx.delta()` covers the time since its last update.
    fn update(&mut self, _ctx: &mut TraitContext) {}

    /// Binary request code used for sync payloads.
    fn sync_command(&self) -> BinaryCommand {
        BinaryCommand::TRAIT_SYNC
    }

    /// Append the sync body. The owner id has already been written.
    fn write_sync(&self, out: &mut BytesMut) -> Result<()>;
}

/// Identity of a registered trait.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraitKey {
    pub owner: EntityId,
    pub name: String,
}

impl TraitKey {
    pub fn new(owner: EntityId, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

impl fmt::Display for TraitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Per-update view handed to [`EntityTrait::update`].
#[derive(Debug)]
pub struct TraitContext {
    owner: EntityId,
    delta: f32,
    tick: u64,
    sync_requested: bool,
}

impl TraitContext {
    pub(crate) fn new(owner: EntityId, delta: f32, tick: u64) -> Self {
        Self {
            owner,
            delta,
            tick,
            sync_requested: false,
        }
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Seconds since this trait last ran.
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Scheduler tick number, starting at 1.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Mark the trait dirty. It is flushed at the end of the current tick.
    pub fn request_sync(&mut self) {
        self.sync_requested = true;
    }

    pub(crate) fn sync_requested(&self) -> bool {
        self.sync_requested
    }
}
