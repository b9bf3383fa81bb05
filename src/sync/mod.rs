//! Sync module - per-tick entity trait updates and state sync.
//!
//! Provides:
//! - [`EntityTrait`] - behaviour attached to an entity, with its sync encoding
//! - [`SyncScheduler`] - runs traits at their frequency and flushes dirty ones
//!   onto the outbound bus once per tick

mod entity_trait;
mod scheduler;

pub use entity_trait::{EntityTrait, TraitContext, TraitKey, EVERY_TICK};
pub use scheduler::SyncScheduler;
