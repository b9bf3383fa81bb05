//! Command registry - one lazily created handler per command.
//!
//! Factories are registered once at startup. The first `resolve` for a
//! command runs its factory and caches the instance; every later message
//! for that command reuses it, so a handler can keep scratch buffers
//! between messages.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = CommandRegistry::new("outbound text");
//! registry.register(TextCommand::Ping, TextRequest::new);
//!
//! let handler = registry.resolve(TextCommand::Ping).unwrap();
//! ```

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use crate::command::CommandPayload;
use crate::error::Result;

use super::HandlerContext;

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Trait for command handlers.
pub trait CommandHandler: Send + 'static {
    /// Handle one command payload.
    fn handle(&mut self, payload: &CommandPayload, ctx: &mut HandlerContext<'_>) -> HandlerResult;
}

/// Boxed zero-argument handler constructor.
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn CommandHandler> + Send>;

/// Registry mapping command keys to handler factories and cached instances.
pub struct CommandRegistry<K> {
    /// Label used in log lines.
    label: &'static str,
    /// Registered constructors.
    factories: HashMap<K, HandlerFactory>,
    /// Instances created so far.
    instances: HashMap<K, Box<dyn CommandHandler>>,
}

impl<K> CommandRegistry<K>
where
    K: Copy + Eq + Hash + Display,
{
    /// Create a new empty registry.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            factories: HashMap::new(),
            instances: HashMap::new(),
        }
    }

    /// Register a handler constructor.
    ///
    /// Returns `false` and keeps the existing factory if `key` is already registered.
    pub fn register<F, H>(&mut self, key: K, factory: F) -> bool
    where
        F: Fn() -> H + Send + 'static,
        H: CommandHandler,
    {
        self.register_boxed(
            key,
            Box::new(move || Box::new(factory()) as Box<dyn CommandHandler>),
        )
    }

    /// Register an already boxed constructor.
    pub fn register_boxed(&mut self, key: K, factory: HandlerFactory) -> bool {
        if self.factories.contains_key(&key) {
            tracing::warn!(
                "Duplicate {} handler registration for {}, keeping the first",
                self.label,
                key
            );
            return false;
        }
        self.factories.insert(key, factory);
        true
    }

    /// Get the cached handler for `key`, creating it on first use.
    ///
    /// Returns `None` if no factory is registered.
    pub fn resolve(&mut self, key: K) -> Option<&mut (dyn CommandHandler + 'static)> {
        if !self.instances.contains_key(&key) {
            let Some(factory) = self.factories.get(&key) else {
                tracing::warn!("No {} handler registered for {}", self.label, key);
                return None;
            };
            tracing::debug!("Creating {} handler for {}", self.label, key);
            self.instances.insert(key, factory());
        }
        self.instances.get_mut(&key).map(|h| h.as_mut())
    }

    /// Remove the factory and any cached instance for `key`.
    pub fn unregister(&mut self, key: K) -> bool {
        self.instances.remove(&key);
        self.factories.remove(&key).is_some()
    }

    /// Whether a factory exists for `key`.
    pub fn is_registered(&self, key: K) -> bool {
        self.factories.contains_key(&key)
    }

    /// Whether an instance has been created for `key`.
    pub fn is_active(&self, key: K) -> bool {
        self.instances.contains_key(&key)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Number of live handler instances.
    pub fn active_count(&self) -> usize {
        self.instances.len()
    }

    /// Drop every cached instance. Factories stay registered.
    pub fn dispose(&mut self) {
        self.instances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BinaryCommand, TextCommand};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counter {
        calls: usize,
    }

    impl CommandHandler for Counter {
        fn handle(&mut self, _: &CommandPayload, _: &mut HandlerContext<'_>) -> HandlerResult {
            self.calls += 1;
            Ok(())
        }
    }

    fn address(handler: &mut dyn CommandHandler) -> *const () {
        handler as *mut dyn CommandHandler as *const ()
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = CommandRegistry::new("test");
        assert!(registry.register(TextCommand::Ping, || Counter { calls: 0 }));

        assert!(registry.is_registered(TextCommand::Ping));
        assert!(!registry.is_active(TextCommand::Ping));
        assert!(registry.resolve(TextCommand::Ping).is_some());
        assert!(registry.is_active(TextCommand::Ping));
    }

    #[test]
    fn test_resolve_returns_cached_instance() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();

        let mut registry = CommandRegistry::new("test");
        registry.register(BinaryCommand(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Counter { calls: 0 }
        });

        let first = address(registry.resolve(BinaryCommand(5)).unwrap());
        let second = address(registry.resolve(BinaryCommand(5)).unwrap());

        assert_eq!(first, second);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_commands_get_distinct_instances() {
        let mut registry = CommandRegistry::new("test");
        registry.register(BinaryCommand(1), || Counter { calls: 0 });
        registry.register(BinaryCommand(2), || Counter { calls: 0 });

        let a = address(registry.resolve(BinaryCommand(1)).unwrap());
        let b = address(registry.resolve(BinaryCommand(2)).unwrap());

        assert_ne!(a, b);
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let created = Arc::new(AtomicUsize::new(0));
        let first = created.clone();

        let mut registry = CommandRegistry::new("test");
        assert!(registry.register(TextCommand::Chat, move || {
            first.fetch_add(1, Ordering::SeqCst);
            Counter { calls: 0 }
        }));
        assert!(!registry.register(TextCommand::Chat, || Counter { calls: 100 }));

        registry.resolve(TextCommand::Chat).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unregistered() {
        let mut registry: CommandRegistry<TextCommand> = CommandRegistry::new("test");
        assert!(registry.resolve(TextCommand::Kick).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_drops_factory_and_instance() {
        let mut registry = CommandRegistry::new("test");
        registry.register(TextCommand::Kick, || Counter { calls: 0 });
        registry.resolve(TextCommand::Kick);

        assert!(registry.unregister(TextCommand::Kick));
        assert!(!registry.unregister(TextCommand::Kick));
        assert!(!registry.is_active(TextCommand::Kick));
        assert!(registry.resolve(TextCommand::Kick).is_none());
    }

    #[test]
    fn test_dispose_recreates_on_next_resolve() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();

        let mut registry = CommandRegistry::new("test");
        registry.register(TextCommand::Ping, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Counter { calls: 0 }
        });

        registry.resolve(TextCommand::Ping);
        registry.dispose();
        assert_eq!(registry.active_count(), 0);

        registry.resolve(TextCommand::Ping);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }
}
