//! Named engine factories
//!
//! The settings layer stores the user's backend choice by name. A choice
//! that no longer exists (backend not compiled in, renamed) falls back to
//! the highest-priority registered backend.

use std::sync::Arc;

type Factory<T> = Box<dyn Fn() -> Option<Arc<T>> + Send + Sync>;

struct Registration<T: ?Sized> {
    name: String,
    priority: i32,
    factory: Factory<T>,
}

/// Factories for one engine kind, keyed by backend name
pub struct EngineRegistrar<T: ?Sized> {
    backends: Vec<Registration<T>>,
}

impl<T: ?Sized> EngineRegistrar<T> {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Register a backend. A later registration with the same name replaces
    /// the earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, priority: i32, factory: F)
    where
        F: Fn() -> Option<Arc<T>> + Send + Sync + 'static,
    {
        let name = name.into();
        self.backends.retain(|r| r.name != name);
        self.backends.push(Registration {
            name,
            priority,
            factory: Box::new(factory),
        });
    }

    /// Registered names, highest priority first
    pub fn names(&self) -> Vec<&str> {
        let mut sorted: Vec<&Registration<T>> = self.backends.iter().collect();
        sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
        sorted.into_iter().map(|r| r.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Construct an engine for `choice`, or for the best backend when
    /// `choice` is unknown. `None` when the factory could not produce one.
    pub fn new_from_choice(&self, choice: &str) -> Option<Arc<T>> {
        let registration = self
            .backends
            .iter()
            .find(|r| r.name == choice)
            .or_else(|| {
                let best = self.backends.iter().max_by_key(|r| r.priority);
                if let Some(best) = best {
                    tracing::warn!(
                        choice,
                        fallback = %best.name,
                        "Unknown audio backend, using fallback"
                    );
                }
                best
            })?;

        (registration.factory)()
    }
}

impl<T: ?Sized> Default for EngineRegistrar<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registrar() -> EngineRegistrar<str> {
        let mut registrar: EngineRegistrar<str> = EngineRegistrar::new();
        registrar.register("low", 1, || Some(Arc::from("low")));
        registrar.register("high", 10, || Some(Arc::from("high")));
        registrar.register("broken", 5, || None);
        registrar
    }

    #[test]
    fn test_choice_by_name() {
        let registrar = registrar();
        assert_eq!(registrar.new_from_choice("low").as_deref(), Some("low"));
        assert_eq!(registrar.names(), vec!["high", "broken", "low"]);
    }

    #[test]
    fn test_unknown_choice_uses_highest_priority() {
        let registrar = registrar();
        assert_eq!(registrar.new_from_choice("gone").as_deref(), Some("high"));
    }

    #[test]
    fn test_factory_failure_yields_none() {
        let registrar = registrar();
        assert!(registrar.new_from_choice("broken").is_none());
        assert!(EngineRegistrar::<str>::new().new_from_choice("any").is_none());
    }
}
