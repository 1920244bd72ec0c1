//! Type-keyed dependency injection container.
//!
//! Grounded on the teacher's global `GLOBAL_STATE` (`state.rs`), but turned into an
//! explicit, constructed instance rather than a process-wide `Lazy` singleton: the
//! design notes require the DI container be a parameter of server construction with
//! an explicit disposal step, not a hidden global.

use std::any::{Any, TypeId};
use std::sync::Arc;

use dashmap::DashMap;

/// A type-keyed service lookup scope.
///
/// Each [`crate::container::Container`] and [`crate::isolated::IsolatedContainer`] owns
/// one. Values are looked up by their concrete Rust type, not by string key.
#[derive(Default)]
pub struct DiContainer {
    values: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl DiContainer {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
        }
    }

    /// Registers a value, replacing any prior value of the same type.
    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Looks up a previously registered value by type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .map(|v| v.clone())
            .and_then(|v| v.downcast::<T>().ok())
    }

    /// Releases all registered values. Called during graceful shutdown.
    pub fn dispose(&self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Config {
        url: String,
    }

    #[test]
    fn set_and_get_roundtrip() {
        let di = DiContainer::new();
        di.set(Config {
            url: "postgres://localhost".into(),
        });
        let got = di.get::<Config>().unwrap();
        assert_eq!(got.url, "postgres://localhost");
    }

    #[test]
    fn missing_type_returns_none() {
        let di = DiContainer::new();
        assert!(di.get::<Config>().is_none());
    }

    #[test]
    fn dispose_clears_all_entries() {
        let di = DiContainer::new();
        di.set(42u32);
        di.dispose();
        assert!(di.get::<u32>().is_none());
    }
}
