//! Server-managed session state keyed by a signed cookie identifier.

pub mod signer;
pub mod store;

pub use signer::SessionSigner;
pub use store::{InMemorySessionStore, SessionData, SessionStore};

use serde::Serialize;
use serde_json::Value;

/// A request's session: identifier, data map, and dirty/loaded bookkeeping.
///
/// The identifier is immutable for the session's lifetime; "regeneration" is
/// modeled as `destroy` followed by the next request minting a fresh id.
pub struct Session {
    id: String,
    data: SessionData,
    dirty: bool,
    loaded: bool,
    destroyed: bool,
}

impl Session {
    pub fn fresh(id: String) -> Self {
        Self {
            id,
            data: SessionData::new(),
            dirty: false,
            loaded: false,
            destroyed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Populates data loaded from the store at pipeline entry. Does not mark dirty.
    pub fn hydrate(&mut self, data: SessionData) {
        self.data = data;
        self.loaded = true;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(value) = serde_json::to_value(value) {
            self.data.insert(key.into(), value);
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, key: &str) {
        if self.data.remove(key).is_some() {
            self.dirty = true;
        }
    }

    /// Clears the store entry and the in-memory map; marks the session as destroyed
    /// so the pipeline does not re-save it on exit.
    pub fn destroy(&mut self) {
        self.data.clear();
        self.dirty = false;
        self.destroyed = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_marks_dirty() {
        let mut s = Session::fresh("id".into());
        assert!(!s.is_dirty());
        s.set("k", "v");
        assert!(s.is_dirty());
        assert_eq!(s.get("k").unwrap(), "v");
    }

    #[test]
    fn destroy_clears_data_and_suppresses_save() {
        let mut s = Session::fresh("id".into());
        s.set("k", "v");
        s.destroy();
        assert!(s.data().is_empty());
        assert!(s.is_destroyed());
        assert!(!s.is_dirty());
    }
}
