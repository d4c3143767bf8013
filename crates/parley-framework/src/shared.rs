//! Free-form data shared by every handler of a dispatcher.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

type Slot = Arc<dyn Any + Send + Sync>;

/// A string-keyed bag of values, visible to all handlers of one dispatcher.
///
/// Values are stored behind `Arc`, so reads hand out cheap clones. The map
/// itself is guarded by a lock; values that handlers mutate in place need
/// their own interior mutability.
#[derive(Clone, Default)]
pub struct SharedData {
    inner: Arc<RwLock<HashMap<String, Slot>>>,
}

impl SharedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.inner.write().insert(key.into(), Arc::new(value));
    }

    /// Returns the value under `key` if it exists and has type `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let slot = self.inner.read().get(key).cloned()?;
        slot.downcast::<T>().ok()
    }

    /// Removes the value under `key`. Returns whether one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Returns the stored keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }
}

impl fmt::Debug for SharedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedData")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_typed_access() {
        let shared = SharedData::new();
        shared.insert("greeting", String::from("hello"));

        assert_eq!(shared.get::<String>("greeting").as_deref(), Some(&"hello".to_string()));
        assert!(shared.get::<i32>("greeting").is_none());
        assert!(shared.get::<String>("missing").is_none());
    }

    #[test]
    fn test_clones_share_storage() {
        let shared = SharedData::new();
        let other = shared.clone();
        other.insert("hits", AtomicUsize::new(0));

        shared
            .get::<AtomicUsize>("hits")
            .unwrap()
            .fetch_add(1, Ordering::SeqCst);
        assert_eq!(other.get::<AtomicUsize>("hits").unwrap().load(Ordering::SeqCst), 1);

        assert!(shared.remove("hits"));
        assert!(other.is_empty());
    }
}
