use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::util::lock;

struct Entry<K: ?Sized, V> {
    key: Weak<K>,
    value: V,
}

/// Map from `Arc` identity to a value, holding the key only weakly.
///
/// An entry lives as long as its key has strong references; dead entries
/// are pruned on every access. While an entry exists its `Weak` keeps the
/// allocation, so a new key can never reuse a tracked address.
pub struct WeakRegistry<K: ?Sized, V> {
    entries: Mutex<HashMap<usize, Entry<K, V>>>,
}

fn addr<K: ?Sized>(key: &Arc<K>) -> usize {
    Arc::as_ptr(key) as *const () as usize
}

impl<K: ?Sized, V: Clone> WeakRegistry<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Binds `key` to `value`, returning the previous live binding.
    pub fn insert(&self, key: &Arc<K>, value: V) -> Option<V> {
        let mut entries = lock(&self.entries);
        Self::prune(&mut entries);
        entries
            .insert(
                addr(key),
                Entry {
                    key: Arc::downgrade(key),
                    value,
                },
            )
            .map(|e| e.value)
    }

    pub fn get(&self, key: &Arc<K>) -> Option<V> {
        let mut entries = lock(&self.entries);
        Self::prune(&mut entries);
        entries.get(&addr(key)).map(|e| e.value.clone())
    }

    pub fn remove(&self, key: &Arc<K>) -> Option<V> {
        let mut entries = lock(&self.entries);
        Self::prune(&mut entries);
        entries.remove(&addr(key)).map(|e| e.value)
    }

    /// Keeps only the live entries whose value satisfies `keep`.
    pub fn retain_values(&self, mut keep: impl FnMut(&V) -> bool) {
        let mut entries = lock(&self.entries);
        entries.retain(|_, e| e.key.strong_count() > 0 && keep(&e.value));
    }

    /// Live entries.
    pub fn len(&self) -> usize {
        let mut entries = lock(&self.entries);
        Self::prune(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(entries: &mut HashMap<usize, Entry<K, V>>) {
        entries.retain(|_, e| e.key.strong_count() > 0);
    }
}

impl<K: ?Sized, V: Clone> Default for WeakRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ?Sized, V> std::fmt::Debug for WeakRegistry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRegistry")
            .field("entries", &lock(&self.entries).len())
            .finish()
    }
}
