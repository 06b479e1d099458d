//! # Instance Registry
//!
//! Maps a key (normally a content hash) to at most one shared value.
//!
//! `register` either hands back the live value for a key or makes the caller
//! the *first instance*, which must publish a value with
//! [`Instance::set_value`]. While a first instance is pending, other callers
//! registering the same key block on a condition variable until the value is
//! published. If the first instance is dropped without publishing, its entry
//! is removed and the waiters retry, so one of them becomes the new first
//! instance.
//!
//! Entries hold [`Weak`] references: the registry never keeps a value alive.
//! Once the last consumer drops its `Arc`, the entry counts as absent and is
//! purged by [`InstanceRegistry::garbage_collect`].

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

enum Slot<V: ?Sized> {
    Pending,
    Ready(Weak<V>),
}

/// Content-addressed registry of shared values
pub struct InstanceRegistry<K, V: ?Sized> {
    label: &'static str,
    entries: Mutex<HashMap<K, Slot<V>>>,
    published: Condvar,
}

impl<K, V> InstanceRegistry<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: ?Sized,
{
    /// Create an empty registry; `label` names it in log output
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: Mutex::new(HashMap::new()),
            published: Condvar::new(),
        }
    }

    /// Look up `key`, becoming the first instance when no live value exists
    pub fn register(&self, key: K) -> Instance<'_, K, V> {
        let mut entries = self.entries.lock();
        loop {
            match entries.get(&key) {
                Some(Slot::Pending) => {
                    self.published.wait(&mut entries);
                }
                Some(Slot::Ready(weak)) => {
                    if let Some(value) = weak.upgrade() {
                        return Instance::shared(self, key, value);
                    }
                    entries.insert(key.clone(), Slot::Pending);
                    return Instance::first(self, key);
                }
                None => {
                    entries.insert(key.clone(), Slot::Pending);
                    return Instance::first(self, key);
                }
            }
        }
    }

    /// Live value for `key` without registering
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        match self.entries.lock().get(key) {
            Some(Slot::Ready(weak)) => weak.upgrade(),
            _ => None,
        }
    }

    /// Remove entries whose value has been dropped; returns how many
    pub fn garbage_collect(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, slot| match slot {
            Slot::Pending => true,
            Slot::Ready(weak) => weak.strong_count() > 0,
        });
        let removed = before - entries.len();
        if removed > 0 {
            log::trace!("{} registry: collected {} entries", self.label, removed);
        }
        removed
    }

    /// Number of entries, including dead ones not yet collected
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the registry holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn publish(&self, key: &K, value: &Arc<V>) {
        self.entries.lock().insert(key.clone(), Slot::Ready(Arc::downgrade(value)));
        self.published.notify_all();
    }

    fn abandon(&self, key: &K) {
        let mut entries = self.entries.lock();
        if matches!(entries.get(key), Some(Slot::Pending)) {
            entries.remove(key);
            log::debug!("{} registry: first instance for {:?} abandoned", self.label, key);
        }
        drop(entries);
        self.published.notify_all();
    }
}

impl<K, V: ?Sized> fmt::Debug for InstanceRegistry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("label", &self.label)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

/// Result of [`InstanceRegistry::register`]
pub struct Instance<'a, K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: ?Sized,
{
    registry: &'a InstanceRegistry<K, V>,
    key: K,
    first: bool,
    published: bool,
    value: Option<Arc<V>>,
}

impl<'a, K, V> Instance<'a, K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: ?Sized,
{
    fn first(registry: &'a InstanceRegistry<K, V>, key: K) -> Self {
        Self { registry, key, first: true, published: false, value: None }
    }

    fn shared(registry: &'a InstanceRegistry<K, V>, key: K, value: Arc<V>) -> Self {
        Self { registry, key, first: false, published: true, value: Some(value) }
    }

    /// Whether the caller must produce and publish the value
    pub fn is_first_instance(&self) -> bool {
        self.first
    }

    /// Registry key
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Publish the value and wake waiters
    ///
    /// Only meaningful for the first instance; other instances keep the
    /// value they were handed.
    pub fn set_value(&mut self, value: Arc<V>) {
        if !self.first {
            log::warn!("set_value on a non-first instance for {:?} ignored", self.key);
            return;
        }
        self.registry.publish(&self.key, &value);
        self.published = true;
        self.value = Some(value);
    }

    /// The shared value, `None` for an unpublished first instance
    pub fn value(&self) -> Option<&Arc<V>> {
        self.value.as_ref()
    }

    /// Take the shared value
    pub fn into_value(mut self) -> Option<Arc<V>> {
        self.value.take()
    }
}

impl<K, V> Drop for Instance<'_, K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: ?Sized,
{
    fn drop(&mut self) {
        if self.first && !self.published {
            self.registry.abandon(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_first_then_shared() {
        let registry: InstanceRegistry<u64, String> = InstanceRegistry::new("test");
        let mut first = registry.register(7);
        assert!(first.is_first_instance());
        first.set_value(Arc::new("seven".to_string()));
        let held = first.into_value().unwrap();

        let second = registry.register(7);
        assert!(!second.is_first_instance());
        assert!(Arc::ptr_eq(second.value().unwrap(), &held));
    }

    #[test]
    fn test_dropped_value_counts_as_absent() {
        let registry: InstanceRegistry<u64, u32> = InstanceRegistry::new("test");
        {
            let mut first = registry.register(1);
            first.set_value(Arc::new(10));
        }
        assert!(registry.get(&1).is_none());
        assert_eq!(registry.garbage_collect(), 1);
        assert!(registry.is_empty());
        assert!(registry.register(1).is_first_instance());
    }

    #[test]
    fn test_abandoned_first_instance_lets_next_caller_win() {
        let registry: InstanceRegistry<u64, u32> = InstanceRegistry::new("test");
        drop(registry.register(3));
        assert!(registry.is_empty());
        let mut next = registry.register(3);
        assert!(next.is_first_instance());
        next.set_value(Arc::new(30));
        assert_eq!(registry.get(&3).as_deref(), Some(&30));
    }

    #[test]
    fn test_concurrent_registration_has_single_winner() {
        let registry: Arc<InstanceRegistry<u64, usize>> = Arc::new(InstanceRegistry::new("test"));
        let winners = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    let mut instance = registry.register(42);
                    if instance.is_first_instance() {
                        winners.fetch_add(1, Ordering::SeqCst);
                        instance.set_value(Arc::new(i));
                    }
                    instance.into_value().unwrap()
                })
            })
            .collect();
        let values: Vec<Arc<usize>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
    }
}
