/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahash::AHashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{DelayEntry, DelayQueue};

pub trait TimeoutListener<K, V>: Send + Sync {
    fn on_timeout(&self, key: &K, value: &V);
}

struct TimeoutItem<K, V> {
    value: V,
    entry: Arc<DelayEntry<K>>,
}

struct MapShared<K, V> {
    items: Mutex<AHashMap<K, TimeoutItem<K, V>>>,
    queue: DelayQueue<K>,
    listeners: Mutex<Vec<Arc<dyn TimeoutListener<K, V>>>>,
    timeout_count: AtomicU64,
}

impl<K, V> MapShared<K, V>
where
    K: Eq + Hash,
{
    fn expire(&self, entry: Arc<DelayEntry<K>>) {
        let key = entry.value();
        let mut items = self.items.lock().unwrap();
        let Some(item) = items.get(key) else {
            return;
        };
        if !Arc::ptr_eq(&item.entry, &entry) {
            // replaced after it was taken
            return;
        }
        let Some(item) = items.remove(key) else {
            return;
        };
        drop(items);

        self.timeout_count.fetch_add(1, Ordering::Relaxed);
        let listeners = self.listeners.lock().unwrap().clone();
        for l in listeners {
            l.on_timeout(key, &item.value);
        }
    }
}

/// A map whose entries are evicted once their deadline passes
///
/// A background task is spawned on creation, so this must be created inside a tokio runtime.
pub struct TimeoutMap<K, V> {
    shared: Arc<MapShared<K, V>>,
    default_timeout: Duration,
    reaper: JoinHandle<()>,
}

impl<K, V> TimeoutMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    pub fn new(default_timeout: Duration) -> Self {
        let shared = Arc::new(MapShared {
            items: Mutex::new(AHashMap::new()),
            queue: DelayQueue::default(),
            listeners: Mutex::new(Vec::new()),
            timeout_count: AtomicU64::new(0),
        });
        let reaper_shared = Arc::clone(&shared);
        let reaper = tokio::spawn(async move {
            loop {
                let entry = reaper_shared.queue.take().await;
                reaper_shared.expire(entry);
            }
        });
        TimeoutMap {
            shared,
            default_timeout,
            reaper,
        }
    }

    #[inline]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn add_listener(&self, listener: Arc<dyn TimeoutListener<K, V>>) {
        self.shared.listeners.lock().unwrap().push(listener);
    }

    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.insert_with_timeout(key, value, self.default_timeout)
    }

    /// Insert or replace, the timeout of a replaced entry restarts
    pub fn insert_with_timeout(&self, key: K, value: V, timeout: Duration) -> Option<V> {
        let entry = DelayEntry::new(key.clone(), Instant::now() + timeout);
        let mut items = self.shared.items.lock().unwrap();
        let old = items.insert(
            key,
            TimeoutItem {
                value,
                entry: Arc::clone(&entry),
            },
        );
        self.shared.queue.offer(&entry);
        drop(items);

        old.map(|item| {
            self.shared.queue.remove(&item.entry);
            item.value
        })
    }

    /// Insert only if absent, returns false if the key is already present
    pub fn try_insert(&self, key: K, value: V) -> bool {
        let mut items = self.shared.items.lock().unwrap();
        if items.contains_key(&key) {
            return false;
        }
        let entry = DelayEntry::new(key.clone(), Instant::now() + self.default_timeout);
        items.insert(
            key,
            TimeoutItem {
                value,
                entry: Arc::clone(&entry),
            },
        );
        self.shared.queue.offer(&entry);
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let item = self.shared.items.lock().unwrap().remove(key)?;
        self.shared.queue.remove(&item.entry);
        Some(item.value)
    }

    /// Push back the deadline of an existing entry
    pub fn touch(&self, key: &K, timeout: Duration) -> bool {
        let items = self.shared.items.lock().unwrap();
        let Some(item) = items.get(key) else {
            return false;
        };
        item.entry.set_deadline(Instant::now() + timeout);
        true
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let items = self.shared.items.lock().unwrap();
        items.get(key).map(|item| item.value.clone())
    }

    /// Remove every entry without notifying the listeners
    pub fn take_all(&self) -> Vec<(K, V)> {
        let mut items = self.shared.items.lock().unwrap();
        let mut all = Vec::with_capacity(items.len());
        for (key, item) in items.drain() {
            self.shared.queue.remove(&item.entry);
            all.push((key, item.value));
        }
        all
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shared.items.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shared.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries in the delay queue, which should match [`Self::len`]
    pub fn pending_deadlines(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn timeout_count(&self) -> u64 {
        self.shared.timeout_count.load(Ordering::Relaxed)
    }
}

impl<K, V> Drop for TimeoutMap<K, V> {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Mutex<Vec<(String, u32)>>);

    impl TimeoutListener<String, u32> for Recorder {
        fn on_timeout(&self, key: &String, value: &u32) {
            self.0.lock().unwrap().push((key.clone(), *value));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn evict_on_timeout() {
        let map = TimeoutMap::new(Duration::from_millis(2000));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        map.add_listener(recorder.clone());

        map.insert("a".to_string(), 1);
        map.insert_with_timeout("b".to_string(), 2, Duration::from_millis(500));
        assert_eq!(map.len(), 2);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(&"a".to_string()));
        assert_eq!(map.timeout_count(), 1);

        assert_eq!(map.remove(&"a".to_string()), Some(1));
        assert_eq!(map.pending_deadlines(), 0);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(map.timeout_count(), 1);
        assert_eq!(
            recorder.0.lock().unwrap().as_slice(),
            &[("b".to_string(), 2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn replace_restarts_deadline() {
        let map = TimeoutMap::new(Duration::from_millis(1000));
        assert!(map.try_insert(1u32, "x"));
        assert!(!map.try_insert(1u32, "y"));

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(map.insert(1u32, "z"), Some("x"));
        assert_eq!(map.pending_deadlines(), 1);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(map.contains_key(&1));

        assert!(map.touch(&1, Duration::from_millis(1000)));
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(map.contains_key(&1));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(map.is_empty());
        assert_eq!(map.timeout_count(), 1);
        assert!(!map.touch(&1, Duration::from_millis(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn take_all_silently() {
        let map = TimeoutMap::new(Duration::from_millis(1000));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        map.add_listener(recorder.clone());
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 2);
        assert_eq!(map.get(&"b".to_string()), Some(2));

        let mut all = map.take_all();
        all.sort();
        assert_eq!(all, [("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(map.pending_deadlines(), 0);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert!(recorder.0.lock().unwrap().is_empty());
    }
}
