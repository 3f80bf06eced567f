/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;
use tokio::time::Instant;

type OrderKey = (Instant, u64);

#[derive(Debug)]
struct Enrollment<T> {
    queue: Weak<QueueShared<T>>,
    key: OrderKey,
}

#[derive(Debug)]
struct EntrySlot<T> {
    deadline: Instant,
    enrolled: Option<Enrollment<T>>,
}

/// An item with a deadline that may be changed while it is enrolled in a [`DelayQueue`]
#[derive(Debug)]
pub struct DelayEntry<T> {
    value: T,
    slot: Mutex<EntrySlot<T>>,
}

impl<T> DelayEntry<T> {
    pub fn new(value: T, deadline: Instant) -> Arc<Self> {
        Arc::new(DelayEntry {
            value,
            slot: Mutex::new(EntrySlot {
                deadline,
                enrolled: None,
            }),
        })
    }

    #[inline]
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn deadline(&self) -> Instant {
        self.slot.lock().unwrap().deadline
    }

    pub fn is_enrolled(&self) -> bool {
        self.slot.lock().unwrap().enrolled.is_some()
    }

    /// Change the deadline, the containing queue will be resorted if there is one
    ///
    /// On an entry that has been taken or removed this only updates the stored value.
    pub fn set_deadline(self: &Arc<Self>, deadline: Instant) {
        loop {
            let queue = {
                let mut slot = self.slot.lock().unwrap();
                match &slot.enrolled {
                    Some(e) => e.queue.upgrade(),
                    None => {
                        slot.deadline = deadline;
                        return;
                    }
                }
            };
            match queue {
                Some(shared) => {
                    if shared.notify_deadline_changed(self, deadline) {
                        return;
                    }
                    // detached in the meantime, retry as a plain update
                }
                None => {
                    // the queue is gone
                    let mut slot = self.slot.lock().unwrap();
                    slot.enrolled = None;
                    slot.deadline = deadline;
                    return;
                }
            }
        }
    }
}

struct QueueState<T> {
    order: BTreeMap<OrderKey, Arc<DelayEntry<T>>>,
    next_seq: u64,
}

struct QueueShared<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> QueueShared<T> {
    fn owns(&self, e: &Enrollment<T>) -> bool {
        std::ptr::eq(e.queue.as_ptr(), self)
    }

    /// Atomically move `entry` to its new position
    ///
    /// Returns false if the entry is not enrolled in this queue any more.
    fn notify_deadline_changed(&self, entry: &Arc<DelayEntry<T>>, deadline: Instant) -> bool {
        let mut state = self.state.lock().unwrap();
        let mut slot = entry.slot.lock().unwrap();
        let Some(e) = slot.enrolled.as_mut() else {
            return false;
        };
        if !self.owns(e) {
            return false;
        }

        let old_key = e.key;
        state.order.remove(&old_key);
        let new_key = (deadline, state.next_seq);
        state.next_seq += 1;
        state.order.insert(new_key, Arc::clone(entry));
        e.key = new_key;
        slot.deadline = deadline;
        drop(slot);
        drop(state);

        self.notify.notify_waiters();
        true
    }

    fn pop_expired(&self, now: Instant) -> Result<Arc<DelayEntry<T>>, Option<Instant>> {
        let mut state = self.state.lock().unwrap();
        let Some((key, _)) = state.order.first_key_value() else {
            return Err(None);
        };
        if key.0 > now {
            return Err(Some(key.0));
        }
        let Some((_, entry)) = state.order.pop_first() else {
            return Err(None);
        };
        entry.slot.lock().unwrap().enrolled = None;
        Ok(entry)
    }
}

/// Priority queue of [`DelayEntry`] ordered by deadline
pub struct DelayQueue<T> {
    shared: Arc<QueueShared<T>>,
}

impl<T> Clone for DelayQueue<T> {
    fn clone(&self) -> Self {
        DelayQueue {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        DelayQueue {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    order: BTreeMap::new(),
                    next_seq: 0,
                }),
                notify: Notify::new(),
            }),
        }
    }
}

impl<T> DelayQueue<T> {
    /// Enroll the entry, returns false if it is already enrolled somewhere
    pub fn offer(&self, entry: &Arc<DelayEntry<T>>) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        let mut slot = entry.slot.lock().unwrap();
        if slot.enrolled.is_some() {
            return false;
        }
        let key = (slot.deadline, state.next_seq);
        state.next_seq += 1;
        state.order.insert(key, Arc::clone(entry));
        slot.enrolled = Some(Enrollment {
            queue: Arc::downgrade(&self.shared),
            key,
        });
        drop(slot);
        drop(state);

        self.shared.notify.notify_waiters();
        true
    }

    /// Remove the entry before it expires, returns false if it is not enrolled here
    pub fn remove(&self, entry: &Arc<DelayEntry<T>>) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        let mut slot = entry.slot.lock().unwrap();
        let Some(e) = &slot.enrolled else {
            return false;
        };
        if !self.shared.owns(e) {
            return false;
        }
        state.order.remove(&e.key);
        slot.enrolled = None;
        true
    }

    /// Take an expired entry without waiting
    pub fn poll(&self) -> Option<Arc<DelayEntry<T>>> {
        self.shared.pop_expired(Instant::now()).ok()
    }

    /// Wait until the head entry expires and take it
    pub async fn take(&self) -> Arc<DelayEntry<T>> {
        loop {
            let notified = self.shared.notify.notified();
            match self.shared.pop_expired(Instant::now()) {
                Ok(entry) => return entry,
                Err(Some(deadline)) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                Err(None) => notified.await,
            }
        }
    }

    pub fn peek_deadline(&self) -> Option<Instant> {
        let state = self.shared.state.lock().unwrap();
        state.order.first_key_value().map(|(k, _)| k.0)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Detach and return all entries in deadline order
    pub fn drain(&self) -> Vec<Arc<DelayEntry<T>>> {
        let mut state = self.shared.state.lock().unwrap();
        let order = std::mem::take(&mut state.order);
        order
            .into_values()
            .inspect(|entry| entry.slot.lock().unwrap().enrolled = None)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready};

    #[tokio::test(start_paused = true)]
    async fn ordered_take() {
        let queue = DelayQueue::default();
        let now = Instant::now();
        let a = DelayEntry::new("a", now + Duration::from_millis(300));
        let b = DelayEntry::new("b", now + Duration::from_millis(100));
        let c = DelayEntry::new("c", now + Duration::from_millis(200));
        assert!(queue.offer(&a));
        assert!(queue.offer(&b));
        assert!(queue.offer(&c));
        assert!(!queue.offer(&c));
        assert!(queue.poll().is_none());

        assert_eq!(*queue.take().await.value(), "b");
        assert_eq!(*queue.take().await.value(), "c");
        assert_eq!(*queue.take().await.value(), "a");
        assert!(queue.is_empty());
        assert!(!a.is_enrolled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_change_resorts() {
        let queue = DelayQueue::default();
        let now = Instant::now();
        let a = DelayEntry::new(1, now + Duration::from_secs(10));
        let b = DelayEntry::new(2, now + Duration::from_secs(5));
        queue.offer(&a);
        queue.offer(&b);
        assert_eq!(queue.peek_deadline(), Some(now + Duration::from_secs(5)));

        a.set_deadline(now + Duration::from_secs(1));
        assert_eq!(queue.peek_deadline(), Some(now + Duration::from_secs(1)));
        assert_eq!(queue.len(), 2);
        assert_eq!(*queue.take().await.value(), 1);
        assert!(Instant::now() >= now + Duration::from_secs(1));
        assert!(Instant::now() < now + Duration::from_secs(5));

        b.set_deadline(now + Duration::from_secs(20));
        assert_eq!(queue.peek_deadline(), Some(now + Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn detached_entry_is_safe() {
        let queue = DelayQueue::default();
        let now = Instant::now();
        let a = DelayEntry::new((), now);
        queue.offer(&a);
        let taken = queue.poll().unwrap();
        assert!(Arc::ptr_eq(&taken, &a));

        // no longer enrolled, only the stored value changes
        a.set_deadline(now + Duration::from_secs(1));
        assert!(queue.is_empty());
        assert_eq!(a.deadline(), now + Duration::from_secs(1));

        let b = DelayEntry::new((), now + Duration::from_secs(1));
        queue.offer(&b);
        assert!(queue.remove(&b));
        assert!(!queue.remove(&b));
        b.set_deadline(now);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wake_on_earlier_deadline() {
        let queue = DelayQueue::default();
        let now = Instant::now();
        let a = DelayEntry::new("late", now + Duration::from_secs(60));
        queue.offer(&a);

        let mut take = tokio_test::task::spawn(queue.take());
        assert_pending!(take.poll());

        a.set_deadline(now);
        assert!(take.is_woken());
        let entry = assert_ready!(take.poll());
        assert_eq!(*entry.value(), "late");
    }

    #[tokio::test]
    async fn not_enrolled_in_other_queue() {
        let q1 = DelayQueue::default();
        let q2 = DelayQueue::default();
        let a = DelayEntry::new(0, Instant::now());
        q1.offer(&a);
        assert!(!q2.offer(&a));
        assert!(!q2.remove(&a));
        assert_eq!(q1.drain().len(), 1);
        assert!(q2.offer(&a));
    }
}
