/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahash::AHashMap;
use log::debug;
use thiserror::Error;
use tokio::sync::oneshot;

use g3_delay::{TimeoutListener, TimeoutMap};

pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("no confirm for {0} within {1:?}")]
    Timeout(String, Duration),
    #[error("failed to send request: {0}")]
    SendFailed(String),
}

type PendingKeys = Arc<Mutex<AHashMap<String, VecDeque<String>>>>;

struct PendingWait {
    base_key: String,
    sender: oneshot::Sender<()>,
}

fn forget(pending: &PendingKeys, base_key: &str, key: &str) {
    let mut ht = pending.lock().unwrap();
    if let Some(list) = ht.get_mut(base_key) {
        list.retain(|k| k != key);
        if list.is_empty() {
            ht.remove(base_key);
        }
    }
}

struct PendingCleaner {
    pending: PendingKeys,
}

impl TimeoutListener<String, PendingWait> for PendingCleaner {
    fn on_timeout(&self, key: &String, value: &PendingWait) {
        debug!("confirm wait {key} timed out");
        forget(&self.pending, &value.base_key, key);
    }
}

/// Pairs outstanding direct sends with their confirmations
pub struct ConfirmCoordinator {
    waiters: TimeoutMap<String, PendingWait>,
    pending: PendingKeys,
    seq: AtomicU64,
}

impl ConfirmCoordinator {
    /// Must be called inside a tokio runtime
    pub fn new(timeout: Duration) -> Self {
        let waiters = TimeoutMap::new(timeout);
        let pending: PendingKeys = Arc::new(Mutex::new(AHashMap::new()));
        waiters.add_listener(Arc::new(PendingCleaner {
            pending: Arc::clone(&pending),
        }));
        ConfirmCoordinator {
            waiters,
            pending,
            seq: AtomicU64::new(1),
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.waiters.default_timeout()
    }

    /// Register a waiter before the request is sent
    ///
    /// Concurrent waits on the same base key get unique suffixed keys and are
    /// released in registration order.
    pub fn register(&self, base_key: &str) -> ConfirmWaiter {
        let key = {
            let mut ht = self.pending.lock().unwrap();
            let list = ht.entry(base_key.to_string()).or_default();
            let key = if list.is_empty() {
                base_key.to_string()
            } else {
                let seq = self.seq.fetch_add(1, Ordering::Relaxed);
                format!("{base_key}#{seq}")
            };
            list.push_back(key.clone());
            key
        };

        let (sender, receiver) = oneshot::channel();
        self.waiters.insert(
            key.clone(),
            PendingWait {
                base_key: base_key.to_string(),
                sender,
            },
        );
        ConfirmWaiter {
            key,
            base_len: base_key.len(),
            receiver,
            timeout: self.timeout(),
        }
    }

    /// Release the oldest waiter on `key`, false for a late or unknown confirm
    pub fn confirm(&self, key: &str) -> bool {
        let wait_key = {
            let mut ht = self.pending.lock().unwrap();
            let Some(list) = ht.get_mut(key) else {
                return false;
            };
            let wait_key = list.pop_front();
            if list.is_empty() {
                ht.remove(key);
            }
            wait_key
        };
        let Some(wait_key) = wait_key else {
            return false;
        };
        match self.waiters.remove(&wait_key) {
            Some(wait) => wait.sender.send(()).is_ok(),
            None => false,
        }
    }

    /// Drop a waiter whose request could not be sent
    pub fn cancel(&self, waiter: &ConfirmWaiter) {
        self.waiters.remove(&waiter.key);
        forget(&self.pending, waiter.base_key(), &waiter.key);
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    pub fn timeout_count(&self) -> u64 {
        self.waiters.timeout_count()
    }
}

pub struct ConfirmWaiter {
    key: String,
    base_len: usize,
    receiver: oneshot::Receiver<()>,
    timeout: Duration,
}

impl ConfirmWaiter {
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn base_key(&self) -> &str {
        &self.key[..self.base_len]
    }

    pub async fn wait(self) -> Result<(), ConfirmError> {
        match self.receiver.await {
            Ok(_) => Ok(()),
            // the sender is dropped when the entry is evicted
            Err(_) => Err(ConfirmError::Timeout(self.key, self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    const KEY: &str = "host1/agentA/cpu/util1000";

    #[tokio::test(start_paused = true)]
    async fn confirmed() {
        let coordinator = ConfirmCoordinator::new(DEFAULT_CONFIRM_TIMEOUT);
        let waiter = coordinator.register(KEY);
        assert_eq!(waiter.key(), KEY);
        assert_eq!(coordinator.pending(), 1);

        assert!(coordinator.confirm(KEY));
        assert_eq!(coordinator.pending(), 0);
        waiter.wait().await.unwrap();
        assert!(!coordinator.confirm(KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout() {
        let coordinator = ConfirmCoordinator::new(DEFAULT_CONFIRM_TIMEOUT);
        let waiter = coordinator.register(KEY);
        let mut task = tokio_test::task::spawn(waiter.wait());
        assert_pending!(task.poll());

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_pending!(task.poll());
        tokio::time::sleep(Duration::from_millis(2)).await;
        let r = assert_ready!(task.poll());
        assert!(matches!(r, Err(ConfirmError::Timeout(k, _)) if k == KEY));

        assert_eq!(coordinator.pending(), 0);
        assert_eq!(coordinator.timeout_count(), 1);
        // late confirm
        assert!(!coordinator.confirm(KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_in_order() {
        let coordinator = ConfirmCoordinator::new(DEFAULT_CONFIRM_TIMEOUT);
        let first = coordinator.register(KEY);
        let second = coordinator.register(KEY);
        assert_ne!(first.key(), second.key());
        assert!(second.key().starts_with(KEY));

        let mut second = tokio_test::task::spawn(second.wait());
        assert!(coordinator.confirm(KEY));
        first.wait().await.unwrap();
        assert_pending!(second.poll());
        assert!(coordinator.confirm(KEY));
        assert!(assert_ready!(second.poll()).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled() {
        let coordinator = ConfirmCoordinator::new(DEFAULT_CONFIRM_TIMEOUT);
        let waiter = coordinator.register(KEY);
        coordinator.cancel(&waiter);
        assert_eq!(coordinator.pending(), 0);
        assert!(!coordinator.confirm(KEY));
        assert!(waiter.wait().await.is_err());
    }
}
