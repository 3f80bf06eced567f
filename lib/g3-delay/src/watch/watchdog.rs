/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use log::{debug, info};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{CallbackWatched, PolledWatched, WatchControl, WatchState, WatchTarget};
use crate::{DelayEntry, DelayQueue};

pub trait WatchListener: Send + Sync {
    fn on_state_change(&self, name: &str, old: WatchState, new: WatchState);
}

pub type ArcWatchListener = Arc<dyn WatchListener>;

struct WatchSlot {
    control: Arc<WatchControl>,
    target: WatchTarget,
    attempts: AtomicI32,
    entry: Arc<DelayEntry<u64>>,
}

pub(crate) struct WatchdogShared {
    watches: Mutex<AHashMap<u64, Arc<WatchSlot>>>,
    queue: DelayQueue<u64>,
    next_id: AtomicU64,
    listener: Option<ArcWatchListener>,
    handle: Handle,
}

impl WatchdogShared {
    fn get(&self, id: u64) -> Option<Arc<WatchSlot>> {
        self.watches.lock().unwrap().get(&id).cloned()
    }

    /// Start a new period from now
    fn schedule(&self, slot: &WatchSlot) {
        slot.entry
            .set_deadline(Instant::now() + slot.target.period());
        self.queue.offer(&slot.entry);
    }

    /// Next fixed rate period after the one that just fired
    fn reschedule(&self, slot: &WatchSlot) {
        let deadline = slot.entry.deadline() + slot.target.period();
        slot.entry.set_deadline(deadline.max(Instant::now()));
        self.queue.offer(&slot.entry);
    }

    fn unschedule(&self, slot: &WatchSlot) {
        if self.queue.remove(&slot.entry) {
            debug!("unscheduled watch task for {}", slot.control.name());
        }
    }

    pub(super) fn on_state_change(self: &Arc<Self>, id: u64, old: WatchState, new: WatchState) {
        let Some(slot) = self.get(id) else {
            return;
        };
        debug!("watch {} switched from {old} to {new}", slot.control.name());
        if let Some(listener) = &self.listener {
            listener.on_state_change(slot.control.name(), old, new);
        }

        if new == WatchState::Cancelled {
            self.unschedule(&slot);
            self.watches.lock().unwrap().remove(&id);
            return;
        }

        match &slot.target {
            WatchTarget::Polled(_) => {
                if new == WatchState::Polling {
                    self.schedule(&slot);
                    debug!("scheduled poller for {}", slot.control.name());
                } else {
                    self.unschedule(&slot);
                }
            }
            WatchTarget::Callback(w) => match new {
                WatchState::Callback => {
                    self.unschedule(&slot);
                    slot.attempts.store(0, Ordering::Relaxed);
                }
                WatchState::Disconnected => {
                    info!(
                        "watch {} disconnected, attempting immediate reconnect",
                        slot.control.name()
                    );
                    let watched = Arc::clone(w);
                    let slot = Arc::clone(&slot);
                    let shared = Arc::clone(self);
                    self.handle.spawn(async move {
                        if watched.connect(-1).await {
                            slot.control.set_state(WatchState::Callback);
                        } else if slot.control.state() == WatchState::Disconnected {
                            info!(
                                "immediate reconnect of {} failed, scheduled reconnect loop",
                                slot.control.name()
                            );
                            shared.schedule(&slot);
                        }
                    });
                }
                WatchState::Pending | WatchState::Polling | WatchState::Cancelled => {}
            },
        }
    }

    async fn run_task(self: Arc<Self>, slot: Arc<WatchSlot>) {
        match &slot.target {
            WatchTarget::Polled(w) => {
                if !w.poll().await {
                    w.poll_failed();
                }
                if slot.control.state() == WatchState::Polling {
                    self.reschedule(&slot);
                }
            }
            WatchTarget::Callback(w) => {
                let attempts = slot.attempts.load(Ordering::Relaxed);
                if w.connect(attempts).await {
                    slot.attempts.store(0, Ordering::Relaxed);
                    slot.control.set_state(WatchState::Callback);
                } else {
                    slot.attempts.fetch_add(1, Ordering::Relaxed);
                    if slot.control.state() == WatchState::Disconnected {
                        self.reschedule(&slot);
                    }
                }
            }
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            let entry = self.queue.take().await;
            let Some(slot) = self.get(*entry.value()) else {
                continue;
            };
            let shared = Arc::clone(&self);
            self.handle.spawn(shared.run_task(slot));
        }
    }
}

/// Tracks registered resources and drives their poll and reconnect schedules
pub struct Watchdog {
    shared: Arc<WatchdogShared>,
    runner: JoinHandle<()>,
}

impl Watchdog {
    /// Create and start the watchdog on the current tokio runtime
    pub fn spawn(listener: Option<ArcWatchListener>) -> Self {
        let handle = Handle::current();
        let shared = Arc::new(WatchdogShared {
            watches: Mutex::new(AHashMap::new()),
            queue: DelayQueue::default(),
            next_id: AtomicU64::new(1),
            listener,
            handle: handle.clone(),
        });
        let runner = handle.spawn(Arc::clone(&shared).run());
        Watchdog { shared, runner }
    }

    pub fn register_callback(&self, watched: Arc<dyn CallbackWatched>) -> Arc<WatchControl> {
        self.register(WatchTarget::Callback(watched))
    }

    pub fn register_polled(&self, watched: Arc<dyn PolledWatched>) -> Arc<WatchControl> {
        self.register(WatchTarget::Polled(watched))
    }

    fn register(&self, target: WatchTarget) -> Arc<WatchControl> {
        let mut watches = self.shared.watches.lock().unwrap();
        if let Some(slot) = watches
            .values()
            .find(|slot| slot.control.name() == target.name())
        {
            return Arc::clone(&slot.control);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let control = Arc::new(WatchControl {
            id,
            name: target.name().to_string(),
            state: Mutex::new(WatchState::Pending),
            watchdog: Arc::downgrade(&self.shared),
        });
        let slot = WatchSlot {
            control: Arc::clone(&control),
            target,
            attempts: AtomicI32::new(0),
            entry: DelayEntry::new(id, Instant::now()),
        };
        watches.insert(id, Arc::new(slot));
        control
    }

    pub fn watch_count(&self) -> usize {
        self.shared.watches.lock().unwrap().len()
    }

    pub fn scheduled_count(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn is_polled(&self, name: &str) -> Option<bool> {
        let watches = self.shared.watches.lock().unwrap();
        watches
            .values()
            .find(|slot| slot.control.name() == name)
            .map(|slot| slot.target.is_polled())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.runner.abort();
    }
}
