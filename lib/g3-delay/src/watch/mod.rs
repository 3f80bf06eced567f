/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;

mod watchdog;
pub use watchdog::{ArcWatchListener, WatchListener, Watchdog};
use watchdog::WatchdogShared;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchState {
    /// Not yet checked
    Pending,
    /// Waiting for the resource to report its own state
    Callback,
    /// Must be actively polled
    Polling,
    /// Lost, reconnect is scheduled
    Disconnected,
    /// Watch withdrawn
    Cancelled,
}

impl WatchState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WatchState::Pending => "PENDING",
            WatchState::Callback => "CALLBACK",
            WatchState::Polling => "POLLING",
            WatchState::Disconnected => "DISCONNECTED",
            WatchState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource that pushes its own state and can be asked to reconnect
#[async_trait]
pub trait CallbackWatched: Send + Sync {
    fn name(&self) -> &str;
    fn period(&self) -> Duration;

    /// Try to connect, `attempts` is -1 for the immediate try after a disconnect
    async fn connect(&self, attempts: i32) -> bool;
}

/// A resource whose state can only be known by polling it
#[async_trait]
pub trait PolledWatched: Send + Sync {
    fn name(&self) -> &str;
    fn period(&self) -> Duration;

    async fn poll(&self) -> bool;

    fn poll_failed(&self) {}
}

#[derive(Clone)]
pub(crate) enum WatchTarget {
    Callback(Arc<dyn CallbackWatched>),
    Polled(Arc<dyn PolledWatched>),
}

impl WatchTarget {
    fn name(&self) -> &str {
        match self {
            WatchTarget::Callback(w) => w.name(),
            WatchTarget::Polled(w) => w.name(),
        }
    }

    fn period(&self) -> Duration {
        match self {
            WatchTarget::Callback(w) => w.period(),
            WatchTarget::Polled(w) => w.period(),
        }
    }

    fn is_polled(&self) -> bool {
        matches!(self, WatchTarget::Polled(_))
    }
}

/// State handle of one registered watch
pub struct WatchControl {
    id: u64,
    name: String,
    state: Mutex<WatchState>,
    watchdog: Weak<WatchdogShared>,
}

impl WatchControl {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock().unwrap()
    }

    /// Switch to a new state
    ///
    /// Returns false if nothing changed: the state is the same, or the watch is cancelled.
    pub fn set_state(&self, new: WatchState) -> bool {
        let old = {
            let mut state = self.state.lock().unwrap();
            let old = *state;
            if old == new || old == WatchState::Cancelled {
                return false;
            }
            *state = new;
            old
        };
        if let Some(watchdog) = self.watchdog.upgrade() {
            watchdog.on_state_change(self.id, old, new);
        }
        true
    }

    pub fn cancel(&self) -> bool {
        self.set_state(WatchState::Cancelled)
    }
}
