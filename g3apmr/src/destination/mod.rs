/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use g3_apm_proto::Metric;

use crate::route::{PatternError, PatternSet};

mod batch;
mod console;
mod discard;
pub use batch::{BatchDestination, BatchSink};
pub use console::ConsoleDestination;
pub use discard::DiscardDestination;

mod ops;
pub use ops::{reload, spawn_all, stop_all};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DestinationState {
    Starting = 0,
    Started = 1,
    Stopping = 2,
    Stopped = 3,
}

impl DestinationState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => DestinationState::Starting,
            1 => DestinationState::Started,
            2 => DestinationState::Stopping,
            _ => DestinationState::Stopped,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            DestinationState::Starting => "starting",
            DestinationState::Started => "started",
            DestinationState::Stopping => "stopping",
            DestinationState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DestinationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by every destination type
pub struct DestinationBase {
    name: String,
    patterns: PatternSet,
    state: AtomicU8,
    accepted: AtomicU64,
}

impl DestinationBase {
    pub fn new<S: AsRef<str>>(name: &str, patterns: &[S]) -> Result<Self, PatternError> {
        Ok(DestinationBase {
            name: name.to_string(),
            patterns: PatternSet::new(patterns)?,
            state: AtomicU8::new(DestinationState::Starting as u8),
            accepted: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn state(&self) -> DestinationState {
        DestinationState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: DestinationState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

pub trait Destination: Send + Sync {
    fn base(&self) -> &DestinationBase;
    fn destination_type(&self) -> &'static str;

    /// Called on the routing task for each matched metric
    fn on_accepted(&self, metric: &Metric);

    fn name(&self) -> &str {
        self.base().name()
    }

    fn start(&self) {
        self.base().set_state(DestinationState::Started);
    }

    /// Flush anything buffered, returns the number of metrics handed on
    fn flush(&self) -> usize {
        0
    }

    fn stop(&self) {
        self.base().set_state(DestinationState::Stopping);
        self.flush();
        self.base().set_state(DestinationState::Stopped);
    }

    fn accept_route(&self, metric: &Metric) -> bool {
        let base = self.base();
        if base.state() != DestinationState::Started {
            return false;
        }
        if !base.patterns().is_match(metric.fqn()) {
            return false;
        }
        base.accepted.fetch_add(1, Ordering::Relaxed);
        self.on_accepted(metric);
        true
    }
}

pub type ArcDestination = Arc<dyn Destination>;
