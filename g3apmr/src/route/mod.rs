/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use log::{debug, info};

use g3_apm_proto::Metric;

use crate::destination::ArcDestination;

mod pattern;
pub use pattern::{PatternError, PatternGroup, PatternSet, compile_pattern};

#[derive(Default)]
pub struct RouteStats {
    routed: AtomicU64,
    unmatched: AtomicU64,
}

impl RouteStats {
    pub fn routed(&self) -> u64 {
        self.routed.load(Ordering::Relaxed)
    }

    pub fn unmatched(&self) -> u64 {
        self.unmatched.load(Ordering::Relaxed)
    }
}

/// Fans every metric out to each destination whose patterns match its name
pub struct Router {
    destinations: ArcSwap<Vec<ArcDestination>>,
    update_lock: Mutex<()>,
    stats: RouteStats,
}

impl Default for Router {
    fn default() -> Self {
        Router {
            destinations: ArcSwap::from_pointee(Vec::new()),
            update_lock: Mutex::new(()),
            stats: RouteStats::default(),
        }
    }
}

impl Router {
    /// Returns false if a destination with the same name exists
    pub fn register(&self, dest: ArcDestination) -> bool {
        let _guard = self.update_lock.lock().unwrap();
        let cur = self.destinations.load();
        if cur.iter().any(|d| d.name() == dest.name()) {
            return false;
        }
        info!("registered destination {}", dest.name());
        let mut new = Vec::with_capacity(cur.len() + 1);
        new.extend(cur.iter().cloned());
        new.push(dest);
        self.destinations.store(Arc::new(new));
        true
    }

    pub fn unregister(&self, name: &str) -> Option<ArcDestination> {
        let _guard = self.update_lock.lock().unwrap();
        let cur = self.destinations.load();
        let pos = cur.iter().position(|d| d.name() == name)?;
        let mut new = cur.as_ref().clone();
        let removed = new.remove(pos);
        self.destinations.store(Arc::new(new));
        debug!("unregistered destination {name}");
        Some(removed)
    }

    /// Returns how many destinations accepted the metric
    pub fn route(&self, metric: &Metric) -> usize {
        let destinations = self.destinations.load();
        let accepted = destinations
            .iter()
            .filter(|d| d.accept_route(metric))
            .count();
        if accepted > 0 {
            self.stats.routed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.unmatched.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    pub fn get(&self, name: &str) -> Option<ArcDestination> {
        self.destinations
            .load()
            .iter()
            .find(|d| d.name() == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.destinations
            .load()
            .iter()
            .map(|d| d.name().to_string())
            .collect()
    }

    pub fn all(&self) -> Arc<Vec<ArcDestination>> {
        self.destinations.load_full()
    }

    pub fn len(&self) -> usize {
        self.destinations.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn stats(&self) -> &RouteStats {
        &self.stats
    }
}
