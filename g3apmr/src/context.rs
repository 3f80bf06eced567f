/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use g3_apm_proto::{ArcMetricCatalog, MemoryCatalog, MetricCatalog};
use g3_delay::TimeoutMap;
use g3_delay::watch::{ArcWatchListener, Watchdog};

use crate::config::router::RouterConfig;
use crate::event::EventBus;
use crate::route::Router;
use crate::session::ConnId;
use crate::subscribe::SubscriptionService;

macro_rules! counters {
    ($($name:ident),+ $(,)?) => {
        #[derive(Default)]
        pub struct RouterStats {
            $($name: AtomicU64,)+
        }

        impl RouterStats {
            $(
                pub fn $name(&self) -> u64 {
                    self.$name.load(Ordering::Relaxed)
                }
            )+

            /// Plain text `name value` lines
            pub fn format_text(&self, out: &mut String) {
                $(
                    let _ = writeln!(out, "{} {}", stringify!($name), self.$name());
                )+
            }
        }
    };
}

counters!(
    conn_accepted,
    conn_closed,
    frames,
    records,
    malformed,
    unknown_token,
    resets_sent,
    text_lines,
    xml_elements,
);

impl RouterStats {
    pub(crate) fn add_conn_accepted(&self) {
        self.conn_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_conn_closed(&self) {
        self.conn_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_frame(&self, records: usize) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_unknown_token(&self) {
        self.unknown_token.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_reset_sent(&self) {
        self.resets_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_text_line(&self) {
        self.text_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_xml_element(&self) {
        self.xml_elements.fetch_add(1, Ordering::Relaxed);
    }
}

/// Everything a connection needs, built once at startup
pub struct AppContext {
    config: Arc<RouterConfig>,
    router: Arc<Router>,
    catalog: ArcMetricCatalog,
    subscriptions: Arc<SubscriptionService>,
    events: Arc<EventBus>,
    watchdog: Watchdog,
    pending_resets: TimeoutMap<ConnId, ()>,
    stats: RouterStats,
    conn_seq: AtomicU64,
}

impl AppContext {
    /// Must be called inside a tokio runtime
    pub fn new(config: Arc<RouterConfig>) -> Arc<Self> {
        let catalog: ArcMetricCatalog = Arc::new(MemoryCatalog::new(config.first_token));
        AppContext::with_catalog(config, catalog)
    }

    pub fn with_catalog(config: Arc<RouterConfig>, catalog: ArcMetricCatalog) -> Arc<Self> {
        let events = Arc::new(EventBus::default());
        let listener: ArcWatchListener = events.clone();
        let watchdog = Watchdog::spawn(Some(listener));
        let router = Arc::new(Router::default());
        let subscriptions = Arc::new(SubscriptionService::new(
            Arc::clone(&router),
            config.subscription.clone(),
        ));
        subscriptions.start(&events);
        let pending_resets = TimeoutMap::new(config.reset_timeout);
        Arc::new(AppContext {
            config,
            router,
            catalog,
            subscriptions,
            events,
            watchdog,
            pending_resets,
            stats: RouterStats::default(),
            conn_seq: AtomicU64::new(1),
        })
    }

    #[inline]
    pub fn config(&self) -> &Arc<RouterConfig> {
        &self.config
    }

    #[inline]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    #[inline]
    pub fn catalog(&self) -> &ArcMetricCatalog {
        &self.catalog
    }

    #[inline]
    pub fn subscriptions(&self) -> &Arc<SubscriptionService> {
        &self.subscriptions
    }

    #[inline]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    #[inline]
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Remotes that have been sent RESET and not yet confirmed
    #[inline]
    pub fn pending_resets(&self) -> &TimeoutMap<ConnId, ()> {
        &self.pending_resets
    }

    #[inline]
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn next_conn_id(&self) -> ConnId {
        self.conn_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Router wide statistics in plain text
    pub fn stats_text(&self) -> String {
        let mut out = String::with_capacity(512);
        self.stats.format_text(&mut out);
        let route = self.router.stats();
        let _ = writeln!(out, "routed {}", route.routed());
        let _ = writeln!(out, "unmatched {}", route.unmatched());
        let _ = writeln!(out, "destinations {}", self.router.len());
        let _ = writeln!(out, "subscriptions {}", self.subscriptions.count());
        let _ = writeln!(out, "catalog_size {}", self.catalog.len());
        let _ = writeln!(out, "watches {}", self.watchdog.watch_count());
        out
    }
}
