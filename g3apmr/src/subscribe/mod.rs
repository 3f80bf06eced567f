/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::{AHashMap, AHashSet};
use log::{debug, info};

use crate::accumulate::AccumulatorConfig;
use crate::destination::Destination;
use crate::event::{Event, EventBus, EventKind};
use crate::route::{PatternError, Router};
use crate::session::{ArcSession, ConnId};

mod destination;
pub use destination::SubscriptionDestination;

#[derive(Default)]
struct SubscriptionTable {
    by_id: AHashMap<i64, ConnId>,
    by_conn: AHashMap<ConnId, AHashSet<i64>>,
}

/// Subscriptions requested by connected peers
pub struct SubscriptionService {
    router: Arc<Router>,
    config: AccumulatorConfig,
    next_id: AtomicI64,
    table: Mutex<SubscriptionTable>,
}

impl SubscriptionService {
    pub fn new(router: Arc<Router>, config: AccumulatorConfig) -> Self {
        SubscriptionService {
            router,
            config,
            next_id: AtomicI64::new(1),
            table: Mutex::new(SubscriptionTable::default()),
        }
    }

    /// Drop all subscriptions of a connection once it is closed
    pub fn start(self: &Arc<Self>, events: &EventBus) -> u64 {
        let service = Arc::downgrade(self);
        events.subscribe(
            EventKind::ConnectionClosed,
            Arc::new(move |event: &Event| {
                if let Event::ConnectionClosed { conn_id, .. } = event
                    && let Some(service) = service.upgrade()
                {
                    service.close_connection(*conn_id);
                }
            }),
        )
    }

    /// Must be called inside a tokio runtime
    pub fn subscribe<S: AsRef<str>>(
        &self,
        session: &ArcSession,
        patterns: &[S],
    ) -> Result<i64, PatternError> {
        let sub_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let dest = SubscriptionDestination::spawn(
            sub_id,
            Arc::clone(session),
            patterns,
            self.config.clone(),
        )?;
        dest.start();

        {
            let mut table = self.table.lock().unwrap();
            table.by_id.insert(sub_id, session.id());
            table.by_conn.entry(session.id()).or_default().insert(sub_id);
        }
        self.router.register(Arc::new(dest));
        info!(
            "subscription {sub_id} added for connection {} from {}",
            session.id(),
            session.peer()
        );

        if session.is_closed() {
            // raced with the close event
            self.stop_subscription(sub_id);
        }
        Ok(sub_id)
    }

    fn remove_destination(&self, sub_id: i64) {
        if let Some(dest) = self
            .router
            .unregister(&SubscriptionDestination::name_of(sub_id))
        {
            dest.stop();
        }
    }

    /// Returns false if it is already gone
    pub fn stop_subscription(&self, sub_id: i64) -> bool {
        {
            let mut table = self.table.lock().unwrap();
            let Some(conn_id) = table.by_id.remove(&sub_id) else {
                return false;
            };
            if let Some(set) = table.by_conn.get_mut(&conn_id) {
                set.remove(&sub_id);
                if set.is_empty() {
                    table.by_conn.remove(&conn_id);
                }
            }
        }
        self.remove_destination(sub_id);
        debug!("subscription {sub_id} stopped");
        true
    }

    /// Returns the number of subscriptions removed
    pub fn close_connection(&self, conn_id: ConnId) -> usize {
        let ids = {
            let mut table = self.table.lock().unwrap();
            let Some(ids) = table.by_conn.remove(&conn_id) else {
                return 0;
            };
            for id in &ids {
                table.by_id.remove(id);
            }
            ids
        };
        for id in &ids {
            self.remove_destination(*id);
        }
        if !ids.is_empty() {
            info!(
                "removed {} subscriptions of closed connection {conn_id}",
                ids.len()
            );
        }
        ids.len()
    }

    pub fn count(&self) -> usize {
        self.table.lock().unwrap().by_id.len()
    }

    pub fn stop_all(&self) {
        let ids: Vec<i64> = {
            let table = self.table.lock().unwrap();
            table.by_id.keys().copied().collect()
        };
        for id in ids {
            self.stop_subscription(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::str::FromStr;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::mpsc;

    use g3_apm_proto::{Metric, MetricName, MetricType, MetricValue, codec};

    use crate::session::Session;

    fn service() -> (Arc<Router>, Arc<SubscriptionService>) {
        let router = Arc::new(Router::default());
        let config = AccumulatorConfig::new(1, Duration::from_secs(1));
        let service = Arc::new(SubscriptionService::new(router.clone(), config));
        (router, service)
    }

    fn session(id: ConnId) -> (ArcSession, mpsc::Receiver<Bytes>) {
        let (sender, receiver) = mpsc::channel(16);
        let peer = SocketAddr::from(([127, 0, 0, 1], 9000));
        (Arc::new(Session::new_stream(id, peer, sender)), receiver)
    }

    #[tokio::test]
    async fn teardown_on_close() {
        let (router, service) = service();
        let events = EventBus::default();
        service.start(&events);

        let (s1, _r1) = session(1);
        let (s2, _r2) = session(2);
        let ids: Vec<i64> = (0..3)
            .map(|_| service.subscribe(&s1, &["h/**"]).unwrap())
            .collect();
        assert_eq!(ids, [1, 2, 3]);
        let other = service.subscribe(&s2, &["h/**"]).unwrap();
        assert_eq!(router.len(), 4);

        events.publish(Event::ConnectionClosed {
            conn_id: 1,
            peer: s1.peer(),
        });
        assert_eq!(router.names(), [SubscriptionDestination::name_of(other)]);
        assert_eq!(service.count(), 1);
        assert_eq!(service.close_connection(1), 0);

        assert!(service.stop_subscription(other));
        assert!(!service.stop_subscription(other));
        assert!(router.is_empty());
    }

    #[tokio::test]
    async fn deliver() {
        let (router, service) = service();
        let (s1, mut r1) = session(1);
        service.subscribe(&s1, &["h/*/cpu"]).unwrap();
        assert!(matches!(
            service.subscribe(&s1, &["re:("]),
            Err(PatternError::Compile(_, _))
        ));

        let name = Arc::new(MetricName::from_str("h/a/cpu").unwrap());
        let metric =
            Metric::new(name, MetricType::LongGauge, MetricValue::Long(7), 1000).unwrap();
        assert_eq!(router.route(&metric), 1);

        let frame = r1.recv().await.unwrap();
        let frame = codec::decode(&frame).unwrap();
        assert_eq!(frame.records.len(), 1);
        assert_eq!(frame.records[0].value, MetricValue::Long(7));
    }
}
