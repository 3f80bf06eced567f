/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use log::trace;

use g3_delay::watch::{WatchListener, WatchState};

use crate::session::ConnId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    ConnectionClosed,
    WatchStateChanged,
}

#[derive(Clone, Debug)]
pub enum Event {
    ConnectionClosed {
        conn_id: ConnId,
        peer: SocketAddr,
    },
    WatchStateChanged {
        name: String,
        old: WatchState,
        new: WatchState,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ConnectionClosed { .. } => EventKind::ConnectionClosed,
            Event::WatchStateChanged { .. } => EventKind::WatchStateChanged,
        }
    }
}

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle_event(&self, event: &Event) {
        self(event)
    }
}

pub type ArcEventHandler = Arc<dyn EventHandler>;

type HandlerList = Vec<(u64, ArcEventHandler)>;

/// Typed publish and subscribe between loosely coupled components
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<AHashMap<EventKind, HandlerList>>,
    next_token: AtomicU64,
}

impl EventBus {
    /// Returns a token for [`EventBus::unsubscribe`]
    pub fn subscribe(&self, kind: EventKind, handler: ArcEventHandler) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let mut ht = self.handlers.lock().unwrap();
        ht.entry(kind).or_default().push((token, handler));
        token
    }

    pub fn unsubscribe(&self, token: u64) -> bool {
        let mut ht = self.handlers.lock().unwrap();
        for list in ht.values_mut() {
            if let Some(pos) = list.iter().position(|(t, _)| *t == token) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn publish(&self, event: Event) {
        let handlers: Vec<ArcEventHandler> = {
            let ht = self.handlers.lock().unwrap();
            match ht.get(&event.kind()) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };
        trace!("publish {:?} to {} handlers", event.kind(), handlers.len());
        for h in handlers {
            h.handle_event(&event);
        }
    }
}

impl WatchListener for EventBus {
    fn on_state_change(&self, name: &str, old: WatchState, new: WatchState) {
        self.publish(Event::WatchStateChanged {
            name: name.to_string(),
            old,
            new,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn subscribe_by_kind() {
        let bus = EventBus::default();
        let closed = Arc::new(AtomicUsize::new(0));
        let c = closed.clone();
        let token = bus.subscribe(
            EventKind::ConnectionClosed,
            Arc::new(move |_: &Event| {
                c.fetch_add(1, Ordering::Relaxed);
            }),
        );

        let peer = SocketAddr::from(([127, 0, 0, 1], 9000));
        bus.publish(Event::ConnectionClosed { conn_id: 1, peer });
        bus.on_state_change("agent", WatchState::Pending, WatchState::Callback);
        assert_eq!(closed.load(Ordering::Relaxed), 1);

        assert!(bus.unsubscribe(token));
        assert!(!bus.unsubscribe(token));
        bus.publish(Event::ConnectionClosed { conn_id: 2, peer });
        assert_eq!(closed.load(Ordering::Relaxed), 1);
    }
}
