/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::debug;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub type ConnId = u64;

/// How replies reach the remote side of a session
pub enum ReplyPath {
    /// Queue to the writer task of a stream connection
    Stream(Mutex<Option<mpsc::Sender<Bytes>>>),
    Datagram {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
    },
}

/// One remote peer, a tcp connection or a udp source address
pub struct Session {
    id: ConnId,
    peer: SocketAddr,
    reply: ReplyPath,
    identity: Mutex<Option<(String, String)>>,
    closed: AtomicBool,
}

pub type ArcSession = Arc<Session>;

impl Session {
    pub fn new_stream(id: ConnId, peer: SocketAddr, sender: mpsc::Sender<Bytes>) -> Self {
        Session {
            id,
            peer,
            reply: ReplyPath::Stream(Mutex::new(Some(sender))),
            identity: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn new_datagram(id: ConnId, peer: SocketAddr, socket: Arc<UdpSocket>) -> Self {
        Session {
            id,
            peer,
            reply: ReplyPath::Datagram { socket, peer },
            identity: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> ConnId {
        self.id
    }

    #[inline]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn set_identity(&self, host: String, agent: String) {
        debug!("session {} from {} is {host}/{agent}", self.id, self.peer);
        *self.identity.lock().unwrap() = Some((host, agent));
    }

    pub fn identity(&self) -> Option<(String, String)> {
        self.identity.lock().unwrap().clone()
    }

    /// Queue data for the peer, false if it can not be queued now
    pub fn send(&self, data: Bytes) -> bool {
        if self.is_closed() {
            return false;
        }
        match &self.reply {
            ReplyPath::Stream(sender) => {
                let guard = sender.lock().unwrap();
                let Some(sender) = guard.as_ref() else {
                    return false;
                };
                match sender.try_send(data) {
                    Ok(_) => true,
                    Err(e) => {
                        debug!("session {} failed to queue reply: {e}", self.id);
                        false
                    }
                }
            }
            ReplyPath::Datagram { socket, peer } => match socket.try_send_to(&data, *peer) {
                Ok(_) => true,
                Err(e) => {
                    debug!("session {} failed to send datagram: {e}", self.id);
                    false
                }
            },
        }
    }

    /// Stop accepting replies, the stream writer ends after draining
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let ReplyPath::Stream(sender) = &self.reply {
            sender.lock().unwrap().take();
        }
        true
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_reply() {
        let (sender, mut receiver) = mpsc::channel(2);
        let peer = SocketAddr::from(([127, 0, 0, 1], 9000));
        let session = Session::new_stream(7, peer, sender);
        assert!(session.send(Bytes::from_static(b"a")));
        assert!(session.send(Bytes::from_static(b"b")));
        assert!(!session.send(Bytes::from_static(b"c")));
        assert!(session.close());
        assert!(!session.close());
        assert!(!session.send(Bytes::from_static(b"d")));

        assert_eq!(receiver.recv().await.unwrap(), Bytes::from_static(b"a"));
        assert_eq!(receiver.recv().await.unwrap(), Bytes::from_static(b"b"));
        assert!(receiver.recv().await.is_none());
    }
}
