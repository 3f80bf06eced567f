/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use g3_delay::{TimeoutListener, TimeoutMap};

use super::Input;
use crate::AppContext;
use crate::config::input::udp::UdpInputConfig;
use crate::config::input::{AnyInputConfig, InputConfig};
use crate::event::Event;
use crate::handler::{AgentHandler, HandleResult};
use crate::session::{ArcSession, Session};

/// Datagram listener speaking the agent wire protocol
///
/// Each source address is a session that lives until it says bye or stays idle
/// for too long.
pub struct UdpInput {
    config: UdpInputConfig,
    local_addr: SocketAddr,
    quit_sender: broadcast::Sender<()>,
    runtime: Mutex<Option<JoinHandle<()>>>,
}

struct SessionExpire {
    ctx: Arc<AppContext>,
}

fn end_session(ctx: &AppContext, session: &ArcSession) {
    session.close();
    ctx.pending_resets().remove(&session.id());
    ctx.events().publish(Event::ConnectionClosed {
        conn_id: session.id(),
        peer: session.peer(),
    });
    ctx.stats().add_conn_closed();
}

impl TimeoutListener<SocketAddr, ArcSession> for SessionExpire {
    fn on_timeout(&self, peer: &SocketAddr, session: &ArcSession) {
        debug!("udp session #{} from {peer} idle", session.id());
        end_session(&self.ctx, session);
    }
}

struct UdpRuntime {
    name: String,
    ctx: Arc<AppContext>,
    socket: Arc<UdpSocket>,
    handler: AgentHandler,
    sessions: TimeoutMap<SocketAddr, ArcSession>,
}

impl UdpInput {
    /// Bind and start receiving, must be called inside a tokio runtime
    pub fn spawn(ctx: &Arc<AppContext>, config: UdpInputConfig) -> anyhow::Result<Arc<Self>> {
        let listen = config.listen();
        let socket = std::net::UdpSocket::bind(listen)
            .context(format!("failed to bind to {listen}"))?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;
        let local_addr = socket.local_addr()?;

        let sessions = TimeoutMap::new(ctx.config().udp_session_idle);
        sessions.add_listener(Arc::new(SessionExpire {
            ctx: Arc::clone(ctx),
        }));
        let (quit_sender, quit_receiver) = broadcast::channel(1);
        let runtime = UdpRuntime {
            name: config.name().to_string(),
            ctx: Arc::clone(ctx),
            socket: Arc::new(socket),
            handler: AgentHandler::new(Arc::clone(ctx)),
            sessions,
        };
        let handle = tokio::spawn(runtime.run(config.recv_buffer, quit_receiver));
        info!("started udp input {} at {local_addr}", config.name());
        Ok(Arc::new(UdpInput {
            config,
            local_addr,
            quit_sender,
            runtime: Mutex::new(Some(handle)),
        }))
    }
}

impl Input for UdpInput {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn input_type(&self) -> &'static str {
        self.config.input_type()
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn config(&self) -> AnyInputConfig {
        AnyInputConfig::Udp(self.config.clone())
    }

    fn abort(&self) {
        let _ = self.quit_sender.send(());
    }

    fn take_runtime(&self) -> Option<JoinHandle<()>> {
        self.runtime.lock().unwrap().take()
    }
}

impl UdpRuntime {
    async fn run(self, buf_size: usize, mut quit_receiver: broadcast::Receiver<()>) {
        let mut buf = vec![0u8; buf_size];
        loop {
            tokio::select! {
                biased;

                _ = quit_receiver.recv() => {
                    info!("udp input {} will go offline", self.name);
                    break;
                }
                r = self.socket.recv_from(&mut buf) => {
                    match r {
                        Ok((len, peer)) => self.receive_packet(&buf[..len], peer),
                        Err(e) => {
                            warn!("udp input {} error receiving data from socket: {e}", self.name);
                        }
                    }
                }
            }
        }

        for (_, session) in self.sessions.take_all() {
            end_session(&self.ctx, &session);
        }
        info!("stopped udp input {}", self.name);
    }

    fn session(&self, peer: SocketAddr) -> ArcSession {
        if let Some(session) = self.sessions.get(&peer) {
            self.sessions.touch(&peer, self.sessions.default_timeout());
            return session;
        }
        let conn_id = self.ctx.next_conn_id();
        debug!("udp input {}: new session #{conn_id} from {peer}", self.name);
        let session = Arc::new(Session::new_datagram(
            conn_id,
            peer,
            Arc::clone(&self.socket),
        ));
        self.sessions.insert(peer, Arc::clone(&session));
        self.ctx.stats().add_conn_accepted();
        session
    }

    fn receive_packet(&self, packet: &[u8], peer: SocketAddr) {
        let session = self.session(peer);
        let mut left = packet;
        while !left.is_empty() {
            let len = match g3_apm_proto::peek_message_len(left) {
                Ok(Some(len)) => len,
                Ok(None) => {
                    debug!("{peer}: dropped {} bytes of truncated message", left.len());
                    self.ctx.stats().add_malformed();
                    return;
                }
                Err(e) => {
                    debug!("{peer}: dropped {} bytes: {e}", left.len());
                    self.ctx.stats().add_malformed();
                    return;
                }
            };
            let (msg, rest) = left.split_at(len);
            left = rest;
            if self.handler.handle_message(&session, msg) == HandleResult::Close {
                if let Some(session) = self.sessions.remove(&peer) {
                    end_session(&self.ctx, &session);
                }
                return;
            }
        }
    }
}
