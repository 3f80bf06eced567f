/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use bytes::BytesMut;
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::Input;
use crate::AppContext;
use crate::config::input::tcp::TcpInputConfig;
use crate::config::input::{AnyInputConfig, InputConfig};
use crate::event::Event;
use crate::session::{ArcSession, Session};
use crate::stage::{MuxStage, ProtocolRegistry, StageAction, StageList, build_registry};

const READ_BUFFER_SIZE: usize = 16 << 10;

/// Stream listener, every connection starts with protocol detection
pub struct TcpInput {
    config: TcpInputConfig,
    local_addr: SocketAddr,
    quit_sender: broadcast::Sender<()>,
    runtime: Mutex<Option<JoinHandle<()>>>,
}

struct TcpRuntime {
    name: String,
    ctx: Arc<AppContext>,
    protocols: Arc<ProtocolRegistry>,
}

impl TcpInput {
    /// Bind and start accepting, must be called inside a tokio runtime
    pub fn spawn(ctx: &Arc<AppContext>, config: TcpInputConfig) -> anyhow::Result<Arc<Self>> {
        let router_config = ctx.config();
        let protocols = build_registry(
            &config.protocols,
            router_config.default_protocol.as_deref(),
            router_config.mux.clone(),
        )
        .context(format!("invalid protocols for input {}", config.name()))?;

        let listen = config.listen();
        let socket = if listen.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }?;
        socket.set_reuseaddr(true)?;
        socket
            .bind(listen)
            .context(format!("failed to bind to {listen}"))?;
        let listener = socket.listen(config.listen_backlog)?;
        let local_addr = listener.local_addr()?;

        let (quit_sender, quit_receiver) = broadcast::channel(1);
        let runtime = TcpRuntime {
            name: config.name().to_string(),
            ctx: Arc::clone(ctx),
            protocols,
        };
        let handle = tokio::spawn(runtime.run(listener, quit_receiver));
        info!("started tcp input {} at {local_addr}", config.name());
        Ok(Arc::new(TcpInput {
            config,
            local_addr,
            quit_sender,
            runtime: Mutex::new(Some(handle)),
        }))
    }
}

impl Input for TcpInput {
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
        AnyInputConfig::Tcp(self.config.clone())
    }

    fn abort(&self) {
        let _ = self.quit_sender.send(());
    }

    fn take_runtime(&self) -> Option<JoinHandle<()>> {
        self.runtime.lock().unwrap().take()
    }
}

impl TcpRuntime {
    async fn run(self, listener: TcpListener, mut quit_receiver: broadcast::Receiver<()>) {
        let runtime = Arc::new(self);
        loop {
            tokio::select! {
                biased;

                _ = quit_receiver.recv() => {
                    info!("tcp input {} will go offline", runtime.name);
                    break;
                }
                r = listener.accept() => {
                    match r {
                        Ok((stream, peer)) => {
                            runtime.ctx.stats().add_conn_accepted();
                            let runtime = Arc::clone(&runtime);
                            tokio::spawn(async move {
                                runtime.serve(stream, peer).await;
                            });
                        }
                        Err(e) => {
                            warn!("tcp input {} accept: {e}", runtime.name);
                        }
                    }
                }
            }
        }
        info!("stopped tcp input {}", runtime.name);
    }

    async fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        let ctx = &self.ctx;
        let conn_id = ctx.next_conn_id();
        debug!("tcp input {}: connection #{conn_id} from {peer}", self.name);
        if let Err(e) = stream.set_nodelay(true) {
            warn!("tcp input {}: failed to set nodelay for {peer}: {e}", self.name);
        }
        let (mut reader, mut writer) = stream.into_split();

        let (sender, mut receiver) = mpsc::channel(ctx.config().reply_queue_size);
        let session: ArcSession = Arc::new(Session::new_stream(conn_id, peer, sender));
        let write_task = tokio::spawn(async move {
            while let Some(data) = receiver.recv().await {
                if let Err(e) = writer.write_all(&data).await {
                    debug!("write to {peer} failed: {e}");
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        let mut stages =
            StageList::new().with(MuxStage::new(Arc::clone(ctx), Arc::clone(&self.protocols)));
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        'read: loop {
            buf.reserve(READ_BUFFER_SIZE);
            match reader.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let mut data = buf.split().freeze();
                    loop {
                        match stages.feed(&session, data) {
                            StageAction::Continue => break,
                            StageAction::Rewire(list, replay) => {
                                debug!("{peer}: rewired to stages {:?}", list.names());
                                stages = list;
                                if replay.is_empty() {
                                    break;
                                }
                                data = replay;
                            }
                            StageAction::Close => break 'read,
                        }
                    }
                }
                Err(e) => {
                    debug!("read from {peer} failed: {e}");
                    break;
                }
            }
        }

        session.close();
        let _ = write_task.await;
        ctx.pending_resets().remove(&conn_id);
        ctx.events().publish(Event::ConnectionClosed { conn_id, peer });
        ctx.stats().add_conn_closed();
        debug!("tcp input {}: connection #{conn_id} closed", self.name);
    }
}
