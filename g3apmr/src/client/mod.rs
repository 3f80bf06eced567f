/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io;
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use ahash::AHashMap;
use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use g3_apm_proto::codec;
use g3_apm_proto::metric::TOKEN_UNKNOWN;
use g3_apm_proto::{
    ByteOrder, ControlMessage, Metric, MetricRecord, OpCode, RecordIdent, TokenCache,
};
use g3_delay::watch::{CallbackWatched, PolledWatched, WatchControl, WatchState};

use crate::config::watch::WatchConfig;
use crate::confirm::{ConfirmCoordinator, ConfirmError};

const MAX_RECORDS_PER_DATAGRAM: usize = 64;
const RECV_BUFFER_SIZE: usize = 65536;

#[derive(Default)]
pub struct ClientStats {
    sent: AtomicU64,
    resets: AtomicU64,
    replies: AtomicU64,
}

impl ClientStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    pub fn replies(&self) -> u64 {
        self.replies.load(Ordering::Relaxed)
    }
}

/// Agent side of the wire protocol over udp
///
/// Sends metrics to a router, keeping the tokens it hands out so that later sends
/// carry the token instead of the full name.
pub struct AgentClient {
    name: String,
    ping_name: String,
    remote: SocketAddr,
    socket: Arc<UdpSocket>,
    order: ByteOrder,
    identity: Mutex<(String, String)>,
    tokens: TokenCache,
    confirms: ConfirmCoordinator,
    hello_waiter: Mutex<Option<oneshot::Sender<()>>>,
    ping_waiters: Mutex<AHashMap<i64, oneshot::Sender<()>>>,
    ping_seq: AtomicI64,
    reconnect_period: Duration,
    poll_period: Duration,
    reply_timeout: Duration,
    control: Mutex<Option<Arc<WatchControl>>>,
    stats: ClientStats,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl AgentClient {
    pub async fn connect(
        name: &str,
        remote: SocketAddr,
        watch: &WatchConfig,
        confirm_timeout: Duration,
    ) -> io::Result<Arc<Self>> {
        let bind = if remote.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(remote).await?;
        let socket = Arc::new(socket);

        let client = Arc::new(AgentClient {
            name: name.to_string(),
            ping_name: format!("{name}/ping"),
            remote,
            socket: Arc::clone(&socket),
            order: ByteOrder::native(),
            identity: Mutex::new(("g3apmr".to_string(), name.to_string())),
            tokens: TokenCache::default(),
            confirms: ConfirmCoordinator::new(confirm_timeout),
            hello_waiter: Mutex::new(None),
            ping_waiters: Mutex::new(AHashMap::new()),
            ping_seq: AtomicI64::new(1),
            reconnect_period: watch.reconnect_period,
            poll_period: watch.poll_period,
            reply_timeout: watch.connect_timeout,
            control: Mutex::new(None),
            stats: ClientStats::default(),
            reader: Mutex::new(None),
        });
        let reader = tokio::spawn(run_reader(Arc::downgrade(&client), socket));
        *client.reader.lock().unwrap() = Some(reader);
        debug!("client {name} connected to {remote}");
        Ok(client)
    }

    #[inline]
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    #[inline]
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    #[inline]
    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    #[inline]
    pub fn pending_confirms(&self) -> usize {
        self.confirms.pending()
    }

    /// Host and agent names reported on WHO
    pub fn set_identity(&self, host: &str, agent: &str) {
        *self.identity.lock().unwrap() = (host.to_string(), agent.to_string());
    }

    /// The connection watch, told about disconnects seen by this client
    pub fn attach_control(&self, control: Arc<WatchControl>) {
        *self.control.lock().unwrap() = Some(control);
    }

    fn mark_disconnected(&self) {
        let control = self.control.lock().unwrap().clone();
        if let Some(control) = control
            && control.state() == WatchState::Callback
        {
            info!("client {} lost connection to {}", self.name, self.remote);
            control.set_state(WatchState::Disconnected);
        }
    }

    fn record_of(&self, metric: &Metric) -> MetricRecord {
        let mut record = metric.to_named_record();
        let token = self.tokens.get(metric.fqn());
        if token != TOKEN_UNKNOWN {
            record.ident = RecordIdent::Token(token);
        }
        record
    }

    fn send_control(&self, msg: &ControlMessage) -> io::Result<()> {
        self.socket.try_send(&msg.encode())?;
        Ok(())
    }

    /// Send a batch, split over as many datagrams as needed
    pub fn send(&self, metrics: &[Metric]) -> io::Result<usize> {
        for chunk in metrics.chunks(MAX_RECORDS_PER_DATAGRAM) {
            let records: Vec<MetricRecord> = chunk.iter().map(|m| self.record_of(m)).collect();
            let frame = codec::encode(OpCode::SendMetric, self.order, &records);
            self.socket.try_send(&frame)?;
            self.stats
                .sent
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
        Ok(metrics.len())
    }

    /// Send one metric and wait for the router to confirm it
    pub async fn send_direct(&self, metric: &Metric) -> Result<(), ConfirmError> {
        let waiter = self.confirms.register(&metric.confirm_key());
        let frame = codec::encode(
            OpCode::SendMetricDirect,
            self.order,
            &[self.record_of(metric)],
        );
        if let Err(e) = self.socket.send(&frame).await {
            self.confirms.cancel(&waiter);
            return Err(ConfirmError::SendFailed(e.to_string()));
        }
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        waiter.wait().await
    }

    pub async fn ping(&self) -> bool {
        let key = self.ping_seq.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.ping_waiters.lock().unwrap().insert(key, sender);
        if let Err(e) = self.send_control(&ControlMessage::Ping { key }) {
            debug!("client {} failed to send ping: {e}", self.name);
            self.ping_waiters.lock().unwrap().remove(&key);
            return false;
        }
        let r = tokio::time::timeout(self.reply_timeout, receiver).await;
        self.ping_waiters.lock().unwrap().remove(&key);
        matches!(r, Ok(Ok(_)))
    }

    pub async fn hello(&self) -> bool {
        let (sender, receiver) = oneshot::channel();
        *self.hello_waiter.lock().unwrap() = Some(sender);
        if let Err(e) = self.send_control(&ControlMessage::Hello) {
            debug!("client {} failed to send hello: {e}", self.name);
            return false;
        }
        matches!(
            tokio::time::timeout(self.reply_timeout, receiver).await,
            Ok(Ok(_))
        )
    }

    /// Say goodbye, the router drops the session and its subscriptions
    pub fn bye(&self) -> io::Result<()> {
        self.send_control(&ControlMessage::Bye)
    }

    fn handle_datagram(&self, mut data: &[u8]) {
        while !data.is_empty() {
            let len = match g3_apm_proto::peek_message_len(data) {
                Ok(Some(len)) => len,
                Ok(None) => {
                    debug!("client {}: truncated message in datagram", self.name);
                    return;
                }
                Err(e) => {
                    debug!("client {}: invalid message: {e}", self.name);
                    return;
                }
            };
            self.handle_message(&data[..len]);
            data = &data[len..];
        }
    }

    fn handle_message(&self, msg: &[u8]) {
        self.stats.replies.fetch_add(1, Ordering::Relaxed);
        match codec::opcode_of(msg) {
            Ok(opcode) if opcode.is_metric_frame() => {
                debug!("client {}: ignored metric frame", self.name);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                debug!("client {}: {e}", self.name);
                return;
            }
        }

        let msg = match ControlMessage::decode(msg) {
            Ok((msg, _)) => msg,
            Err(e) => {
                debug!("client {}: invalid control message: {e}", self.name);
                return;
            }
        };
        match msg {
            ControlMessage::Token { fqn, token } => {
                let in_effect = self.tokens.set(&fqn, token);
                if in_effect != token {
                    warn!(
                        "client {}: token {token} for {fqn} conflicts with cached {in_effect}",
                        self.name
                    );
                }
            }
            ControlMessage::Confirm { key } => {
                if !self.confirms.confirm(&key) {
                    debug!("client {}: late confirm for {key}", self.name);
                }
            }
            ControlMessage::Reset => {
                info!("client {}: reset by {}", self.name, self.remote);
                self.tokens.clear();
                self.stats.resets.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.send_control(&ControlMessage::ResetConfirm) {
                    debug!("client {}: failed to confirm reset: {e}", self.name);
                }
            }
            ControlMessage::PingResponse { key } => {
                if let Some(sender) = self.ping_waiters.lock().unwrap().remove(&key) {
                    let _ = sender.send(());
                }
            }
            ControlMessage::HelloConfirm => {
                if let Some(sender) = self.hello_waiter.lock().unwrap().take() {
                    let _ = sender.send(());
                }
            }
            ControlMessage::Who => {
                let (host, agent) = self.identity.lock().unwrap().clone();
                if let Err(e) = self.send_control(&ControlMessage::WhoResponse { host, agent }) {
                    debug!("client {}: failed to answer who: {e}", self.name);
                }
            }
            ControlMessage::Bye => self.mark_disconnected(),
            msg => {
                debug!(
                    "client {}: unexpected {} message",
                    self.name,
                    msg.opcode().as_str()
                );
            }
        }
    }
}

async fn run_reader(client: Weak<AgentClient>, socket: Arc<UdpSocket>) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        let r = socket.recv(&mut buf).await;
        let Some(client) = client.upgrade() else {
            break;
        };
        match r {
            Ok(n) => client.handle_datagram(&buf[..n]),
            Err(e) => {
                debug!("client {} recv error: {e}", client.name);
                client.mark_disconnected();
            }
        }
    }
}

impl Drop for AgentClient {
    fn drop(&mut self) {
        if let Some(handle) = self.reader.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl CallbackWatched for AgentClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> Duration {
        self.reconnect_period
    }

    async fn connect(&self, attempts: i32) -> bool {
        if attempts > 0 {
            debug!(
                "client {} reconnecting to {}, attempt {attempts}",
                self.name, self.remote
            );
        }
        self.hello().await
    }
}

#[async_trait]
impl PolledWatched for AgentClient {
    fn name(&self) -> &str {
        &self.ping_name
    }

    fn period(&self) -> Duration {
        self.poll_period
    }

    async fn poll(&self) -> bool {
        self.ping().await
    }

    fn poll_failed(&self) {
        self.mark_disconnected();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use g3_apm_proto::{MetricName, MetricType, MetricValue};

    fn watch_config() -> WatchConfig {
        WatchConfig {
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    fn metric() -> Metric {
        let name = Arc::new(MetricName::from_str("host1/agentA/cpu/util").unwrap());
        Metric::new(name, MetricType::LongGauge, MetricValue::Long(5), 1000).unwrap()
    }

    async fn peer() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[tokio::test]
    async fn hello_and_ping() {
        let (server, addr) = peer().await;
        let client = AgentClient::connect("up", addr, &watch_config(), Duration::from_secs(1))
            .await
            .unwrap();

        let answer = tokio::spawn(async move {
            let mut buf = [0u8; 512];
            for _ in 0..2 {
                let (n, from) = server.recv_from(&mut buf).await.unwrap();
                let reply = match ControlMessage::decode(&buf[..n]).unwrap().0 {
                    ControlMessage::Hello => ControlMessage::HelloConfirm,
                    ControlMessage::Ping { key } => ControlMessage::PingResponse { key },
                    m => panic!("unexpected {m:?}"),
                };
                server.send_to(&reply.encode(), from).await.unwrap();
            }
        });
        assert!(CallbackWatched::connect(client.as_ref(), 0).await);
        assert!(client.ping().await);
        answer.await.unwrap();
    }

    #[tokio::test]
    async fn token_and_reset() {
        let (server, addr) = peer().await;
        let client = AgentClient::connect("up", addr, &watch_config(), Duration::from_secs(1))
            .await
            .unwrap();
        client.send(&[metric()]).unwrap();

        let mut buf = [0u8; 512];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        let frame = codec::decode(&buf[..n]).unwrap();
        assert!(matches!(frame.records[0].ident, RecordIdent::Name(_)));

        let reply = ControlMessage::Token {
            fqn: "host1/agentA/cpu/util".to_string(),
            token: 42,
        };
        server.send_to(&reply.encode(), from).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.tokens().get("host1/agentA/cpu/util"), 42);

        client.send(&[metric()]).unwrap();
        let (n, _) = server.recv_from(&mut buf).await.unwrap();
        let frame = codec::decode(&buf[..n]).unwrap();
        assert_eq!(frame.records[0].ident, RecordIdent::Token(42));

        server
            .send_to(&ControlMessage::Reset.encode(), from)
            .await
            .unwrap();
        let (n, _) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(
            ControlMessage::decode(&buf[..n]).unwrap().0,
            ControlMessage::ResetConfirm
        );
        assert!(client.tokens().is_empty());
        assert_eq!(client.stats().resets(), 1);
    }

    #[tokio::test]
    async fn direct_timeout() {
        let (_server, addr) = peer().await;
        let client =
            AgentClient::connect("up", addr, &watch_config(), Duration::from_millis(100))
                .await
                .unwrap();
        let r = client.send_direct(&metric()).await;
        assert!(matches!(r, Err(ConfirmError::Timeout(_, _))));
        assert_eq!(client.pending_confirms(), 0);
    }
}
