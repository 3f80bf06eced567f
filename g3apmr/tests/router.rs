/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use g3_apm_proto::{
    ControlMessage, Metric, MetricCatalog, MetricName, MetricType, MetricValue, RecordIdent, codec,
};
use g3apmr::AppContext;
use g3apmr::accumulate::AccumulatorConfig;
use g3apmr::client::AgentClient;
use g3apmr::config::input::tcp::TcpInputConfig;
use g3apmr::config::input::udp::UdpInputConfig;
use g3apmr::config::router::RouterConfig;
use g3apmr::config::watch::WatchConfig;
use g3apmr::destination::{Destination, DiscardDestination};
use g3apmr::input::{Input, TcpInput, UdpInput};

const LOCALHOST: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

fn context() -> Arc<AppContext> {
    let config = RouterConfig {
        first_token: 42,
        subscription: AccumulatorConfig::new(1, Duration::from_millis(100)),
        ..Default::default()
    };
    AppContext::new(Arc::new(config))
}

fn discard_all(ctx: &AppContext) -> Arc<DiscardDestination> {
    let dest = Arc::new(DiscardDestination::new("all", &["host1/**"]).unwrap());
    dest.start();
    ctx.router().register(dest.clone());
    dest
}

fn metric(value: i64, ts: i64) -> Metric {
    let name = Arc::new(MetricName::from_str("host1/agentA/cpu/util").unwrap());
    Metric::new(name, MetricType::LongGauge, MetricValue::Long(value), ts).unwrap()
}

async fn wait_until<F: Fn() -> bool>(f: F) -> bool {
    for _ in 0..500 {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn read_message(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Vec<u8> {
    loop {
        if let Some(len) = g3_apm_proto::peek_message_len(buf).unwrap() {
            return buf.drain(..len).collect();
        }
        let mut chunk = [0u8; 1024];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(n, 0, "connection closed early");
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn udp_token_flow() {
    let ctx = context();
    let dest = discard_all(&ctx);
    let input = UdpInput::spawn(&ctx, UdpInputConfig::with_listen("agents", LOCALHOST)).unwrap();

    let client = AgentClient::connect(
        "agentA",
        input.local_addr(),
        &WatchConfig::default(),
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    client.send(&[metric(1, 1000)]).unwrap();
    assert!(wait_until(|| client.tokens().get("host1/agentA/cpu/util") == 42).await);

    client.send(&[metric(2, 2000)]).unwrap();
    assert!(wait_until(|| dest.base().accepted() == 2).await);
    assert_eq!(ctx.catalog().len(), 1);

    client.send_direct(&metric(3, 3000)).await.unwrap();
    assert!(wait_until(|| dest.base().accepted() == 3).await);
    assert!(client.ping().await);

    client.bye().unwrap();
    assert!(wait_until(|| ctx.stats().conn_closed() == 1).await);

    input.abort();
    input.take_runtime().unwrap().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn udp_unknown_token_reset() {
    let ctx = context();
    let _dest = discard_all(&ctx);
    let input = UdpInput::spawn(&ctx, UdpInputConfig::with_listen("agents", LOCALHOST)).unwrap();

    let client = AgentClient::connect(
        "agentA",
        input.local_addr(),
        &WatchConfig::default(),
        Duration::from_secs(2),
    )
    .await
    .unwrap();
    client.tokens().set("host1/agentA/cpu/util", 7);

    client.send(&[metric(1, 1000)]).unwrap();
    assert!(wait_until(|| client.stats().resets() == 1).await);
    assert!(client.tokens().is_empty());
    assert!(wait_until(|| ctx.pending_resets().is_empty()).await);
    assert_eq!(ctx.stats().unknown_token(), 1);
    assert_eq!(ctx.stats().resets_sent(), 1);

    input.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_subscription() {
    let ctx = context();
    let input = TcpInput::spawn(&ctx, TcpInputConfig::with_listen("stream", LOCALHOST)).unwrap();

    let mut stream = TcpStream::connect(input.local_addr()).await.unwrap();
    let sub = ControlMessage::StartSub {
        patterns: vec!["host1/**".to_string()],
    };
    stream.write_all(&sub.encode()).await.unwrap();

    let mut buf = Vec::new();
    let reply = read_message(&mut stream, &mut buf).await;
    let sub_id = match ControlMessage::decode(&reply).unwrap().0 {
        ControlMessage::SubConfirm { sub_id } => sub_id,
        m => panic!("unexpected reply {m:?}"),
    };
    assert!(sub_id > 0);
    assert_eq!(ctx.subscriptions().count(), 1);

    assert_eq!(ctx.router().route(&metric(5, 1000)), 1);
    let frame = read_message(&mut stream, &mut buf).await;
    let frame = codec::decode(&frame).unwrap();
    assert_eq!(frame.records.len(), 1);
    match &frame.records[0].ident {
        RecordIdent::Name(name) => assert_eq!(name.fqn(), "host1/agentA/cpu/util"),
        ident => panic!("unexpected ident {ident:?}"),
    }

    drop(stream);
    assert!(wait_until(|| ctx.subscriptions().count() == 0).await);
    assert_eq!(ctx.router().route(&metric(6, 2000)), 0);

    input.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_text_fallback() {
    let ctx = context();
    let dest = discard_all(&ctx);
    let input = TcpInput::spawn(&ctx, TcpInputConfig::with_listen("stream", LOCALHOST)).unwrap();

    let mut stream = TcpStream::connect(input.local_addr()).await.unwrap();
    stream
        .write_all(b"host1/agentA/cpu/util long_gauge 5 1000\r\nhost1/agentA/cpu/idle gauge 95\n")
        .await
        .unwrap();
    assert!(wait_until(|| dest.base().accepted() == 2).await);
    assert_eq!(ctx.stats().text_lines(), 2);

    stream.write_all(b"not-a-metric\n").await.unwrap();
    assert!(wait_until(|| ctx.stats().malformed() == 1).await);

    input.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_http_stats() {
    let ctx = context();
    let input = TcpInput::spawn(&ctx, TcpInputConfig::with_listen("stream", LOCALHOST)).unwrap();

    let mut stream = TcpStream::connect(input.local_addr()).await.unwrap();
    stream
        .write_all(b"GET /stats HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut rsp = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rsp))
        .await
        .unwrap()
        .unwrap();
    let rsp = String::from_utf8(rsp).unwrap();
    assert!(rsp.starts_with("HTTP/1.1 200"));
    assert!(rsp.contains("\nconn_accepted 1\n"));

    input.abort();
}
