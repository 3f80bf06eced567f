/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::debug;
use memchr::memmem;

use super::{Stage, StageAction};
use crate::AppContext;
use crate::session::ArcSession;

const MAX_HEADER_SIZE: usize = 8192;

fn response(status: &str, body: &str) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ))
}

/// Serves `GET /stats` once and closes the connection
pub struct HttpStatsStage {
    ctx: Arc<AppContext>,
    buf: BytesMut,
}

impl HttpStatsStage {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        HttpStatsStage {
            ctx,
            buf: BytesMut::new(),
        }
    }

    fn respond(&self, head: &[u8]) -> Bytes {
        let line_end = memchr::memchr(b'\n', head).unwrap_or(head.len());
        let line = String::from_utf8_lossy(&head[..line_end]);
        let mut parts = line.split_ascii_whitespace();
        let method = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();
        let path = path.split('?').next().unwrap_or_default();
        match (method, path) {
            ("GET", "/stats") => response("200 OK", &self.ctx.stats_text()),
            ("GET", _) => response("404 Not Found", "not found\n"),
            _ => response("405 Method Not Allowed", "method not allowed\n"),
        }
    }
}

impl Stage for HttpStatsStage {
    fn name(&self) -> &'static str {
        "http-stats"
    }

    fn on_message(
        &mut self,
        session: &ArcSession,
        data: Bytes,
        _out: &mut Vec<Bytes>,
    ) -> StageAction {
        self.buf.extend_from_slice(&data);
        let head_end = memmem::find(&self.buf, b"\r\n\r\n")
            .or_else(|| memmem::find(&self.buf, b"\n\n"));
        let rsp = match head_end {
            Some(p) => self.respond(&self.buf[..p]),
            None if self.buf.len() > MAX_HEADER_SIZE => {
                response("431 Request Header Fields Too Large", "")
            }
            None => return StageAction::Continue,
        };
        if !session.send(rsp) {
            debug!("{}: failed to send http response", session.peer());
        }
        StageAction::Close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use tokio::sync::mpsc;

    use crate::config::router::RouterConfig;
    use crate::session::Session;

    #[tokio::test]
    async fn stats() {
        let ctx = AppContext::new(Arc::new(RouterConfig::default()));
        ctx.stats().add_malformed();
        let (sender, mut receiver) = mpsc::channel(4);
        let session = Arc::new(Session::new_stream(
            1,
            SocketAddr::from(([127, 0, 0, 1], 1)),
            sender,
        ));

        let mut stage = HttpStatsStage::new(ctx.clone());
        let mut out = Vec::new();
        assert!(matches!(
            stage.on_message(&session, Bytes::from_static(b"GET /stats HTTP/1.1\r\n"), &mut out),
            StageAction::Continue
        ));
        assert!(matches!(
            stage.on_message(&session, Bytes::from_static(b"Host: a\r\n\r\n"), &mut out),
            StageAction::Close
        ));
        let rsp = receiver.try_recv().unwrap();
        let rsp = std::str::from_utf8(&rsp).unwrap();
        assert!(rsp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(rsp.contains("malformed 1\n"));

        let mut stage = HttpStatsStage::new(ctx);
        stage.on_message(&session, Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n"), &mut out);
        let rsp = receiver.try_recv().unwrap();
        assert!(rsp.starts_with(b"HTTP/1.1 404"));
    }
}
