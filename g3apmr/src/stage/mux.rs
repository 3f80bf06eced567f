/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, info};

use g3_apm_mux::{SwitchOutcome, SwitchState};

use super::{ProtocolRegistry, Stage, StageAction};
use crate::AppContext;
use crate::session::ArcSession;

/// First stage of a stream connection, detects the protocol and rewires
pub struct MuxStage {
    ctx: Arc<AppContext>,
    registry: Arc<ProtocolRegistry>,
    state: SwitchState,
    buf: BytesMut,
}

impl MuxStage {
    pub fn new(ctx: Arc<AppContext>, registry: Arc<ProtocolRegistry>) -> Self {
        MuxStage {
            ctx,
            registry,
            state: SwitchState::default(),
            buf: BytesMut::new(),
        }
    }
}

impl Stage for MuxStage {
    fn name(&self) -> &'static str {
        "mux"
    }

    fn on_message(
        &mut self,
        session: &ArcSession,
        data: Bytes,
        _out: &mut Vec<Bytes>,
    ) -> StageAction {
        self.buf.extend_from_slice(&data);
        match self.registry.inspect(&mut self.state, &self.buf) {
            Ok(SwitchOutcome::NeedMoreData) => StageAction::Continue,
            Ok(SwitchOutcome::Matched(handler)) => {
                debug!("{}: detected protocol {}", session.peer(), handler.protocol());
                StageAction::Rewire(handler.stages(&self.ctx), self.buf.split().freeze())
            }
            Ok(SwitchOutcome::Fallback(handler)) => {
                debug!(
                    "{}: no protocol detected in {} bytes, fall back to {}",
                    session.peer(),
                    self.buf.len(),
                    handler.protocol()
                );
                StageAction::Rewire(handler.stages(&self.ctx), self.buf.split().freeze())
            }
            Err(e) => {
                info!("{}: closing connection: {e}", session.peer());
                StageAction::Close
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use tokio::sync::mpsc;

    use g3_apm_mux::MuxConfig;

    use crate::config::router::RouterConfig;
    use crate::session::Session;
    use crate::stage::build_registry;

    fn session() -> ArcSession {
        let (sender, _receiver) = mpsc::channel(1);
        Arc::new(Session::new_stream(
            1,
            SocketAddr::from(([127, 0, 0, 1], 1)),
            sender,
        ))
    }

    fn protocols() -> Vec<String> {
        ["wire", "xml", "http"].iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn rewire_with_buffered() {
        let ctx = AppContext::new(Arc::new(RouterConfig::default()));
        let registry = build_registry(&protocols(), Some("text"), MuxConfig::default()).unwrap();
        let session = session();
        let mut stage = MuxStage::new(ctx, registry);
        let mut out = Vec::new();

        assert!(matches!(
            stage.on_message(&session, Bytes::from_static(b"G"), &mut out),
            StageAction::Continue
        ));
        match stage.on_message(&session, Bytes::from_static(b"ET /stats"), &mut out) {
            StageAction::Rewire(list, replay) => {
                assert_eq!(list.names(), ["http-stats"]);
                assert_eq!(replay.as_ref(), b"GET /stats");
            }
            _ => panic!("not rewired"),
        }
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn no_default() {
        let ctx = AppContext::new(Arc::new(RouterConfig::default()));
        let mut mux = MuxConfig::default();
        mux.set_byte_budget(16);
        let registry = build_registry(&protocols(), None, mux).unwrap();
        let session = session();
        let mut stage = MuxStage::new(ctx, registry);
        let mut out = Vec::new();

        let action = stage.on_message(&session, Bytes::from_static(b"h/a/n gauge 1\n"), &mut out);
        assert!(matches!(action, StageAction::Close));
    }
}
