/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use bytes::Bytes;
use log::{debug, info, warn};

use g3_apm_proto::{ControlMessage, MetricCatalog, OpCode, RecordIdent, codec};

use super::HandleResult;
use crate::AppContext;
use crate::session::ArcSession;

/// Router side of the agent wire protocol, one complete message at a time
pub struct AgentHandler {
    ctx: Arc<AppContext>,
}

fn reply(session: &ArcSession, msg: &ControlMessage) {
    if !session.send(Bytes::from(msg.encode())) {
        debug!(
            "failed to send {} to {}",
            msg.opcode().as_str(),
            session.peer()
        );
    }
}

impl AgentHandler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        AgentHandler { ctx }
    }

    pub fn handle_message(&self, session: &ArcSession, msg: &[u8]) -> HandleResult {
        let opcode = match codec::opcode_of(msg) {
            Ok(opcode) => opcode,
            Err(e) => {
                warn!("{}: dropped message: {e}", session.peer());
                self.ctx.stats().add_malformed();
                return HandleResult::Continue;
            }
        };
        if opcode.is_metric_frame() {
            self.handle_frame(session, opcode, msg);
            return HandleResult::Continue;
        }

        match ControlMessage::decode(msg) {
            Ok((msg, _)) => self.handle_control(session, msg),
            Err(e) => {
                warn!(
                    "{}: dropped malformed {} message: {e}",
                    session.peer(),
                    opcode.as_str()
                );
                self.ctx.stats().add_malformed();
                HandleResult::Continue
            }
        }
    }

    fn handle_frame(&self, session: &ArcSession, opcode: OpCode, msg: &[u8]) {
        let frame = match codec::decode(msg) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{}: dropped frame: {e}", session.peer());
                self.ctx.stats().add_malformed();
                return;
            }
        };
        self.ctx.stats().add_frame(frame.records.len());

        let catalog = self.ctx.catalog();
        let direct = opcode == OpCode::SendMetricDirect;
        for record in frame.records {
            let (name, token) = match &record.ident {
                RecordIdent::Token(token) => match catalog.lookup(*token) {
                    Some(name) => (name, *token),
                    None => {
                        self.unknown_token(session, *token);
                        continue;
                    }
                },
                RecordIdent::Name(name) => {
                    let token = catalog.assign_token(name);
                    reply(
                        session,
                        &ControlMessage::Token {
                            fqn: name.fqn().to_string(),
                            token,
                        },
                    );
                    (Arc::clone(name), token)
                }
            };

            let metric = match record.into_metric(name, token) {
                Ok(metric) => metric,
                Err(e) => {
                    warn!("{}: dropped record: {e}", session.peer());
                    self.ctx.stats().add_malformed();
                    continue;
                }
            };
            if direct {
                reply(
                    session,
                    &ControlMessage::Confirm {
                        key: metric.confirm_key(),
                    },
                );
            }
            self.ctx.router().route(&metric);
        }
    }

    fn unknown_token(&self, session: &ArcSession, token: i64) {
        self.ctx.stats().add_unknown_token();
        debug!("{}: dropped record with unknown token {token}", session.peer());
        if self.ctx.pending_resets().try_insert(session.id(), ()) {
            info!("{}: unknown token {token}, sending reset", session.peer());
            reply(session, &ControlMessage::Reset);
            self.ctx.stats().add_reset_sent();
        }
    }

    fn handle_control(&self, session: &ArcSession, msg: ControlMessage) -> HandleResult {
        match msg {
            ControlMessage::StartSub { patterns } => {
                let subscribed = self
                    .ctx
                    .subscriptions()
                    .subscribe(session, patterns.as_slice());
                let sub_id = match subscribed {
                    Ok(id) => id,
                    Err(e) => {
                        warn!("{}: subscription refused: {e}", session.peer());
                        -1
                    }
                };
                reply(session, &ControlMessage::SubConfirm { sub_id });
            }
            ControlMessage::StopSub { sub_id } => {
                if !self.ctx.subscriptions().stop_subscription(sub_id) {
                    debug!("{}: no subscription {sub_id} to stop", session.peer());
                }
            }
            ControlMessage::Ping { key } => reply(session, &ControlMessage::PingResponse { key }),
            ControlMessage::Hello => {
                reply(session, &ControlMessage::HelloConfirm);
                reply(session, &ControlMessage::Who);
            }
            ControlMessage::WhoResponse { host, agent } => session.set_identity(host, agent),
            ControlMessage::ResetConfirm => {
                self.ctx.pending_resets().remove(&session.id());
                debug!("{}: reset confirmed", session.peer());
            }
            ControlMessage::Bye => return HandleResult::Close,
            msg => {
                debug!(
                    "{}: ignored {} message",
                    session.peer(),
                    msg.opcode().as_str()
                );
            }
        }
        HandleResult::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::str::FromStr;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use g3_apm_proto::{ByteOrder, Metric, MetricName, MetricType, MetricValue};

    use crate::config::router::RouterConfig;
    use crate::destination::{Destination, DiscardDestination};
    use crate::session::Session;

    struct Peer {
        session: ArcSession,
        replies: mpsc::Receiver<Bytes>,
    }

    impl Peer {
        fn new(id: u64) -> Self {
            let (sender, replies) = mpsc::channel(16);
            let addr = SocketAddr::from(([127, 0, 0, 1], 9000));
            Peer {
                session: Arc::new(Session::new_stream(id, addr, sender)),
                replies,
            }
        }

        fn next_reply(&mut self) -> Option<ControlMessage> {
            let data = self.replies.try_recv().ok()?;
            Some(ControlMessage::decode(&data).unwrap().0)
        }
    }

    fn context() -> Arc<AppContext> {
        let config = RouterConfig {
            first_token: 42,
            reset_timeout: Duration::from_secs(15),
            ..Default::default()
        };
        AppContext::new(Arc::new(config))
    }

    fn metric() -> Metric {
        let name = Arc::new(MetricName::from_str("host1/agentA/cpu/util").unwrap());
        Metric::new(name, MetricType::LongGauge, MetricValue::Long(80), 1000).unwrap()
    }

    #[tokio::test]
    async fn token_assignment() {
        let ctx = context();
        let dest = Arc::new(DiscardDestination::new("all", &["host1/**"]).unwrap());
        dest.start();
        ctx.router().register(dest.clone());
        let handler = AgentHandler::new(ctx.clone());
        let mut peer = Peer::new(1);

        let frame = codec::encode_metrics(OpCode::SendMetric, ByteOrder::Little, &[metric()]);
        assert_eq!(
            handler.handle_message(&peer.session, &frame),
            HandleResult::Continue
        );
        assert_eq!(
            peer.next_reply(),
            Some(ControlMessage::Token {
                fqn: "host1/agentA/cpu/util".to_string(),
                token: 42
            })
        );

        let tokenized = metric().with_token(42);
        let frame = codec::encode_metrics(OpCode::SendMetricDirect, ByteOrder::Big, &[tokenized]);
        handler.handle_message(&peer.session, &frame);
        assert_eq!(
            peer.next_reply(),
            Some(ControlMessage::Confirm {
                key: "host1/agentA/cpu/util1000".to_string()
            })
        );
        assert_eq!(dest.base().accepted(), 2);
        assert_eq!(ctx.stats().records(), 2);
    }

    #[tokio::test]
    async fn unknown_token_reset() {
        let ctx = context();
        let handler = AgentHandler::new(ctx.clone());
        let mut peer = Peer::new(1);

        let frame =
            codec::encode_metrics(OpCode::SendMetric, ByteOrder::Big, &[metric().with_token(7)]);
        handler.handle_message(&peer.session, &frame);
        handler.handle_message(&peer.session, &frame);
        assert_eq!(peer.next_reply(), Some(ControlMessage::Reset));
        assert_eq!(peer.next_reply(), None);
        assert_eq!(ctx.stats().unknown_token(), 2);

        handler.handle_message(&peer.session, &ControlMessage::ResetConfirm.encode());
        assert!(ctx.pending_resets().is_empty());
        handler.handle_message(&peer.session, &frame);
        assert_eq!(peer.next_reply(), Some(ControlMessage::Reset));
    }

    #[tokio::test]
    async fn session_messages() {
        let ctx = context();
        let handler = AgentHandler::new(ctx);
        let mut peer = Peer::new(1);

        handler.handle_message(&peer.session, &ControlMessage::Ping { key: 9 }.encode());
        assert_eq!(peer.next_reply(), Some(ControlMessage::PingResponse { key: 9 }));

        handler.handle_message(&peer.session, &ControlMessage::Hello.encode());
        assert_eq!(peer.next_reply(), Some(ControlMessage::HelloConfirm));
        assert_eq!(peer.next_reply(), Some(ControlMessage::Who));
        let who = ControlMessage::WhoResponse {
            host: "host1".to_string(),
            agent: "agentA".to_string(),
        };
        handler.handle_message(&peer.session, &who.encode());
        assert_eq!(
            peer.session.identity(),
            Some(("host1".to_string(), "agentA".to_string()))
        );

        let sub = ControlMessage::StartSub {
            patterns: vec!["re:(".to_string()],
        };
        handler.handle_message(&peer.session, &sub.encode());
        assert_eq!(peer.next_reply(), Some(ControlMessage::SubConfirm { sub_id: -1 }));

        assert_eq!(
            handler.handle_message(&peer.session, &ControlMessage::Bye.encode()),
            HandleResult::Close
        );
    }

    #[tokio::test]
    async fn malformed() {
        let ctx = context();
        let handler = AgentHandler::new(ctx.clone());
        let peer = Peer::new(1);
        let mut frame = codec::encode_metrics(OpCode::SendMetric, ByteOrder::Big, &[metric()]);
        frame.truncate(frame.len() - 3);
        handler.handle_message(&peer.session, &frame);
        handler.handle_message(&peer.session, &[0xEE, 0x00]);
        assert_eq!(ctx.stats().malformed(), 2);
    }
}
