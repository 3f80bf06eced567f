/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::warn;

use super::{Stage, StageAction};
use crate::AppContext;
use crate::handler::{AgentHandler, HandleResult};
use crate::session::ArcSession;

const MAX_PENDING_SIZE: usize = 16 << 20;

/// Cuts the byte stream into complete wire messages
pub struct WireFramer {
    ctx: Arc<AppContext>,
    buf: BytesMut,
}

impl WireFramer {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        WireFramer {
            ctx,
            buf: BytesMut::new(),
        }
    }
}

impl Stage for WireFramer {
    fn name(&self) -> &'static str {
        "wire-framer"
    }

    fn on_message(
        &mut self,
        session: &ArcSession,
        data: Bytes,
        out: &mut Vec<Bytes>,
    ) -> StageAction {
        self.buf.extend_from_slice(&data);
        loop {
            match g3_apm_proto::peek_message_len(&self.buf) {
                Ok(Some(len)) => out.push(self.buf.split_to(len).freeze()),
                Ok(None) => {
                    if self.buf.len() > MAX_PENDING_SIZE {
                        warn!(
                            "{}: pending message exceeds {MAX_PENDING_SIZE} bytes",
                            session.peer()
                        );
                        return StageAction::Close;
                    }
                    break;
                }
                Err(e) => {
                    // no way to find the next message boundary
                    warn!(
                        "{}: dropped {} buffered bytes: {e}",
                        session.peer(),
                        self.buf.len()
                    );
                    self.ctx.stats().add_malformed();
                    self.buf.clear();
                    break;
                }
            }
        }
        StageAction::Continue
    }
}

pub struct AgentStage {
    handler: AgentHandler,
}

impl AgentStage {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        AgentStage {
            handler: AgentHandler::new(ctx),
        }
    }
}

impl Stage for AgentStage {
    fn name(&self) -> &'static str {
        "agent"
    }

    fn on_message(
        &mut self,
        session: &ArcSession,
        data: Bytes,
        _out: &mut Vec<Bytes>,
    ) -> StageAction {
        match self.handler.handle_message(session, &data) {
            HandleResult::Continue => StageAction::Continue,
            HandleResult::Close => StageAction::Close,
        }
    }
}
