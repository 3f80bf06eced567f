/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod error;
pub use error::WireError;

mod opcode;
pub use opcode::OpCode;

pub mod metric;
pub use metric::{Metric, MetricName, MetricRecord, MetricType, MetricValue, RecordIdent};

pub mod codec;
pub use codec::{ByteOrder, FrameHeader, MetricFrame};

mod control;
pub use control::ControlMessage;

mod token;
pub use token::TokenCache;

mod catalog;
pub use catalog::{ArcMetricCatalog, MemoryCatalog, MetricCatalog};

/// Peek the length of the next complete message in a stream buffer
///
/// Returns `Ok(None)` if more data is needed to know or to hold the whole message.
pub fn peek_message_len(data: &[u8]) -> Result<Option<usize>, WireError> {
    let Some(b) = data.first() else {
        return Ok(None);
    };
    let opcode = OpCode::try_from(*b)?;
    if opcode.is_metric_frame() {
        codec::peek_frame_len(data)
    } else {
        ControlMessage::peek_len(opcode, data)
    }
}
