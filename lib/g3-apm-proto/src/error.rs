/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

use crate::{MetricType, OpCode};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("unexpected opcode {0}")]
    UnexpectedOpcode(OpCode),
    #[error("unknown metric type {0}")]
    UnknownMetricType(u8),
    #[error("invalid byte order marker {0}")]
    InvalidByteOrder(u8),
    #[error("invalid metric name: {0}")]
    InvalidName(&'static str),
    #[error("value does not match metric type {0}")]
    ValueTypeMismatch(MetricType),
    #[error("invalid utf-8 string")]
    InvalidUtf8,
}
