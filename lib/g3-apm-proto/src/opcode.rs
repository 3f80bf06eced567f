/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use crate::WireError;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum OpCode {
    SendMetric = 0,
    SendMetricDirect = 1,
    SendMetricToken = 2,
    ConfirmMetric = 3,
    StartSubDest = 4,
    StopSubDest = 5,
    SubDestConfirm = 6,
    Ping = 7,
    PingResponse = 8,
    Reset = 9,
    ResetConfirm = 10,
    Hello = 11,
    HelloConfirm = 12,
    Who = 13,
    WhoResponse = 14,
    Bye = 15,
}

impl OpCode {
    pub const MAX_VALUE: u8 = OpCode::Bye as u8;

    pub const fn as_str(&self) -> &'static str {
        match self {
            OpCode::SendMetric => "SEND_METRIC",
            OpCode::SendMetricDirect => "SEND_METRIC_DIRECT",
            OpCode::SendMetricToken => "SEND_METRIC_TOKEN",
            OpCode::ConfirmMetric => "CONFIRM_METRIC",
            OpCode::StartSubDest => "START_SUB_DEST",
            OpCode::StopSubDest => "STOP_SUB_DEST",
            OpCode::SubDestConfirm => "SUB_DEST_CONFIRM",
            OpCode::Ping => "PING",
            OpCode::PingResponse => "PING_RESPONSE",
            OpCode::Reset => "RESET",
            OpCode::ResetConfirm => "RESET_CONFIRM",
            OpCode::Hello => "HELLO",
            OpCode::HelloConfirm => "HELLO_CONFIRM",
            OpCode::Who => "WHO",
            OpCode::WhoResponse => "WHO_RESPONSE",
            OpCode::Bye => "BYE",
        }
    }

    /// Metric frames carry the byte order marker and declared length header
    #[inline]
    pub const fn is_metric_frame(&self) -> bool {
        matches!(self, OpCode::SendMetric | OpCode::SendMetricDirect)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OpCode::SendMetric),
            1 => Ok(OpCode::SendMetricDirect),
            2 => Ok(OpCode::SendMetricToken),
            3 => Ok(OpCode::ConfirmMetric),
            4 => Ok(OpCode::StartSubDest),
            5 => Ok(OpCode::StopSubDest),
            6 => Ok(OpCode::SubDestConfirm),
            7 => Ok(OpCode::Ping),
            8 => Ok(OpCode::PingResponse),
            9 => Ok(OpCode::Reset),
            10 => Ok(OpCode::ResetConfirm),
            11 => Ok(OpCode::Hello),
            12 => Ok(OpCode::HelloConfirm),
            13 => Ok(OpCode::Who),
            14 => Ok(OpCode::WhoResponse),
            15 => Ok(OpCode::Bye),
            n => Err(WireError::UnknownOpcode(n)),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_u8() {
        for v in 0..=OpCode::MAX_VALUE {
            let op = OpCode::try_from(v).unwrap();
            assert_eq!(op as u8, v);
        }
        assert_eq!(
            OpCode::try_from(OpCode::MAX_VALUE + 1),
            Err(WireError::UnknownOpcode(OpCode::MAX_VALUE + 1))
        );
    }

    #[test]
    fn frame_opcodes() {
        assert!(OpCode::SendMetric.is_metric_frame());
        assert!(OpCode::SendMetricDirect.is_metric_frame());
        assert!(!OpCode::SendMetricToken.is_metric_frame());
        assert!(!OpCode::Ping.is_metric_frame());
    }
}
