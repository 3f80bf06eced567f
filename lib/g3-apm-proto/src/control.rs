/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use crate::codec::{ByteOrder, FrameReader, FrameWriter};
use crate::{OpCode, WireError};

/// Upper bound of patterns accepted in one subscription request
const MAX_SUB_PATTERNS: u32 = 1024;

/// Non metric messages, always in network byte order
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    Token { fqn: String, token: i64 },
    Confirm { key: String },
    StartSub { patterns: Vec<String> },
    StopSub { sub_id: i64 },
    SubConfirm { sub_id: i64 },
    Ping { key: i64 },
    PingResponse { key: i64 },
    Reset,
    ResetConfirm,
    Hello,
    HelloConfirm,
    Who,
    WhoResponse { host: String, agent: String },
    Bye,
}

impl ControlMessage {
    pub fn opcode(&self) -> OpCode {
        match self {
            ControlMessage::Token { .. } => OpCode::SendMetricToken,
            ControlMessage::Confirm { .. } => OpCode::ConfirmMetric,
            ControlMessage::StartSub { .. } => OpCode::StartSubDest,
            ControlMessage::StopSub { .. } => OpCode::StopSubDest,
            ControlMessage::SubConfirm { .. } => OpCode::SubDestConfirm,
            ControlMessage::Ping { .. } => OpCode::Ping,
            ControlMessage::PingResponse { .. } => OpCode::PingResponse,
            ControlMessage::Reset => OpCode::Reset,
            ControlMessage::ResetConfirm => OpCode::ResetConfirm,
            ControlMessage::Hello => OpCode::Hello,
            ControlMessage::HelloConfirm => OpCode::HelloConfirm,
            ControlMessage::Who => OpCode::Who,
            ControlMessage::WhoResponse { .. } => OpCode::WhoResponse,
            ControlMessage::Bye => OpCode::Bye,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = FrameWriter::with_capacity(32, ByteOrder::Big);
        w.put_u8(self.opcode() as u8);
        match self {
            ControlMessage::Token { fqn, token } => {
                w.put_len_bytes(fqn.as_bytes());
                w.put_i64(*token);
            }
            ControlMessage::Confirm { key } => w.put_len_bytes(key.as_bytes()),
            ControlMessage::StartSub { patterns } => {
                w.put_u32(patterns.len() as u32);
                for p in patterns {
                    w.put_len_bytes(p.as_bytes());
                }
            }
            ControlMessage::StopSub { sub_id } | ControlMessage::SubConfirm { sub_id } => {
                w.put_i64(*sub_id)
            }
            ControlMessage::Ping { key } | ControlMessage::PingResponse { key } => {
                w.put_i64(*key)
            }
            ControlMessage::WhoResponse { host, agent } => {
                w.put_len_bytes(host.as_bytes());
                w.put_len_bytes(agent.as_bytes());
            }
            ControlMessage::Reset
            | ControlMessage::ResetConfirm
            | ControlMessage::Hello
            | ControlMessage::HelloConfirm
            | ControlMessage::Who
            | ControlMessage::Bye => {}
        }
        w.into_vec()
    }

    /// Decode one message, returning it with the number of bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize), WireError> {
        let mut r = FrameReader::new(data, ByteOrder::Big);
        let opcode = OpCode::try_from(r.u8()?)?;
        let msg = match opcode {
            OpCode::SendMetric | OpCode::SendMetricDirect => {
                return Err(WireError::UnexpectedOpcode(opcode));
            }
            OpCode::SendMetricToken => {
                let fqn = r.len_string()?;
                let token = r.i64()?;
                ControlMessage::Token { fqn, token }
            }
            OpCode::ConfirmMetric => ControlMessage::Confirm {
                key: r.len_string()?,
            },
            OpCode::StartSubDest => {
                let count = r.u32()?;
                if count > MAX_SUB_PATTERNS {
                    return Err(WireError::MalformedFrame("too many patterns"));
                }
                let mut patterns = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    patterns.push(r.len_string()?);
                }
                ControlMessage::StartSub { patterns }
            }
            OpCode::StopSubDest => ControlMessage::StopSub { sub_id: r.i64()? },
            OpCode::SubDestConfirm => ControlMessage::SubConfirm { sub_id: r.i64()? },
            OpCode::Ping => ControlMessage::Ping { key: r.i64()? },
            OpCode::PingResponse => ControlMessage::PingResponse { key: r.i64()? },
            OpCode::Reset => ControlMessage::Reset,
            OpCode::ResetConfirm => ControlMessage::ResetConfirm,
            OpCode::Hello => ControlMessage::Hello,
            OpCode::HelloConfirm => ControlMessage::HelloConfirm,
            OpCode::Who => ControlMessage::Who,
            OpCode::WhoResponse => {
                let host = r.len_string()?;
                let agent = r.len_string()?;
                ControlMessage::WhoResponse { host, agent }
            }
            OpCode::Bye => ControlMessage::Bye,
        };
        Ok((msg, r.offset()))
    }

    /// Length of the control message at the head of `data`, if complete
    pub(crate) fn peek_len(opcode: OpCode, data: &[u8]) -> Result<Option<usize>, WireError> {
        let mut r = FrameReader::new(data, ByteOrder::Big);
        macro_rules! need {
            ($e:expr) => {
                match $e {
                    Ok(v) => v,
                    Err(WireError::MalformedFrame(_)) => return Ok(None),
                    Err(e) => return Err(e),
                }
            };
        }

        need!(r.skip(1));
        match opcode {
            OpCode::SendMetric | OpCode::SendMetricDirect => {
                return Err(WireError::UnexpectedOpcode(opcode));
            }
            OpCode::SendMetricToken => {
                need!(r.len_bytes());
                need!(r.skip(8));
            }
            OpCode::ConfirmMetric => {
                need!(r.len_bytes());
            }
            OpCode::StartSubDest => {
                let count = need!(r.u32());
                if count > MAX_SUB_PATTERNS {
                    return Err(WireError::MalformedFrame("too many patterns"));
                }
                for _ in 0..count {
                    need!(r.len_bytes());
                }
            }
            OpCode::StopSubDest
            | OpCode::SubDestConfirm
            | OpCode::Ping
            | OpCode::PingResponse => need!(r.skip(8)),
            OpCode::WhoResponse => {
                need!(r.len_bytes());
                need!(r.len_bytes());
            }
            OpCode::Reset
            | OpCode::ResetConfirm
            | OpCode::Hello
            | OpCode::HelloConfirm
            | OpCode::Who
            | OpCode::Bye => {}
        }
        Ok(Some(r.offset()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn token_reply_layout() {
        let msg = ControlMessage::Token {
            fqn: "h/a/n".to_string(),
            token: 42,
        };
        let data = msg.encode();
        assert_eq!(
            data.as_slice(),
            hex!("02 00000005 682f612f6e 000000000000002a")
        );
        assert_eq!(ControlMessage::decode(&data), Ok((msg, data.len())));
    }

    #[test]
    fn confirm_reply_layout() {
        let msg = ControlMessage::Confirm {
            key: "h/a/n1".to_string(),
        };
        let data = msg.encode();
        assert_eq!(data.as_slice(), hex!("03 00000006 682f612f6e31"));
    }

    #[test]
    fn start_sub() {
        let data = hex!("04 00000002 00000003 682f2a 00000001 2a");
        let (msg, len) = ControlMessage::decode(&data).unwrap();
        assert_eq!(len, data.len());
        assert_eq!(
            msg,
            ControlMessage::StartSub {
                patterns: vec!["h/*".to_string(), "*".to_string()]
            }
        );
        assert_eq!(ControlMessage::peek_len(OpCode::StartSubDest, &data[..9]), Ok(None));
        assert_eq!(
            ControlMessage::peek_len(OpCode::StartSubDest, &data),
            Ok(Some(data.len()))
        );
    }

    #[test]
    fn single_byte_messages() {
        for msg in [ControlMessage::Hello, ControlMessage::Bye, ControlMessage::Who] {
            let data = msg.encode();
            assert_eq!(data.len(), 1);
            assert_eq!(ControlMessage::peek_len(msg.opcode(), &data), Ok(Some(1)));
        }
    }

    #[test]
    fn truncated() {
        let data = hex!("07 0000");
        assert_eq!(ControlMessage::peek_len(OpCode::Ping, &data), Ok(None));
        assert!(ControlMessage::decode(&data).is_err());
    }
}
