/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use g3_apm_proto::{ByteOrder, OpCode};

use super::ProtocolMatcher;

/// A metric frame starts with a frame opcode and a byte order marker,
/// a control message only with its opcode
pub fn is_wire_magic(magic1: u8, magic2: u8) -> bool {
    match OpCode::try_from(magic1) {
        Ok(opcode) if opcode.is_metric_frame() => ByteOrder::try_from(magic2).is_ok(),
        Ok(_) => true,
        Err(_) => false,
    }
}

pub struct WireMagic {
    protocol: String,
}

impl WireMagic {
    pub fn new(protocol: &str) -> Self {
        WireMagic {
            protocol: protocol.to_string(),
        }
    }
}

impl ProtocolMatcher for WireMagic {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn match_magic(&self, magic1: u8, magic2: u8) -> bool {
        is_wire_magic(magic1, magic2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_and_control() {
        assert!(is_wire_magic(OpCode::SendMetric as u8, 0));
        assert!(is_wire_magic(OpCode::SendMetricDirect as u8, 1));
        assert!(!is_wire_magic(OpCode::SendMetric as u8, 2));
        assert!(is_wire_magic(OpCode::Ping as u8, 0xff));
        assert!(!is_wire_magic(0x7f, 0));
        assert!(!is_wire_magic(b'G', b'E'));
        assert!(!is_wire_magic(b'h', b'/'));
    }
}
