/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use super::ProtocolMatcher;

const HTTP_METHOD_MAGIC: &[[u8; 2]] = &[
    *b"GE", *b"PO", *b"PU", *b"HE", *b"OP", *b"PA", *b"DE", *b"TR", *b"CO",
];

pub fn is_http_magic(magic1: u8, magic2: u8) -> bool {
    HTTP_METHOD_MAGIC.contains(&[magic1, magic2])
}

/// Matches http/1 requests by the first two letters of the method
pub struct HttpMagic {
    protocol: String,
}

impl HttpMagic {
    pub fn new(protocol: &str) -> Self {
        HttpMagic {
            protocol: protocol.to_string(),
        }
    }
}

impl ProtocolMatcher for HttpMagic {
    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn match_magic(&self, magic1: u8, magic2: u8) -> bool {
        is_http_magic(magic1, magic2)
    }
}
