/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use crate::MuxConfig;

mod http;
pub use http::{HttpMagic, is_http_magic};

mod wire;
pub use wire::{WireMagic, is_wire_magic};

mod xml;
pub use xml::XmlTagMatcher;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchResult {
    Matched,
    NeedMoreData,
    Mismatch,
}

/// Detects one protocol from the first bytes of a connection
pub trait ProtocolMatcher: Send + Sync {
    fn protocol(&self) -> &str;

    /// Bytes needed before any test can be run
    fn required_bytes(&self) -> usize {
        2
    }

    fn match_magic(&self, _magic1: u8, _magic2: u8) -> bool {
        false
    }

    /// Called only if the magic test fails
    fn match_content(&self, _data: &[u8], _config: &MuxConfig) -> MatchResult {
        MatchResult::Mismatch
    }
}
