/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod config;
pub use config::{MuxConfig, XmlScanLimit};

mod error;
pub use error::MuxError;

mod matcher;
pub use matcher::{
    HttpMagic, MatchResult, ProtocolMatcher, WireMagic, XmlTagMatcher, is_http_magic,
    is_wire_magic,
};

mod switch;
pub use switch::{MagicKey, ProtocolSwitch, SwitchOutcome, SwitchState};
