/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use anyhow::anyhow;

use g3_apm_mux::{
    HttpMagic, MatchResult, MuxConfig, ProtocolMatcher, ProtocolSwitch, WireMagic, XmlTagMatcher,
};

use super::{
    AgentStage, HttpStatsStage, LineFramer, StageList, TextStage, WireFramer, XmlStage,
};
use crate::AppContext;

/// A detectable stream protocol and the stages that serve it
pub trait StreamProtocol: ProtocolMatcher {
    fn stages(&self, ctx: &Arc<AppContext>) -> StageList;
}

pub type ProtocolRegistry = ProtocolSwitch<dyn StreamProtocol>;

macro_rules! delegate_matcher {
    ($t:ty) => {
        impl ProtocolMatcher for $t {
            fn protocol(&self) -> &str {
                self.0.protocol()
            }

            fn required_bytes(&self) -> usize {
                self.0.required_bytes()
            }

            fn match_magic(&self, magic1: u8, magic2: u8) -> bool {
                self.0.match_magic(magic1, magic2)
            }

            fn match_content(&self, data: &[u8], config: &MuxConfig) -> MatchResult {
                self.0.match_content(data, config)
            }
        }
    };
}

pub struct WireProtocol(WireMagic);

impl Default for WireProtocol {
    fn default() -> Self {
        WireProtocol(WireMagic::new("wire"))
    }
}

delegate_matcher!(WireProtocol);

impl StreamProtocol for WireProtocol {
    fn stages(&self, ctx: &Arc<AppContext>) -> StageList {
        StageList::new()
            .with(WireFramer::new(Arc::clone(ctx)))
            .with(AgentStage::new(Arc::clone(ctx)))
    }
}

pub struct XmlProtocol(XmlTagMatcher);

impl Default for XmlProtocol {
    fn default() -> Self {
        XmlProtocol(XmlTagMatcher::new("xml", &["metric", "metrics"]))
    }
}

delegate_matcher!(XmlProtocol);

impl StreamProtocol for XmlProtocol {
    fn stages(&self, ctx: &Arc<AppContext>) -> StageList {
        StageList::new().with(XmlStage::new(Arc::clone(ctx)))
    }
}

pub struct HttpProtocol(HttpMagic);

impl Default for HttpProtocol {
    fn default() -> Self {
        HttpProtocol(HttpMagic::new("http"))
    }
}

delegate_matcher!(HttpProtocol);

impl StreamProtocol for HttpProtocol {
    fn stages(&self, ctx: &Arc<AppContext>) -> StageList {
        StageList::new().with(HttpStatsStage::new(Arc::clone(ctx)))
    }
}

/// Line based text input, never detected, only usable as the default
#[derive(Default)]
pub struct TextProtocol;

impl ProtocolMatcher for TextProtocol {
    fn protocol(&self) -> &str {
        "text"
    }
}

impl StreamProtocol for TextProtocol {
    fn stages(&self, ctx: &Arc<AppContext>) -> StageList {
        StageList::new()
            .with(LineFramer::new())
            .with(TextStage::new(Arc::clone(ctx)))
    }
}

pub fn protocol_by_name(name: &str) -> anyhow::Result<Arc<dyn StreamProtocol>> {
    match name {
        "wire" => Ok(Arc::new(WireProtocol::default())),
        "xml" => Ok(Arc::new(XmlProtocol::default())),
        "http" => Ok(Arc::new(HttpProtocol::default())),
        "text" => Ok(Arc::new(TextProtocol)),
        _ => Err(anyhow!("unsupported stream protocol {name}")),
    }
}

/// Build the protocol switch for a stream input, handlers keep the given order
pub fn build_registry(
    protocols: &[String],
    default: Option<&str>,
    mux: MuxConfig,
) -> anyhow::Result<Arc<ProtocolRegistry>> {
    let registry: ProtocolRegistry = ProtocolSwitch::new(mux);
    for name in protocols {
        registry.register(protocol_by_name(name)?)?;
    }
    if let Some(name) = default {
        registry.set_default(Some(protocol_by_name(name)?));
    }
    Ok(Arc::new(registry))
}
