/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, yaml};

mod registry;
pub(crate) use registry::{clear, get, get_all};

pub mod tcp;
pub mod udp;

const CONFIG_KEY_INPUT_TYPE: &str = "type";
const CONFIG_KEY_INPUT_NAME: &str = "name";

#[derive(Debug, PartialEq, Eq)]
pub enum InputConfigDiffAction {
    NoAction,
    SpawnNew,
    ReloadAndRespawn,
}

pub trait InputConfig {
    fn name(&self) -> &str;
    fn input_type(&self) -> &'static str;
    fn listen(&self) -> SocketAddr;

    fn diff_action(&self, new: &AnyInputConfig) -> InputConfigDiffAction;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnyInputConfig {
    Tcp(tcp::TcpInputConfig),
    Udp(udp::UdpInputConfig),
}

impl AnyInputConfig {
    pub fn name(&self) -> &str {
        match self {
            AnyInputConfig::Tcp(c) => c.name(),
            AnyInputConfig::Udp(c) => c.name(),
        }
    }

    pub fn input_type(&self) -> &'static str {
        match self {
            AnyInputConfig::Tcp(c) => c.input_type(),
            AnyInputConfig::Udp(c) => c.input_type(),
        }
    }

    pub fn listen(&self) -> SocketAddr {
        match self {
            AnyInputConfig::Tcp(c) => c.listen(),
            AnyInputConfig::Udp(c) => c.listen(),
        }
    }

    pub fn diff_action(&self, new: &AnyInputConfig) -> InputConfigDiffAction {
        match self {
            AnyInputConfig::Tcp(c) => c.diff_action(new),
            AnyInputConfig::Udp(c) => c.diff_action(new),
        }
    }
}

pub(crate) fn load_all(v: &Yaml) -> anyhow::Result<()> {
    super::yaml::foreach_map(v, |map| {
        let input = load_input(map)?;
        if let Some(old_input) = registry::add(input) {
            Err(anyhow!(
                "input with name {} already exists",
                old_input.name()
            ))
        } else {
            Ok(())
        }
    })
}

fn load_input(map: &yaml::Hash) -> anyhow::Result<AnyInputConfig> {
    let input_type = super::yaml::hash_get_required_str(map, CONFIG_KEY_INPUT_TYPE)?;
    match super::yaml::normalize_key(input_type).as_str() {
        "tcp" | "stream" => {
            let input =
                tcp::TcpInputConfig::parse(map).context("failed to load this Tcp input")?;
            Ok(AnyInputConfig::Tcp(input))
        }
        "udp" | "datagram" => {
            let input =
                udp::UdpInputConfig::parse(map).context("failed to load this Udp input")?;
            Ok(AnyInputConfig::Udp(input))
        }
        _ => Err(anyhow!("unsupported input type {input_type}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::load_test_doc;

    #[test]
    fn dispatch() {
        let doc = load_test_doc("type: udp\nname: agents\nlisten: 7560\n");
        let input = load_input(doc.as_hash().unwrap()).unwrap();
        assert_eq!(input.input_type(), "Udp");
        assert_eq!(input.name(), "agents");
        assert_eq!(input.listen().port(), 7560);

        let doc = load_test_doc("type: sctp\nname: x\n");
        assert!(load_input(doc.as_hash().unwrap()).is_err());
    }
}
