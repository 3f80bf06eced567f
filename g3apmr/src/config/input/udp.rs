/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;
use yaml_rust::yaml::Hash;

use super::{AnyInputConfig, InputConfig, InputConfigDiffAction};
use crate::config::yaml;

const INPUT_CONFIG_TYPE: &str = "Udp";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UdpInputConfig {
    name: String,
    listen: Option<SocketAddr>,
    pub recv_buffer: usize,
}

impl UdpInputConfig {
    fn new() -> Self {
        UdpInputConfig {
            name: String::new(),
            listen: None,
            recv_buffer: 65536,
        }
    }

    pub fn with_listen(name: &str, listen: SocketAddr) -> Self {
        let mut config = UdpInputConfig::new();
        config.name = name.to_string();
        config.listen = Some(listen);
        config
    }

    pub(crate) fn parse(map: &Hash) -> anyhow::Result<Self> {
        let mut input = UdpInputConfig::new();
        yaml::foreach_kv(map, |k, v| input.set(k, v))?;
        input.check()?;
        Ok(input)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml::normalize_key(k).as_str() {
            super::CONFIG_KEY_INPUT_TYPE => Ok(()),
            super::CONFIG_KEY_INPUT_NAME => {
                self.name = yaml::as_string(v)?;
                Ok(())
            }
            "listen" => {
                let addr = yaml::as_sockaddr(v)
                    .context(format!("invalid socket address value for key {k}"))?;
                self.listen = Some(addr);
                Ok(())
            }
            "recv_buffer" => {
                self.recv_buffer = yaml::as_usize(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&mut self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow!("name is not set"));
        }
        if self.listen.is_none() {
            return Err(anyhow!("listen address is not set"));
        }
        if self.recv_buffer < 1024 {
            self.recv_buffer = 1024;
        }
        Ok(())
    }
}

impl InputConfig for UdpInputConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_type(&self) -> &'static str {
        INPUT_CONFIG_TYPE
    }

    fn listen(&self) -> SocketAddr {
        self.listen
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    fn diff_action(&self, new: &AnyInputConfig) -> InputConfigDiffAction {
        let AnyInputConfig::Udp(new) = new else {
            return InputConfigDiffAction::SpawnNew;
        };

        if self.eq(new) {
            InputConfigDiffAction::NoAction
        } else {
            InputConfigDiffAction::ReloadAndRespawn
        }
    }
}
