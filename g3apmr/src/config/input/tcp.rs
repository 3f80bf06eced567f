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

const INPUT_CONFIG_TYPE: &str = "Tcp";

pub const DEFAULT_PROTOCOLS: &[&str] = &["wire", "xml", "http"];

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TcpInputConfig {
    name: String,
    listen: Option<SocketAddr>,
    pub protocols: Vec<String>,
    pub listen_backlog: u32,
}

impl TcpInputConfig {
    fn new() -> Self {
        TcpInputConfig {
            name: String::new(),
            listen: None,
            protocols: DEFAULT_PROTOCOLS.iter().map(|s| s.to_string()).collect(),
            listen_backlog: 1024,
        }
    }

    pub fn with_listen(name: &str, listen: SocketAddr) -> Self {
        let mut config = TcpInputConfig::new();
        config.name = name.to_string();
        config.listen = Some(listen);
        config
    }

    pub(crate) fn parse(map: &Hash) -> anyhow::Result<Self> {
        let mut input = TcpInputConfig::new();
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
            "protocol" | "protocols" => {
                self.protocols = yaml::as_list(v, yaml::as_string)
                    .context(format!("invalid protocol list value for key {k}"))?;
                Ok(())
            }
            "listen_backlog" | "backlog" => {
                let n = yaml::as_usize(v)?;
                self.listen_backlog =
                    u32::try_from(n).map_err(|_| anyhow!("backlog {n} is too large"))?;
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
        for p in &self.protocols {
            if !DEFAULT_PROTOCOLS.contains(&p.as_str()) && p != "text" {
                return Err(anyhow!("unsupported protocol {p}"));
            }
        }
        Ok(())
    }
}

impl InputConfig for TcpInputConfig {
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
        let AnyInputConfig::Tcp(new) = new else {
            return InputConfigDiffAction::SpawnNew;
        };

        if self.eq(new) {
            InputConfigDiffAction::NoAction
        } else {
            InputConfigDiffAction::ReloadAndRespawn
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::load_test_doc;

    #[test]
    fn parse() {
        let doc = load_test_doc("name: stream\nlisten: \"127.0.0.1:7561\"\nprotocols: [wire, xml]\n");
        let config = TcpInputConfig::parse(doc.as_hash().unwrap()).unwrap();
        assert_eq!(config.name(), "stream");
        assert_eq!(config.protocols, ["wire", "xml"]);
        assert_eq!(config.listen().port(), 7561);

        let doc = load_test_doc("name: stream\nlisten: 7561\nprotocol: smtp\n");
        assert!(TcpInputConfig::parse(doc.as_hash().unwrap()).is_err());

        let doc = load_test_doc("name: stream\n");
        assert!(TcpInputConfig::parse(doc.as_hash().unwrap()).is_err());
    }

    #[test]
    fn diff() {
        let a = TcpInputConfig::with_listen("a", SocketAddr::from(([127, 0, 0, 1], 1)));
        let mut b = a.clone();
        assert_eq!(
            a.diff_action(&AnyInputConfig::Tcp(b.clone())),
            InputConfigDiffAction::NoAction
        );
        b.protocols.pop();
        assert_eq!(
            a.diff_action(&AnyInputConfig::Tcp(b)),
            InputConfigDiffAction::ReloadAndRespawn
        );
    }
}
