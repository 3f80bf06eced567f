/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use yaml_rust::Yaml;
use yaml_rust::yaml::Hash;

use super::{AnyDestinationConfig, DestinationConfig, DestinationConfigDiffAction};
use crate::config::yaml;

const DESTINATION_CONFIG_TYPE: &str = "Console";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsoleDestinationConfig {
    name: String,
    patterns: Vec<String>,
    pub prefix: Option<String>,
}

impl ConsoleDestinationConfig {
    pub fn new(name: &str, patterns: Vec<String>) -> Self {
        ConsoleDestinationConfig {
            name: name.to_string(),
            patterns,
            prefix: None,
        }
    }

    pub(crate) fn parse(map: &Hash) -> anyhow::Result<Self> {
        let mut dest = ConsoleDestinationConfig::new("", Vec::new());
        yaml::foreach_kv(map, |k, v| dest.set(k, v))?;
        super::check_base(&dest.name, &dest.patterns)?;
        Ok(dest)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml::normalize_key(k).as_str() {
            super::CONFIG_KEY_DESTINATION_TYPE => Ok(()),
            super::CONFIG_KEY_DESTINATION_NAME => {
                self.name = yaml::as_string(v)?;
                Ok(())
            }
            super::CONFIG_KEY_DESTINATION_PATTERNS | "pattern" => {
                self.patterns = super::parse_patterns(v)?;
                Ok(())
            }
            "prefix" => {
                self.prefix = Some(yaml::as_string(v)?);
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }
}

impl DestinationConfig for ConsoleDestinationConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn destination_type(&self) -> &'static str {
        DESTINATION_CONFIG_TYPE
    }

    fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn diff_action(&self, new: &AnyDestinationConfig) -> DestinationConfigDiffAction {
        let AnyDestinationConfig::Console(new) = new else {
            return DestinationConfigDiffAction::SpawnNew;
        };

        if self.prefix != new.prefix {
            DestinationConfigDiffAction::SpawnNew
        } else if self.patterns != new.patterns {
            DestinationConfigDiffAction::UpdatePatterns
        } else {
            DestinationConfigDiffAction::NoAction
        }
    }
}
