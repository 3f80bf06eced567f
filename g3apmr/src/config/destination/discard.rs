/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::anyhow;
use yaml_rust::Yaml;
use yaml_rust::yaml::Hash;

use super::{AnyDestinationConfig, DestinationConfig, DestinationConfigDiffAction};
use crate::config::yaml;

const DESTINATION_CONFIG_TYPE: &str = "Discard";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscardDestinationConfig {
    name: String,
    patterns: Vec<String>,
}

impl DiscardDestinationConfig {
    pub fn new(name: &str, patterns: Vec<String>) -> Self {
        DiscardDestinationConfig {
            name: name.to_string(),
            patterns,
        }
    }

    pub(crate) fn parse(map: &Hash) -> anyhow::Result<Self> {
        let mut dest = DiscardDestinationConfig::new("", Vec::new());
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
            _ => Err(anyhow!("invalid key {k}")),
        }
    }
}

impl DestinationConfig for DiscardDestinationConfig {
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
        let AnyDestinationConfig::Discard(new) = new else {
            return DestinationConfigDiffAction::SpawnNew;
        };

        if self.patterns != new.patterns {
            DestinationConfigDiffAction::UpdatePatterns
        } else {
            DestinationConfigDiffAction::NoAction
        }
    }
}
