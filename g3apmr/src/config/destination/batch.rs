/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use yaml_rust::Yaml;
use yaml_rust::yaml::Hash;

use super::{AnyDestinationConfig, DestinationConfig, DestinationConfigDiffAction};
use crate::accumulate::AccumulatorConfig;
use crate::config::yaml;

const DESTINATION_CONFIG_TYPE: &str = "Batch";

/// Where flushed batches go
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BatchSinkConfig {
    Console,
    Log,
    Discard,
    Forward(SocketAddr),
}

impl BatchSinkConfig {
    fn parse(v: &Yaml) -> anyhow::Result<Self> {
        match v {
            Yaml::String(s) => match yaml::normalize_key(s).as_str() {
                "console" | "stdout" => Ok(BatchSinkConfig::Console),
                "log" => Ok(BatchSinkConfig::Log),
                "discard" => Ok(BatchSinkConfig::Discard),
                _ => Err(anyhow!("unsupported sink type {s}")),
            },
            Yaml::Hash(map) => {
                let v = map
                    .get(&Yaml::String("forward".to_string()))
                    .ok_or_else(|| anyhow!("no forward address set"))?;
                let addr = yaml::as_sockaddr(v).context("invalid forward address")?;
                Ok(BatchSinkConfig::Forward(addr))
            }
            _ => Err(anyhow!(
                "yaml value type for 'batch sink' should be 'string' or 'map'"
            )),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchDestinationConfig {
    name: String,
    patterns: Vec<String>,
    pub accumulator: AccumulatorConfig,
    pub sink: BatchSinkConfig,
}

impl BatchDestinationConfig {
    pub fn new(name: &str, patterns: Vec<String>) -> Self {
        BatchDestinationConfig {
            name: name.to_string(),
            patterns,
            accumulator: AccumulatorConfig::new(100, Duration::from_secs(1)),
            sink: BatchSinkConfig::Log,
        }
    }

    pub(crate) fn parse(map: &Hash) -> anyhow::Result<Self> {
        let mut dest = BatchDestinationConfig::new("", Vec::new());
        yaml::foreach_kv(map, |k, v| dest.set(k, v))?;
        super::check_base(&dest.name, &dest.patterns)?;
        dest.accumulator.check()?;
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
            "batch_size" => {
                self.accumulator.batch_size = yaml::as_usize(v)?;
                Ok(())
            }
            "flush_interval" => {
                self.accumulator.flush_interval = yaml::as_duration(v)?;
                Ok(())
            }
            "conflate" => {
                self.accumulator.conflate = yaml::as_bool(v)?;
                Ok(())
            }
            "sink" => {
                self.sink = BatchSinkConfig::parse(v)
                    .context(format!("invalid batch sink value for key {k}"))?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }
}

impl DestinationConfig for BatchDestinationConfig {
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
        let AnyDestinationConfig::Batch(new) = new else {
            return DestinationConfigDiffAction::SpawnNew;
        };

        if self.accumulator != new.accumulator || self.sink != new.sink {
            DestinationConfigDiffAction::SpawnNew
        } else if self.patterns != new.patterns {
            DestinationConfigDiffAction::UpdatePatterns
        } else {
            DestinationConfigDiffAction::NoAction
        }
    }
}
