/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use yaml_rust::{Yaml, yaml};

static WATCH_CONFIG: Mutex<Option<Arc<WatchConfig>>> = Mutex::new(None);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchConfig {
    pub poll_period: Duration,
    pub reconnect_period: Duration,
    pub connect_timeout: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            poll_period: Duration::from_secs(15),
            reconnect_period: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
        }
    }
}

impl WatchConfig {
    fn parse(map: &yaml::Hash) -> anyhow::Result<Self> {
        let mut config = WatchConfig::default();
        super::yaml::foreach_kv(map, |k, v| match super::yaml::normalize_key(k).as_str() {
            "poll_period" => {
                config.poll_period = super::yaml::as_duration(v)?;
                Ok(())
            }
            "reconnect_period" => {
                config.reconnect_period = super::yaml::as_duration(v)?;
                Ok(())
            }
            "connect_timeout" => {
                config.connect_timeout = super::yaml::as_duration(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        })?;
        if config.poll_period.is_zero() || config.reconnect_period.is_zero() {
            return Err(anyhow!("watch period should not be zero"));
        }
        Ok(config)
    }
}

pub(crate) fn load(v: &Yaml) -> anyhow::Result<()> {
    let config = match v {
        Yaml::Hash(map) => WatchConfig::parse(map)?,
        Yaml::Null => WatchConfig::default(),
        _ => return Err(anyhow!("yaml value type for 'watch' should be 'map'")),
    };
    let mut guard = WATCH_CONFIG.lock().unwrap();
    *guard = Some(Arc::new(config));
    Ok(())
}

pub fn get() -> Arc<WatchConfig> {
    let mut guard = WATCH_CONFIG.lock().unwrap();
    guard
        .get_or_insert_with(|| Arc::new(WatchConfig::default()))
        .clone()
}
