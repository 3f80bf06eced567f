/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use yaml_rust::{Yaml, yaml};

use g3_apm_mux::MuxConfig;

use crate::accumulate::AccumulatorConfig;

static ROUTER_CONFIG: Mutex<Option<Arc<RouterConfig>>> = Mutex::new(None);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterConfig {
    pub confirm_timeout: Duration,
    pub reset_timeout: Duration,
    pub default_protocol: Option<String>,
    pub first_token: i64,
    pub reply_queue_size: usize,
    pub udp_session_idle: Duration,
    pub subscription: AccumulatorConfig,
    pub mux: MuxConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            confirm_timeout: Duration::from_millis(2000),
            reset_timeout: Duration::from_secs(15),
            default_protocol: Some("text".to_string()),
            first_token: 1,
            reply_queue_size: 1024,
            udp_session_idle: Duration::from_secs(300),
            subscription: AccumulatorConfig::new(100, Duration::from_secs(1)),
            mux: MuxConfig::default(),
        }
    }
}

impl RouterConfig {
    pub(crate) fn parse(map: &yaml::Hash) -> anyhow::Result<Self> {
        let mut config = RouterConfig::default();
        super::yaml::foreach_kv(map, |k, v| config.set(k, v))?;
        config.check()?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match super::yaml::normalize_key(k).as_str() {
            "confirm_timeout" => {
                self.confirm_timeout = super::yaml::as_duration(v)?;
                Ok(())
            }
            "reset_timeout" => {
                self.reset_timeout = super::yaml::as_duration(v)?;
                Ok(())
            }
            "default_protocol" | "default_handler" => {
                self.default_protocol = match v {
                    Yaml::Null => None,
                    _ => Some(super::yaml::as_string(v)?),
                };
                Ok(())
            }
            "first_token" => {
                self.first_token = super::yaml::as_i64(v)?;
                Ok(())
            }
            "reply_queue_size" => {
                self.reply_queue_size = super::yaml::as_usize(v)?;
                Ok(())
            }
            "udp_session_idle" => {
                self.udp_session_idle = super::yaml::as_duration(v)?;
                Ok(())
            }
            "byte_budget" => {
                self.mux.set_byte_budget(super::yaml::as_usize(v)?);
                Ok(())
            }
            "xml_max_events" => {
                let n = super::yaml::as_usize(v)?;
                self.mux.xml_limit_mut().set_max_events(n);
                Ok(())
            }
            "xml_max_tags" => {
                let n = super::yaml::as_usize(v)?;
                self.mux.xml_limit_mut().set_max_tags(n);
                Ok(())
            }
            "subscription_batch_size" => {
                self.subscription.batch_size = super::yaml::as_usize(v)?;
                Ok(())
            }
            "subscription_flush_interval" => {
                self.subscription.flush_interval = super::yaml::as_duration(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.first_token < 0 {
            return Err(anyhow!("first token should not be negative"));
        }
        if self.mux.byte_budget() < 2 {
            return Err(anyhow!("byte budget is too small"));
        }
        if self.reply_queue_size == 0 {
            return Err(anyhow!("reply queue size should not be zero"));
        }
        self.subscription.check()
    }

    #[inline]
    pub fn mux(&self) -> &MuxConfig {
        &self.mux
    }
}

pub(crate) fn load(v: &Yaml) -> anyhow::Result<()> {
    let config = match v {
        Yaml::Hash(map) => RouterConfig::parse(map)?,
        Yaml::Null => RouterConfig::default(),
        _ => return Err(anyhow!("yaml value type for 'router' should be 'map'")),
    };
    set(config);
    Ok(())
}

pub fn set(config: RouterConfig) {
    let mut guard = ROUTER_CONFIG.lock().unwrap();
    *guard = Some(Arc::new(config));
}

pub fn get() -> Arc<RouterConfig> {
    let mut guard = ROUTER_CONFIG.lock().unwrap();
    guard
        .get_or_insert_with(|| Arc::new(RouterConfig::default()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::yaml::load_test_doc;

    #[test]
    fn parse() {
        let doc = load_test_doc(
            "confirm_timeout: 3s\nbyte-budget: 512\nxml_max_tags: 5\ndefault_protocol: ~\nsubscription_batch_size: 10\n",
        );
        let config = RouterConfig::parse(doc.as_hash().unwrap()).unwrap();
        assert_eq!(config.confirm_timeout, Duration::from_secs(3));
        assert_eq!(config.mux().byte_budget(), 512);
        assert_eq!(config.mux().xml_limit().max_tags(), 5);
        assert_eq!(config.mux().xml_limit().max_events(), 10);
        assert_eq!(config.default_protocol, None);
        assert_eq!(config.subscription.batch_size, 10);
        assert_eq!(config.reset_timeout, Duration::from_secs(15));
    }

    #[test]
    fn invalid() {
        let doc = load_test_doc("byte_budget: 1\n");
        assert!(RouterConfig::parse(doc.as_hash().unwrap()).is_err());
        let doc = load_test_doc("no_such_key: 1\n");
        assert!(RouterConfig::parse(doc.as_hash().unwrap()).is_err());
    }
}
