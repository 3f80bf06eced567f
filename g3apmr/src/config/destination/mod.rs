/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, yaml};

mod registry;
pub(crate) use registry::{clear, get, get_all};

pub mod batch;
pub mod console;
pub mod discard;

const CONFIG_KEY_DESTINATION_TYPE: &str = "type";
const CONFIG_KEY_DESTINATION_NAME: &str = "name";
const CONFIG_KEY_DESTINATION_PATTERNS: &str = "patterns";

#[derive(Debug, PartialEq, Eq)]
pub enum DestinationConfigDiffAction {
    NoAction,
    UpdatePatterns,
    SpawnNew,
}

pub trait DestinationConfig {
    fn name(&self) -> &str;
    fn destination_type(&self) -> &'static str;
    fn patterns(&self) -> &[String];

    fn diff_action(&self, new: &AnyDestinationConfig) -> DestinationConfigDiffAction;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnyDestinationConfig {
    Console(console::ConsoleDestinationConfig),
    Discard(discard::DiscardDestinationConfig),
    Batch(batch::BatchDestinationConfig),
}

macro_rules! dispatch {
    ($self:ident, $c:ident => $e:expr) => {
        match $self {
            AnyDestinationConfig::Console($c) => $e,
            AnyDestinationConfig::Discard($c) => $e,
            AnyDestinationConfig::Batch($c) => $e,
        }
    };
}

impl AnyDestinationConfig {
    pub fn name(&self) -> &str {
        dispatch!(self, c => c.name())
    }

    pub fn destination_type(&self) -> &'static str {
        dispatch!(self, c => c.destination_type())
    }

    pub fn patterns(&self) -> &[String] {
        dispatch!(self, c => c.patterns())
    }

    pub fn diff_action(&self, new: &AnyDestinationConfig) -> DestinationConfigDiffAction {
        dispatch!(self, c => c.diff_action(new))
    }
}

/// Shared by every destination type
fn parse_patterns(v: &Yaml) -> anyhow::Result<Vec<String>> {
    let patterns = super::yaml::as_list(v, super::yaml::as_string)?;
    for p in &patterns {
        crate::route::compile_pattern(p)?;
    }
    Ok(patterns)
}

fn check_base(name: &str, patterns: &[String]) -> anyhow::Result<()> {
    if name.is_empty() {
        return Err(anyhow!("name is not set"));
    }
    if patterns.is_empty() {
        return Err(anyhow!("no pattern set"));
    }
    Ok(())
}

pub(crate) fn load_all(v: &Yaml) -> anyhow::Result<()> {
    super::yaml::foreach_map(v, |map| {
        let dest = load_destination(map)?;
        if let Some(old_dest) = registry::add(dest) {
            Err(anyhow!(
                "destination with name {} already exists",
                old_dest.name()
            ))
        } else {
            Ok(())
        }
    })
}

fn load_destination(map: &yaml::Hash) -> anyhow::Result<AnyDestinationConfig> {
    let dest_type = super::yaml::hash_get_required_str(map, CONFIG_KEY_DESTINATION_TYPE)?;
    match super::yaml::normalize_key(dest_type).as_str() {
        "console" => {
            let dest = console::ConsoleDestinationConfig::parse(map)
                .context("failed to load this Console destination")?;
            Ok(AnyDestinationConfig::Console(dest))
        }
        "discard" => {
            let dest = discard::DiscardDestinationConfig::parse(map)
                .context("failed to load this Discard destination")?;
            Ok(AnyDestinationConfig::Discard(dest))
        }
        "batch" | "accumulate" => {
            let dest = batch::BatchDestinationConfig::parse(map)
                .context("failed to load this Batch destination")?;
            Ok(AnyDestinationConfig::Batch(dest))
        }
        _ => Err(anyhow!("unsupported destination type {dest_type}")),
    }
}
