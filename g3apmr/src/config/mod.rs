/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use yaml_rust::Yaml;
use yaml_rust::yaml::Hash;

pub mod destination;
pub mod input;
pub mod router;
pub mod watch;

pub(crate) mod yaml;

pub fn load(config_file: &Path) -> anyhow::Result<()> {
    // allow multiple docs, and treat them as the same
    yaml::foreach_doc(config_file, |_, doc| match doc {
        Yaml::Hash(map) => load_doc(map),
        _ => Err(anyhow!("yaml doc root should be hash")),
    })
}

pub async fn reload(config_file: PathBuf) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || reload_blocking(&config_file))
        .await
        .map_err(|e| anyhow!("failed to join reload task: {e}"))?
}

fn clear_all() {
    input::clear();
    destination::clear();
}

fn reload_blocking(config_file: &Path) -> anyhow::Result<()> {
    clear_all();
    yaml::foreach_doc(config_file, |_, doc| match doc {
        Yaml::Hash(map) => reload_doc(map),
        _ => Err(anyhow!("yaml doc root should be hash")),
    })
}

fn reload_doc(map: &Hash) -> anyhow::Result<()> {
    yaml::foreach_kv(map, |k, v| match yaml::normalize_key(k).as_str() {
        "log" | "router" | "watch" => Ok(()),
        "input" => input::load_all(v),
        "destination" => destination::load_all(v),
        _ => Ok(()),
    })
}

fn load_doc(map: &Hash) -> anyhow::Result<()> {
    yaml::foreach_kv(map, |k, v| match yaml::normalize_key(k).as_str() {
        "log" => Ok(()),
        "router" => router::load(v),
        "watch" => watch::load(v),
        "input" => input::load_all(v),
        "destination" => destination::load_all(v),
        _ => Err(anyhow!("invalid key {k} in main conf")),
    })
}
