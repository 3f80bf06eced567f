/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::anyhow;
use foldhash::fast::FixedState;

use super::ArcInput;
use crate::config::input::AnyInputConfig;

static RUNTIME_INPUT_REGISTRY: Mutex<HashMap<String, ArcInput, FixedState>> =
    Mutex::new(HashMap::with_hasher(FixedState::with_seed(0)));

pub(super) fn add(input: ArcInput) -> anyhow::Result<()> {
    let mut ht = RUNTIME_INPUT_REGISTRY.lock().unwrap();
    if ht.contains_key(input.name()) {
        input.abort();
        return Err(anyhow!("input {} is still running", input.name()));
    }
    ht.insert(input.name().to_string(), input);
    Ok(())
}

pub(super) fn del(name: &str) -> Option<ArcInput> {
    let mut ht = RUNTIME_INPUT_REGISTRY.lock().unwrap();
    ht.remove(name)
}

pub(super) fn get_names() -> HashSet<String> {
    let ht = RUNTIME_INPUT_REGISTRY.lock().unwrap();
    ht.keys().cloned().collect()
}

pub(super) fn get_config(name: &str) -> Option<AnyInputConfig> {
    let ht = RUNTIME_INPUT_REGISTRY.lock().unwrap();
    ht.get(name).map(|input| input.config())
}
