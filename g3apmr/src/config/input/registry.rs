/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use foldhash::fast::FixedState;

use super::AnyInputConfig;

static INITIAL_INPUT_CONFIG_REGISTRY: Mutex<HashMap<String, Arc<AnyInputConfig>, FixedState>> =
    Mutex::new(HashMap::with_hasher(FixedState::with_seed(0)));

pub(crate) fn clear() {
    let mut ht = INITIAL_INPUT_CONFIG_REGISTRY.lock().unwrap();
    ht.clear();
}

pub(super) fn add(input: AnyInputConfig) -> Option<AnyInputConfig> {
    let name = input.name().to_string();
    let input = Arc::new(input);
    let mut ht = INITIAL_INPUT_CONFIG_REGISTRY.lock().unwrap();
    ht.insert(name, input).map(|v| v.as_ref().clone())
}

pub(crate) fn get(name: &str) -> Option<Arc<AnyInputConfig>> {
    let ht = INITIAL_INPUT_CONFIG_REGISTRY.lock().unwrap();
    ht.get(name).cloned()
}

pub(crate) fn get_all() -> Vec<Arc<AnyInputConfig>> {
    let ht = INITIAL_INPUT_CONFIG_REGISTRY.lock().unwrap();
    ht.values().cloned().collect()
}
