/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use foldhash::fast::FixedState;

use super::AnyDestinationConfig;

static INITIAL_DESTINATION_CONFIG_REGISTRY: Mutex<
    HashMap<String, Arc<AnyDestinationConfig>, FixedState>,
> = Mutex::new(HashMap::with_hasher(FixedState::with_seed(0)));

pub(crate) fn clear() {
    let mut ht = INITIAL_DESTINATION_CONFIG_REGISTRY.lock().unwrap();
    ht.clear();
}

pub(super) fn add(dest: AnyDestinationConfig) -> Option<AnyDestinationConfig> {
    let name = dest.name().to_string();
    let dest = Arc::new(dest);
    let mut ht = INITIAL_DESTINATION_CONFIG_REGISTRY.lock().unwrap();
    ht.insert(name, dest).map(|v| v.as_ref().clone())
}

pub(crate) fn get(name: &str) -> Option<Arc<AnyDestinationConfig>> {
    let ht = INITIAL_DESTINATION_CONFIG_REGISTRY.lock().unwrap();
    ht.get(name).cloned()
}

pub(crate) fn get_all() -> Vec<Arc<AnyDestinationConfig>> {
    let ht = INITIAL_DESTINATION_CONFIG_REGISTRY.lock().unwrap();
    ht.values().cloned().collect()
}
