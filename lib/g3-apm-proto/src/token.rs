/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Mutex;

use ahash::AHashMap;

use crate::metric::TOKEN_UNKNOWN;

/// Sender side cache of tokens assigned by the router
#[derive(Default)]
pub struct TokenCache {
    inner: Mutex<AHashMap<String, i64>>,
}

impl TokenCache {
    pub fn get(&self, fqn: &str) -> i64 {
        let ht = self.inner.lock().unwrap();
        ht.get(fqn).copied().unwrap_or(TOKEN_UNKNOWN)
    }

    /// Record the token for `fqn`, the first recorded value wins
    ///
    /// Returns the token that is in effect after the call.
    pub fn set(&self, fqn: &str, token: i64) -> i64 {
        let mut ht = self.inner.lock().unwrap();
        if let Some(v) = ht.get(fqn) {
            return *v;
        }
        ht.insert(fqn.to_string(), token);
        token
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}
