/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use log::error;

use crate::MetricName;

pub trait MetricCatalog {
    /// Get the token of `name`, assigning a new one if it is first seen
    fn assign_token(&self, name: &Arc<MetricName>) -> i64;
    fn lookup(&self, token: i64) -> Option<Arc<MetricName>>;
    fn reset(&self);
    fn len(&self) -> usize;
}

pub type ArcMetricCatalog = Arc<dyn MetricCatalog + Send + Sync>;

struct CatalogTable {
    by_fqn: AHashMap<String, i64>,
    by_token: AHashMap<i64, Arc<MetricName>>,
    next_token: i64,
}

/// In-process catalog, tokens are never reused until reset
pub struct MemoryCatalog {
    first_token: i64,
    table: Mutex<CatalogTable>,
}

impl MemoryCatalog {
    pub fn new(first_token: i64) -> Self {
        MemoryCatalog {
            first_token,
            table: Mutex::new(CatalogTable {
                by_fqn: AHashMap::new(),
                by_token: AHashMap::new(),
                next_token: first_token,
            }),
        }
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        MemoryCatalog::new(1)
    }
}

impl MetricCatalog for MemoryCatalog {
    fn assign_token(&self, name: &Arc<MetricName>) -> i64 {
        let mut table = self.table.lock().unwrap();
        if let Some(token) = table.by_fqn.get(name.fqn()) {
            return *token;
        }

        let token = table.next_token;
        table.next_token += 1;
        table.by_fqn.insert(name.fqn().to_string(), token);
        if let Some(old) = table.by_token.insert(token, Arc::clone(name)) {
            debug_assert!(false, "token {token} reassigned from {old} to {name}");
            error!("catalog corrupted: token {token} reassigned from {old} to {name}");
        }
        token
    }

    fn lookup(&self, token: i64) -> Option<Arc<MetricName>> {
        let table = self.table.lock().unwrap();
        table.by_token.get(&token).cloned()
    }

    fn reset(&self) {
        let mut table = self.table.lock().unwrap();
        table.by_fqn.clear();
        table.by_token.clear();
        table.next_token = self.first_token;
    }

    fn len(&self) -> usize {
        self.table.lock().unwrap().by_token.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn name(s: &str) -> Arc<MetricName> {
        Arc::new(MetricName::from_str(s).unwrap())
    }

    #[test]
    fn stable_tokens() {
        let catalog = MemoryCatalog::new(42);
        let cpu = name("host1/agentA/cpu/util");
        let mem = name("host1/agentA/mem/used");

        assert_eq!(catalog.assign_token(&cpu), 42);
        assert_eq!(catalog.assign_token(&mem), 43);
        assert_eq!(catalog.assign_token(&cpu), 42);
        assert_eq!(catalog.assign_token(&name("host1/agentA/cpu/util")), 42);
        assert_eq!(catalog.lookup(43), Some(mem));
        assert_eq!(catalog.lookup(44), None);
        assert_eq!(catalog.len(), 2);

        catalog.reset();
        assert_eq!(catalog.len(), 0);
        assert_eq!(catalog.lookup(42), None);
    }

    #[test]
    fn concurrent_assign() {
        let catalog = Arc::new(MemoryCatalog::default());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let catalog = Arc::clone(&catalog);
            handles.push(std::thread::spawn(move || {
                (0..100)
                    .map(|i| catalog.assign_token(&name(&format!("h/a/m{i}"))))
                    .collect::<Vec<_>>()
            }));
        }
        let results: Vec<Vec<i64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(catalog.len(), 100);
    }
}
