/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use globset::GlobBuilder;
use lru::LruCache;
use regex::bytes::Regex;
use thiserror::Error;

const REGEX_PREFIX: &str = "re:";
const MATCH_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(8192).unwrap();

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("invalid glob pattern {0}: {1}")]
    Glob(String, globset::Error),
    #[error("failed to compile pattern {0}: {1}")]
    Compile(String, regex::Error),
}

/// Compile a glob pattern, or a raw regex with the `re:` prefix
///
/// In globs `*` and `?` stay inside one name segment, `**` crosses segments.
pub fn compile_pattern(pattern: &str) -> Result<Regex, PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }
    match pattern.strip_prefix(REGEX_PREFIX) {
        Some("") => Err(PatternError::Empty),
        Some(re) => Regex::new(re).map_err(|e| PatternError::Compile(pattern.to_string(), e)),
        None => {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| PatternError::Glob(pattern.to_string(), e))?;
            Regex::new(glob.regex()).map_err(|e| PatternError::Compile(pattern.to_string(), e))
        }
    }
}

fn new_match_cache() -> Mutex<LruCache<String, bool, ahash::RandomState>> {
    Mutex::new(LruCache::with_hasher(
        MATCH_CACHE_CAPACITY,
        ahash::RandomState::new(),
    ))
}

/// An immutable snapshot of compiled patterns with its own match cache
pub struct PatternGroup {
    sources: Vec<String>,
    regexes: Vec<Regex>,
    cache: Mutex<LruCache<String, bool, ahash::RandomState>>,
}

impl PatternGroup {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let mut sources = Vec::with_capacity(patterns.len());
        let mut regexes = Vec::with_capacity(patterns.len());
        for p in patterns {
            let p = p.as_ref();
            regexes.push(compile_pattern(p)?);
            sources.push(p.to_string());
        }
        Ok(PatternGroup {
            sources,
            regexes,
            cache: new_match_cache(),
        })
    }

    pub fn is_match(&self, key: &str) -> bool {
        let mut cache = self.cache.lock().unwrap();
        if let Some(hit) = cache.get(key) {
            return *hit;
        }
        let hit = self.regexes.iter().any(|re| re.is_match(key.as_bytes()));
        cache.put(key.to_string(), hit);
        hit
    }

    #[inline]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    #[cfg(test)]
    fn is_cached(&self, key: &str) -> bool {
        self.cache.lock().unwrap().contains(key)
    }
}

/// Copy on write set of patterns, readers never block on updates
pub struct PatternSet {
    group: ArcSwap<PatternGroup>,
    update_lock: Mutex<()>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        Ok(PatternSet {
            group: ArcSwap::from_pointee(PatternGroup::new(patterns)?),
            update_lock: Mutex::new(()),
        })
    }

    #[inline]
    pub fn is_match(&self, key: &str) -> bool {
        self.group.load().is_match(key)
    }

    pub fn snapshot(&self) -> Arc<PatternGroup> {
        self.group.load_full()
    }

    pub fn patterns(&self) -> Vec<String> {
        self.group.load().sources().to_vec()
    }

    /// On error the current set is left untouched
    pub fn add_pattern(&self, pattern: &str) -> Result<bool, PatternError> {
        let _guard = self.update_lock.lock().unwrap();
        let cur = self.group.load();
        if cur.sources.iter().any(|p| p == pattern) {
            return Ok(false);
        }
        let mut sources = cur.sources.clone();
        sources.push(pattern.to_string());
        self.group.store(Arc::new(PatternGroup::new(&sources)?));
        Ok(true)
    }

    pub fn remove_pattern(&self, pattern: &str) -> bool {
        let _guard = self.update_lock.lock().unwrap();
        let cur = self.group.load();
        let Some(pos) = cur.sources.iter().position(|p| p == pattern) else {
            return false;
        };
        let mut sources = cur.sources.clone();
        let mut regexes = cur.regexes.clone();
        sources.remove(pos);
        regexes.remove(pos);
        self.group.store(Arc::new(PatternGroup {
            sources,
            regexes,
            cache: new_match_cache(),
        }));
        true
    }

    /// Swap in a whole new list, used on config reload
    pub fn replace<S: AsRef<str>>(&self, patterns: &[S]) -> Result<(), PatternError> {
        let group = PatternGroup::new(patterns)?;
        let _guard = self.update_lock.lock().unwrap();
        self.group.store(Arc::new(group));
        Ok(())
    }
}
