/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::{Arc, Mutex};

use ahash::{AHashMap, AHashSet};
use arc_swap::ArcSwap;
use log::debug;

use crate::{MatchResult, MuxConfig, MuxError, ProtocolMatcher};

/// Up to 8 leading bytes of a connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MagicKey {
    len: u8,
    bytes: [u8; 8],
}

impl MagicKey {
    pub fn new(data: &[u8]) -> Self {
        let len = data.len().min(8);
        let mut bytes = [0u8; 8];
        bytes[..len].copy_from_slice(&data[..len]);
        MagicKey {
            len: len as u8,
            bytes,
        }
    }
}

struct HandlerSet<H: ?Sized> {
    handlers: Vec<Arc<H>>,
    default: Option<Arc<H>>,
}

impl<H: ?Sized> HandlerSet<H> {
    fn contains(&self, handler: &Arc<H>) -> bool {
        self.handlers.iter().any(|h| Arc::ptr_eq(h, handler))
            || self.default.as_ref().is_some_and(|h| Arc::ptr_eq(h, handler))
    }
}

pub enum SwitchOutcome<H: ?Sized> {
    NeedMoreData,
    /// Detected, the connection should be rewired to this handler
    Matched(Arc<H>),
    /// Nothing matched within the byte budget
    Fallback(Arc<H>),
}

/// Per connection detection state
#[derive(Default)]
pub struct SwitchState {
    failed: AHashSet<String>,
}

impl SwitchState {
    pub fn has_failed(&self, protocol: &str) -> bool {
        self.failed.contains(protocol)
    }
}

/// Picks a handler for a fresh connection from the first bytes it sends
pub struct ProtocolSwitch<H: ?Sized> {
    config: MuxConfig,
    set: ArcSwap<HandlerSet<H>>,
    update_lock: Mutex<()>,
    cache: Mutex<AHashMap<MagicKey, Arc<H>>>,
}

impl<H: ProtocolMatcher + ?Sized> ProtocolSwitch<H> {
    pub fn new(config: MuxConfig) -> Self {
        ProtocolSwitch {
            config,
            set: ArcSwap::from_pointee(HandlerSet {
                handlers: Vec::new(),
                default: None,
            }),
            update_lock: Mutex::new(()),
            cache: Mutex::new(AHashMap::new()),
        }
    }

    #[inline]
    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Append a handler, handlers are tried in registration order
    pub fn register(&self, handler: Arc<H>) -> Result<(), MuxError> {
        let _guard = self.update_lock.lock().unwrap();
        let cur = self.set.load();
        if cur
            .handlers
            .iter()
            .any(|h| h.protocol() == handler.protocol())
        {
            return Err(MuxError::DuplicateProtocol(handler.protocol().to_string()));
        }
        let mut handlers = cur.handlers.clone();
        handlers.push(handler);
        self.set.store(Arc::new(HandlerSet {
            handlers,
            default: cur.default.clone(),
        }));
        Ok(())
    }

    /// Remove a handler and every cached match pointing to it
    pub fn deregister(&self, protocol: &str) -> Option<Arc<H>> {
        let _guard = self.update_lock.lock().unwrap();
        let cur = self.set.load();
        let pos = cur.handlers.iter().position(|h| h.protocol() == protocol)?;
        let mut handlers = cur.handlers.clone();
        let removed = handlers.remove(pos);
        self.set.store(Arc::new(HandlerSet {
            handlers,
            default: cur.default.clone(),
        }));

        let mut cache = self.cache.lock().unwrap();
        cache.retain(|_, h| !Arc::ptr_eq(h, &removed));
        debug!("deregistered protocol {protocol}");
        Some(removed)
    }

    pub fn set_default(&self, handler: Option<Arc<H>>) {
        let _guard = self.update_lock.lock().unwrap();
        let cur = self.set.load();
        self.set.store(Arc::new(HandlerSet {
            handlers: cur.handlers.clone(),
            default: handler,
        }));
    }

    pub fn protocols(&self) -> Vec<String> {
        self.set
            .load()
            .handlers
            .iter()
            .map(|h| h.protocol().to_string())
            .collect()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    fn cached(&self, key: &MagicKey, set: &HandlerSet<H>) -> Option<Arc<H>> {
        let mut cache = self.cache.lock().unwrap();
        let handler = cache.get(key)?;
        if set.contains(handler) {
            Some(Arc::clone(handler))
        } else {
            // raced with a deregister
            cache.remove(key);
            None
        }
    }

    fn cache_match(&self, key: MagicKey, handler: &Arc<H>) -> Arc<H> {
        let mut cache = self.cache.lock().unwrap();
        Arc::clone(cache.entry(key).or_insert_with(|| Arc::clone(handler)))
    }

    /// Inspect all data received so far on a connection
    pub fn inspect(
        &self,
        state: &mut SwitchState,
        data: &[u8],
    ) -> Result<SwitchOutcome<H>, MuxError> {
        if data.len() < 2 {
            return Ok(SwitchOutcome::NeedMoreData);
        }

        let set = self.set.load();
        let key = MagicKey::new(data);
        if let Some(handler) = self.cached(&key, &set) {
            return Ok(SwitchOutcome::Matched(handler));
        }

        let (magic1, magic2) = (data[0], data[1]);
        let mut pending = false;
        for handler in set.handlers.iter() {
            if state.has_failed(handler.protocol()) {
                continue;
            }
            if data.len() < handler.required_bytes() {
                pending = true;
                continue;
            }
            if handler.match_magic(magic1, magic2) {
                return Ok(SwitchOutcome::Matched(self.cache_match(key, handler)));
            }
            match handler.match_content(data, &self.config) {
                MatchResult::Matched => {
                    return Ok(SwitchOutcome::Matched(self.cache_match(key, handler)));
                }
                MatchResult::NeedMoreData => pending = true,
                MatchResult::Mismatch => {
                    debug!("protocol {} excluded", handler.protocol());
                    state.failed.insert(handler.protocol().to_string());
                }
            }
        }

        if pending && data.len() < self.config.byte_budget() {
            return Ok(SwitchOutcome::NeedMoreData);
        }
        match &set.default {
            Some(handler) => Ok(SwitchOutcome::Fallback(Arc::clone(handler))),
            None => Err(MuxError::NoMatchingProtocol(data.len())),
        }
    }
}
