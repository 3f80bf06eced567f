/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;

use g3_apm_proto::Metric;

mod accumulator;
pub use accumulator::{Accumulator, AccumulatorStats};

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("receiver is unavailable")]
    Unavailable,
    #[error("flush failed: {0}")]
    Failed(String),
}

/// Takes ownership of each flushed batch
pub trait FlushReceiver: Send + Sync {
    fn on_flush(&self, metrics: Vec<Metric>, count: usize) -> Result<(), FlushError>;
}

pub type ArcFlushReceiver = Arc<dyn FlushReceiver>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccumulatorConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Keep only the latest value per metric name within a batch
    pub conflate: bool,
}

impl AccumulatorConfig {
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        AccumulatorConfig {
            batch_size,
            flush_interval,
            conflate: false,
        }
    }

    pub fn check(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow!("batch size should not be zero"));
        }
        if self.flush_interval.is_zero() {
            return Err(anyhow!("flush interval should not be zero"));
        }
        Ok(())
    }
}
