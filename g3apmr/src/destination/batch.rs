/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use log::{debug, info};

use g3_apm_proto::Metric;
use g3_delay::watch::{WatchControl, WatchState};

use super::{Destination, DestinationBase, DestinationState};
use crate::accumulate::{Accumulator, AccumulatorConfig, FlushError, FlushReceiver};
use crate::client::AgentClient;
use crate::route::PatternError;

pub enum BatchSink {
    Console,
    Log,
    Discard,
    /// Send to an upstream router, only while its connection watch is up
    Forward {
        client: Arc<AgentClient>,
        control: Arc<WatchControl>,
    },
}

impl BatchSink {
    fn as_str(&self) -> &'static str {
        match self {
            BatchSink::Console => "console",
            BatchSink::Log => "log",
            BatchSink::Discard => "discard",
            BatchSink::Forward { .. } => "forward",
        }
    }
}

struct SinkReceiver {
    name: String,
    sink: BatchSink,
}

impl FlushReceiver for SinkReceiver {
    fn on_flush(&self, metrics: Vec<Metric>, count: usize) -> Result<(), FlushError> {
        match &self.sink {
            BatchSink::Console => {
                let mut stdout = std::io::stdout().lock();
                super::console::write_lines(&mut stdout, None, &metrics)
                    .map_err(|e| FlushError::Failed(e.to_string()))?;
            }
            BatchSink::Log => {
                info!("{}: flushed {count} metrics", self.name);
                for m in &metrics {
                    debug!("{}: {}", self.name, super::console::format_line(None, m));
                }
            }
            BatchSink::Discard => {}
            BatchSink::Forward { client, control } => {
                if control.state() != WatchState::Callback {
                    return Err(FlushError::Unavailable);
                }
                client
                    .send(&metrics)
                    .map_err(|e| FlushError::Failed(e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// Accumulates matched metrics and flushes them to a sink
pub struct BatchDestination {
    base: DestinationBase,
    accumulator: Arc<Accumulator>,
    watches: Vec<Arc<WatchControl>>,
}

impl BatchDestination {
    /// Must be called inside a tokio runtime
    pub fn spawn<S: AsRef<str>>(
        name: &str,
        patterns: &[S],
        config: AccumulatorConfig,
        sink: BatchSink,
    ) -> Result<Self, PatternError> {
        let base = DestinationBase::new(name, patterns)?;
        debug!("destination {name} flushes to {} sink", sink.as_str());
        let receiver = Arc::new(SinkReceiver {
            name: name.to_string(),
            sink,
        });
        let accumulator = Accumulator::spawn(name, config, receiver);
        Ok(BatchDestination {
            base,
            accumulator,
            watches: Vec::new(),
        })
    }

    /// Watches to cancel once this destination is stopped
    pub fn with_watches(mut self, watches: Vec<Arc<WatchControl>>) -> Self {
        self.watches = watches;
        self
    }

    #[inline]
    pub fn accumulator(&self) -> &Arc<Accumulator> {
        &self.accumulator
    }
}

impl Destination for BatchDestination {
    fn base(&self) -> &DestinationBase {
        &self.base
    }

    fn destination_type(&self) -> &'static str {
        "Batch"
    }

    fn on_accepted(&self, metric: &Metric) {
        self.accumulator.append(metric.clone());
    }

    fn flush(&self) -> usize {
        self.accumulator.flush()
    }

    fn stop(&self) {
        self.base.set_state(DestinationState::Stopping);
        self.accumulator.stop();
        for w in &self.watches {
            w.cancel();
        }
        self.base.set_state(DestinationState::Stopped);
    }
}
