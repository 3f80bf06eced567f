/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use g3_apm_proto::Metric;

use super::{AccumulatorConfig, ArcFlushReceiver};

#[derive(Default)]
pub struct AccumulatorStats {
    flush_count: AtomicU64,
    flush_failures: AtomicU64,
    last_flush_micros: AtomicU64,
    dropped: AtomicU64,
    conflated: AtomicU64,
}

impl AccumulatorStats {
    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }

    pub fn last_flush_elapsed(&self) -> Duration {
        Duration::from_micros(self.last_flush_micros.load(Ordering::Relaxed))
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn conflated(&self) -> u64 {
        self.conflated.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Buffer {
    items: Vec<Metric>,
    index: AHashMap<Arc<str>, usize>,
}

impl Buffer {
    fn take(&mut self) -> Vec<Metric> {
        self.index.clear();
        std::mem::take(&mut self.items)
    }

    fn take_front(&mut self, n: usize) -> Vec<Metric> {
        if n >= self.items.len() {
            return self.take();
        }
        let rest = self.items.split_off(n);
        let batch = std::mem::replace(&mut self.items, rest);
        if !self.index.is_empty() {
            self.index.clear();
            for (pos, m) in self.items.iter().enumerate() {
                self.index.insert(Arc::from(m.fqn()), pos);
            }
        }
        batch
    }
}

/// Buffers metrics and hands them on by size or by time
///
/// A size triggered batch is cut while the buffer is locked, so it never holds
/// more than `batch_size` items. Every hand-off holds a dedicated lock, at most
/// one flush is in progress at any time.
pub struct Accumulator {
    name: String,
    config: AccumulatorConfig,
    receiver: ArcFlushReceiver,
    buffer: Mutex<Buffer>,
    flush_lock: Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
    stats: AccumulatorStats,
}

impl Accumulator {
    pub fn new(name: &str, config: AccumulatorConfig, receiver: ArcFlushReceiver) -> Self {
        Accumulator {
            name: name.to_string(),
            config,
            receiver,
            buffer: Mutex::new(Buffer::default()),
            flush_lock: Mutex::new(()),
            timer: Mutex::new(None),
            stopped: AtomicBool::new(false),
            stats: AccumulatorStats::default(),
        }
    }

    /// Create and start the flush timer on the current runtime
    pub fn spawn(name: &str, config: AccumulatorConfig, receiver: ArcFlushReceiver) -> Arc<Self> {
        let acc = Arc::new(Accumulator::new(name, config, receiver));
        acc.start_timer();
        acc
    }

    fn start_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let period = self.config.flush_interval;
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(acc) = weak.upgrade() else {
                    break;
                };
                acc.flush();
            }
        });
        *self.timer.lock().unwrap() = Some(handle);
    }

    #[inline]
    pub fn config(&self) -> &AccumulatorConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &AccumulatorStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns false if the accumulator has been stopped
    pub fn append(&self, metric: Metric) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let batch = {
            let mut buffer = self.buffer.lock().unwrap();
            if self.config.conflate {
                let fqn: Arc<str> = Arc::from(metric.fqn());
                if let Some(pos) = buffer.index.get(&fqn).copied() {
                    buffer.items[pos] = metric;
                    self.stats.conflated.fetch_add(1, Ordering::Relaxed);
                } else {
                    let pos = buffer.items.len();
                    buffer.items.push(metric);
                    buffer.index.insert(fqn, pos);
                }
            } else {
                buffer.items.push(metric);
            }
            if buffer.items.len() >= self.config.batch_size {
                Some(buffer.take_front(self.config.batch_size))
            } else {
                None
            }
        };
        if let Some(batch) = batch {
            let _guard = self.flush_lock.lock().unwrap();
            self.deliver(batch);
        }
        true
    }

    /// Hand everything buffered to the receiver, returns the number of items
    pub fn flush(&self) -> usize {
        let _guard = self.flush_lock.lock().unwrap();
        let items = {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.items.is_empty() {
                return 0;
            }
            buffer.take()
        };
        self.deliver(items)
    }

    fn deliver(&self, items: Vec<Metric>) -> usize {
        let count = items.len();
        let start = Instant::now();
        match self.receiver.on_flush(items, count) {
            Ok(_) => {
                self.stats.flush_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.flush_failures.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .dropped
                    .fetch_add(count as u64, Ordering::Relaxed);
                warn!("{}: failed to flush {count} metrics: {e}", self.name);
            }
        }
        let elapsed = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.stats
            .last_flush_micros
            .store(elapsed, Ordering::Relaxed);
        count
    }

    /// Cancel the timer and drain what is left
    pub fn stop(&self) -> usize {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return 0;
        }
        if let Some(handle) = self.timer.lock().unwrap().take() {
            handle.abort();
        }
        let n = self.flush();
        debug!("{}: stopped, drained {n} metrics", self.name);
        n
    }
}

impl Drop for Accumulator {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use g3_apm_proto::{MetricName, MetricType, MetricValue};

    use crate::accumulate::{FlushError, FlushReceiver};

    #[derive(Default)]
    struct Collector {
        batches: Mutex<Vec<Vec<Metric>>>,
        fail: AtomicBool,
    }

    impl FlushReceiver for Collector {
        fn on_flush(&self, metrics: Vec<Metric>, count: usize) -> Result<(), FlushError> {
            assert_eq!(metrics.len(), count);
            if self.fail.load(Ordering::Relaxed) {
                return Err(FlushError::Failed("refused".to_string()));
            }
            self.batches.lock().unwrap().push(metrics);
            Ok(())
        }
    }

    fn gauge(fqn: &str, v: i64) -> Metric {
        let name = Arc::new(MetricName::from_str(fqn).unwrap());
        Metric::new(name, MetricType::LongGauge, MetricValue::Long(v), 1000).unwrap()
    }

    fn batch_sizes(c: &Collector) -> Vec<usize> {
        c.batches.lock().unwrap().iter().map(|b| b.len()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn size_trigger() {
        let collector = Arc::new(Collector::default());
        let config = AccumulatorConfig::new(3, Duration::from_secs(60));
        let acc = Accumulator::spawn("test", config, collector.clone());
        for i in 0..3 {
            assert!(acc.append(gauge("h/a/cpu", i)));
        }
        assert_eq!(batch_sizes(&collector), [3]);
        assert!(acc.is_empty());
        assert_eq!(acc.stats().flush_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn time_trigger() {
        let collector = Arc::new(Collector::default());
        let config = AccumulatorConfig::new(100, Duration::from_millis(500));
        let acc = Accumulator::spawn("test", config, collector.clone());
        acc.append(gauge("h/a/cpu", 1));
        acc.append(gauge("h/a/mem", 2));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(batch_sizes(&collector).is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(batch_sizes(&collector), [2]);

        // empty ticks never reach the receiver
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(acc.stats().flush_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn conflate() {
        let collector = Arc::new(Collector::default());
        let mut config = AccumulatorConfig::new(2, Duration::from_secs(1));
        config.conflate = true;
        let acc = Accumulator::spawn("test", config, collector.clone());
        acc.append(gauge("h/a/cpu", 1));
        acc.append(gauge("h/a/cpu", 2));
        assert_eq!(acc.len(), 1);
        acc.append(gauge("h/a/mem", 3));

        let batches = collector.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0].value().as_long(), Some(2));
        assert_eq!(acc.stats().conflated(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_and_stop() {
        let collector = Arc::new(Collector::default());
        collector.fail.store(true, Ordering::Relaxed);
        let config = AccumulatorConfig::new(10, Duration::from_secs(1));
        let acc = Accumulator::spawn("test", config, collector.clone());
        acc.append(gauge("h/a/cpu", 1));
        assert_eq!(acc.flush(), 1);
        assert_eq!(acc.stats().flush_failures(), 1);
        assert_eq!(acc.stats().dropped(), 1);

        collector.fail.store(false, Ordering::Relaxed);
        acc.append(gauge("h/a/cpu", 2));
        assert_eq!(acc.stop(), 1);
        assert_eq!(acc.stop(), 0);
        assert!(!acc.append(gauge("h/a/cpu", 3)));
        assert_eq!(batch_sizes(&collector), [1]);
        assert_eq!(acc.stats().dropped(), 2);
    }

    #[test]
    fn size_trigger_concurrent() {
        let collector = Arc::new(Collector::default());
        let config = AccumulatorConfig::new(7, Duration::from_secs(60));
        let acc = Arc::new(Accumulator::new("test", config, collector.clone()));

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let acc = Arc::clone(&acc);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        assert!(acc.append(gauge("h/a/cpu", t * 1000 + i)));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(acc.flush(), 8000 % 7);

        let sizes = batch_sizes(&collector);
        assert_eq!(sizes.len(), 8000 / 7 + 1);
        assert!(sizes[..sizes.len() - 1].iter().all(|n| *n == 7));
        assert_eq!(sizes.iter().sum::<usize>(), 8000);
    }
}
