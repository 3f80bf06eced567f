/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt::{self, Write};
use std::sync::Arc;

use flume::{Sender, TrySendError};
use slog::{Drain, KV, Level, OwnedKVList, Record, Serializer};

use super::LogStats;

/// One formatted record on its way to the io thread
#[derive(Debug)]
pub struct LogValue {
    pub(super) level: Level,
    pub(super) message: String,
    pub(super) kv_pairs: Vec<(String, String)>,
    pub(super) location: Option<String>,
}

impl LogValue {
    pub(super) fn message_str(&self) -> &str {
        if self.message.is_empty() {
            "()"
        } else {
            &self.message
        }
    }
}

struct KvCollector<'a>(&'a mut Vec<(String, String)>);

impl Serializer for KvCollector<'_> {
    fn emit_arguments(&mut self, key: slog::Key, value: &fmt::Arguments) -> slog::Result {
        let v = match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        };
        self.0.push((key.to_string(), v));
        Ok(())
    }
}

/// Formats records on the logging thread and hands them over without blocking
pub struct AsyncLogger {
    sender: Sender<LogValue>,
    append_code_position: bool,
    stats: Arc<LogStats>,
}

impl AsyncLogger {
    pub(super) fn new(
        sender: Sender<LogValue>,
        append_code_position: bool,
        stats: Arc<LogStats>,
    ) -> Self {
        AsyncLogger {
            sender,
            append_code_position,
            stats,
        }
    }

    fn format(
        &self,
        record: &Record,
        logger_values: &OwnedKVList,
    ) -> Result<LogValue, slog::Error> {
        let mut kv_pairs = Vec::new();
        let mut collector = KvCollector(&mut kv_pairs);
        logger_values.serialize(record, &mut collector)?;
        record.kv().serialize(record, &mut collector)?;

        let mut message = String::new();
        let _ = write!(message, "{}", record.msg());
        let location = if self.append_code_position {
            let location = match record.file().rsplit_once('/') {
                Some((_, filename)) => format!("{}({filename}:{})", record.module(), record.line()),
                None => record.module().to_string(),
            };
            Some(location)
        } else {
            None
        };

        Ok(LogValue {
            level: record.level(),
            message,
            kv_pairs,
            location,
        })
    }
}

impl Drain for AsyncLogger {
    type Ok = ();
    type Err = slog::Error;

    fn log(&self, record: &Record, logger_values: &OwnedKVList) -> Result<(), slog::Error> {
        self.stats.add_total();

        match self.format(record, logger_values) {
            Ok(v) => {
                match self.sender.try_send(v) {
                    Ok(_) => {}
                    Err(TrySendError::Full(_)) => self.stats.add_channel_overflow(),
                    Err(TrySendError::Disconnected(_)) => self.stats.add_channel_closed(),
                }
                Ok(())
            }
            Err(e) => {
                self.stats.add_format_failed();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{Logger, o};

    #[test]
    fn overflow() {
        let (sender, receiver) = flume::bounded(1);
        let stats = Arc::new(LogStats::default());
        let drain = AsyncLogger::new(sender, true, Arc::clone(&stats));
        let logger = Logger::root(drain.fuse(), o!("daemon" => "g3apmr"));

        slog::info!(logger, "first"; "conn" => 7);
        slog::info!(logger, "second");

        let v = receiver.try_recv().unwrap();
        assert_eq!(v.level, Level::Info);
        assert_eq!(v.message_str(), "first");
        assert!(v.kv_pairs.contains(&("conn".to_string(), "7".to_string())));
        assert!(v.kv_pairs.contains(&("daemon".to_string(), "g3apmr".to_string())));
        assert!(v.location.unwrap().contains("drain.rs"));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.channel_overflow, 1);

        drop(receiver);
        slog::info!(logger, "third");
        assert_eq!(stats.snapshot().channel_closed, 1);
    }
}
