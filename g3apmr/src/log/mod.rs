/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use slog::{Drain, slog_o};
use slog_scope::GlobalLoggerGuard;

mod drain;
mod stats;
mod stdio;

use drain::{AsyncLogger, LogValue};
pub use stats::{LogSnapshot, LogStats};
use stdio::AsyncIoThread;

const PROCESS_LOG_THREAD_NAME: &str = "log-process";
const PROCESS_LOG_CHANNEL_SIZE: usize = 1024;

/// Install the process logger, the returned guard must be kept alive
pub fn setup(
    verbose_level: u8,
) -> Result<(GlobalLoggerGuard, Arc<LogStats>), log::SetLoggerError> {
    let (sender, receiver) = flume::bounded::<LogValue>(PROCESS_LOG_CHANNEL_SIZE);
    let stats = Arc::new(LogStats::default());

    let io_thread = AsyncIoThread {
        receiver,
        stats: Arc::clone(&stats),
    };
    let _detached_thread = std::thread::Builder::new()
        .name(PROCESS_LOG_THREAD_NAME.to_string())
        .spawn(move || io_thread.run_with_stderr());

    let drain = AsyncLogger::new(sender, verbose_level > 1, Arc::clone(&stats));
    let logger = slog::Logger::root(drain.fuse(), slog_o!());
    let scope_guard = slog_scope::set_global_logger(logger);

    let log_level = match verbose_level {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        2 => log::Level::Debug,
        _ => log::Level::Trace,
    };

    slog_stdlog::init_with_level(log_level)?;
    Ok((scope_guard, stats))
}
