/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::{self, Write};

use log::debug;

use g3_apm_proto::Metric;

use super::{Destination, DestinationBase};
use crate::route::PatternError;

pub(super) fn format_line(prefix: Option<&str>, metric: &Metric) -> String {
    let prefix = prefix.unwrap_or_default();
    format!(
        "{prefix}{} {} {} {}",
        metric.fqn(),
        metric.metric_type().as_str(),
        metric.value(),
        metric.timestamp()
    )
}

/// Write one line per metric, the writer is flushed at the end
pub(super) fn write_lines<'a, W, I>(w: &mut W, prefix: Option<&str>, metrics: I) -> io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a Metric>,
{
    for m in metrics {
        writeln!(w, "{}", format_line(prefix, m))?;
    }
    w.flush()
}

pub struct ConsoleDestination {
    base: DestinationBase,
    prefix: Option<String>,
}

impl ConsoleDestination {
    pub fn new<S: AsRef<str>>(
        name: &str,
        patterns: &[S],
        prefix: Option<String>,
    ) -> Result<Self, PatternError> {
        Ok(ConsoleDestination {
            base: DestinationBase::new(name, patterns)?,
            prefix,
        })
    }
}

impl Destination for ConsoleDestination {
    fn base(&self) -> &DestinationBase {
        &self.base
    }

    fn destination_type(&self) -> &'static str {
        "Console"
    }

    fn on_accepted(&self, metric: &Metric) {
        let mut stdout = io::stdout().lock();
        if let Err(e) = write_lines(&mut stdout, self.prefix.as_deref(), [metric]) {
            debug!("{}: failed to write to stdout: {e}", self.base.name());
        }
    }
}
