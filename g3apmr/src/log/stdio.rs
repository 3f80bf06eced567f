/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anstyle::{AnsiColor, Color, Style};
use chrono::Local;
use flume::Receiver;
use slog::Level;

use super::{LogStats, LogValue};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub(super) struct AsyncIoThread {
    pub(super) receiver: Receiver<LogValue>,
    pub(super) stats: Arc<LogStats>,
}

impl AsyncIoThread {
    pub(super) fn run_with_stderr(self) {
        let stderr = io::stderr();
        if stderr.is_terminal() {
            self.run(stderr, write_console)
        } else {
            self.run(stderr, write_plain)
        }
    }

    fn run<IO, F>(&self, mut io: IO, format: F)
    where
        IO: Write,
        F: Fn(&mut Vec<u8>, LogValue) -> io::Result<()>,
    {
        let mut buf: Vec<u8> = Vec::with_capacity(1024);
        while let Ok(v) = self.receiver.recv() {
            buf.clear();
            let _ = format(&mut buf, v);
            self.write_buf(&mut io, &buf);

            while let Ok(v) = self.receiver.try_recv() {
                buf.clear();
                let _ = format(&mut buf, v);
                self.write_buf(&mut io, &buf);
            }

            let _ = io.flush();
        }
    }

    fn write_buf<IO: Write>(&self, io: &mut IO, buf: &[u8]) {
        match io.write_all(buf) {
            Ok(_) => self.stats.add_passed(buf.len()),
            Err(_) => self.stats.add_peer_unreachable(),
        }
    }
}

fn write_time<IO: Write>(io: &mut IO) -> io::Result<()> {
    write!(io, "{}", Local::now().format(TIME_FORMAT))
}

pub(super) fn write_plain<IO: Write>(io: &mut IO, v: LogValue) -> io::Result<()> {
    write_time(io)?;
    write!(io, " {}", v.level)?;
    for (k, v) in &v.kv_pairs {
        write!(io, " {k}: {v},")?;
    }
    write!(io, " {}", v.message_str())?;
    if let Some(location) = &v.location {
        write!(io, " <{location}>")?;
    }
    writeln!(io)
}

fn write_console<IO: Write>(io: &mut IO, v: LogValue) -> io::Result<()> {
    const COLOR_MAGENTA: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Magenta)));
    const COLOR_RED: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));
    const COLOR_YELLOW: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
    const COLOR_GREEN: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));
    const COLOR_CYAN: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan)));
    const COLOR_BLUE: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Blue)));
    const STYLE_BOLD: Style = Style::new().bold();
    const STYLE_ITALIC: Style = Style::new().italic();

    let bold_s = STYLE_BOLD.render();
    let bold_e = STYLE_BOLD.render_reset();

    write_time(io)?;
    let level_color = match v.level {
        Level::Critical => COLOR_MAGENTA,
        Level::Error => COLOR_RED,
        Level::Warning => COLOR_YELLOW,
        Level::Info => COLOR_GREEN,
        Level::Debug => COLOR_CYAN,
        Level::Trace => COLOR_BLUE,
    };
    write!(
        io,
        " {}{}{}",
        level_color.render(),
        v.level,
        level_color.render_reset(),
    )?;

    for (k, v) in &v.kv_pairs {
        write!(io, " {bold_s}{k}{bold_e}={v},")?;
    }

    write!(io, " {bold_s}{}{bold_e}", v.message_str())?;

    if let Some(location) = &v.location {
        write!(
            io,
            " <{}{location}{}>",
            STYLE_ITALIC.render(),
            STYLE_ITALIC.render_reset()
        )?;
    }
    writeln!(io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain() {
        let v = LogValue {
            level: Level::Warning,
            message: "dropped frame".to_string(),
            kv_pairs: vec![("peer".to_string(), "127.0.0.1:1".to_string())],
            location: Some("g3apmr::stage(wire.rs:42)".to_string()),
        };
        let mut buf = Vec::new();
        write_plain(&mut buf, v).unwrap();
        let line = String::from_utf8(buf).unwrap();
        assert!(line.ends_with(
            " WARN peer: 127.0.0.1:1, dropped frame <g3apmr::stage(wire.rs:42)>\n"
        ));
    }
}
