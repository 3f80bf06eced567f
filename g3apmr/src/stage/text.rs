/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use thiserror::Error;

use g3_apm_proto::{Metric, MetricCatalog, MetricName, MetricType, MetricValue, WireError};

use super::{Stage, StageAction};
use crate::AppContext;
use crate::session::ArcSession;

const MAX_LINE_SIZE: usize = 64 << 10;

#[derive(Debug, Error)]
pub(crate) enum TextParseError {
    #[error("not utf-8")]
    NotUtf8,
    #[error("no name field")]
    NoName,
    #[error("invalid name: {0}")]
    InvalidName(WireError),
    #[error("no type field")]
    NoType,
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("no value field")]
    NoValue,
    #[error("invalid value for type {0}")]
    InvalidValue(MetricType),
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("unexpected trailing field")]
    TrailingField,
}

/// Parse `fqn type value [timestamp]`, the timestamp defaults to `now_ms`
pub(crate) fn parse_line(line: &str, now_ms: i64) -> Result<Metric, TextParseError> {
    let mut fields = line.split_ascii_whitespace();
    let fqn = fields.next().ok_or(TextParseError::NoName)?;
    let name = MetricName::from_str(fqn).map_err(TextParseError::InvalidName)?;
    let type_s = fields.next().ok_or(TextParseError::NoType)?;
    let metric_type = MetricType::from_str(type_s)
        .map_err(|_| TextParseError::UnknownType(type_s.to_string()))?;
    let value_s = fields.next().ok_or(TextParseError::NoValue)?;
    let value = MetricValue::parse_as(value_s, metric_type)
        .ok_or(TextParseError::InvalidValue(metric_type))?;
    let timestamp = match fields.next() {
        Some(s) => i64::from_str(s).map_err(|_| TextParseError::InvalidTimestamp)?,
        None => now_ms,
    };
    if fields.next().is_some() {
        return Err(TextParseError::TrailingField);
    }
    Metric::new(Arc::new(name), metric_type, value, timestamp)
        .map_err(|_| TextParseError::InvalidValue(metric_type))
}

/// Splits the stream into lines, empty lines are skipped
#[derive(Default)]
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    pub fn new() -> Self {
        LineFramer::default()
    }
}

impl Stage for LineFramer {
    fn name(&self) -> &'static str {
        "line-framer"
    }

    fn on_message(
        &mut self,
        session: &ArcSession,
        data: Bytes,
        out: &mut Vec<Bytes>,
    ) -> StageAction {
        self.buf.extend_from_slice(&data);
        while let Some(p) = memchr::memchr(b'\n', &self.buf) {
            let mut line = self.buf.split_to(p + 1);
            line.truncate(p);
            if line.last() == Some(&b'\r') {
                line.truncate(p - 1);
            }
            if !line.is_empty() {
                out.push(line.freeze());
            }
        }
        if self.buf.len() > MAX_LINE_SIZE {
            warn!("{}: line longer than {MAX_LINE_SIZE} bytes", session.peer());
            return StageAction::Close;
        }
        StageAction::Continue
    }
}

pub struct TextStage {
    ctx: Arc<AppContext>,
}

impl TextStage {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        TextStage { ctx }
    }
}

impl Stage for TextStage {
    fn name(&self) -> &'static str {
        "text"
    }

    fn on_message(
        &mut self,
        session: &ArcSession,
        data: Bytes,
        _out: &mut Vec<Bytes>,
    ) -> StageAction {
        let parsed = std::str::from_utf8(&data)
            .map_err(|_| TextParseError::NotUtf8)
            .and_then(|line| parse_line(line, chrono::Utc::now().timestamp_millis()));
        match parsed {
            Ok(metric) => {
                self.ctx.stats().add_text_line();
                let token = self.ctx.catalog().assign_token(metric.name());
                self.ctx.router().route(&metric.with_token(token));
            }
            Err(e) => {
                debug!("{}: invalid text line: {e}", session.peer());
                self.ctx.stats().add_malformed();
            }
        }
        StageAction::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use tokio::sync::mpsc;

    use crate::config::router::RouterConfig;
    use crate::destination::{Destination, DiscardDestination};
    use crate::session::Session;
    use crate::stage::StageList;

    #[test]
    fn parse() {
        let m = parse_line("h/a/cpu/util gauge 80 1000", 0).unwrap();
        assert_eq!(m.fqn(), "h/a/cpu/util");
        assert_eq!(m.metric_type(), MetricType::LongGauge);
        assert_eq!(m.value(), &MetricValue::Long(80));
        assert_eq!(m.timestamp(), 1000);

        let m = parse_line("h/a/status STRING ok", 7).unwrap();
        assert_eq!(m.value(), &MetricValue::Text("ok".to_string()));
        assert_eq!(m.timestamp(), 7);

        assert!(matches!(parse_line("", 0), Err(TextParseError::NoName)));
        assert!(matches!(
            parse_line("h/a gauge 1", 0),
            Err(TextParseError::InvalidName(_))
        ));
        assert!(matches!(
            parse_line("h/a/n histogram 1", 0),
            Err(TextParseError::UnknownType(_))
        ));
        assert!(matches!(
            parse_line("h/a/n gauge abc", 0),
            Err(TextParseError::InvalidValue(MetricType::LongGauge))
        ));
        assert!(matches!(
            parse_line("h/a/n gauge 1 2 3", 0),
            Err(TextParseError::TrailingField)
        ));
    }

    #[tokio::test]
    async fn route_lines() {
        let ctx = AppContext::new(Arc::new(RouterConfig::default()));
        let dest = Arc::new(DiscardDestination::new("all", &["**"]).unwrap());
        dest.start();
        ctx.router().register(dest.clone());

        let (sender, _receiver) = mpsc::channel(1);
        let session = Arc::new(Session::new_stream(
            1,
            SocketAddr::from(([127, 0, 0, 1], 1)),
            sender,
        ));
        let mut list = StageList::new()
            .with(LineFramer::new())
            .with(TextStage::new(ctx.clone()));
        list.feed(&session, Bytes::from_static(b"h/a/n gauge 1\r\nh/a/m cou"));
        assert_eq!(dest.base().accepted(), 1);
        list.feed(&session, Bytes::from_static(b"nter 2\n\nbad line\n"));
        assert_eq!(dest.base().accepted(), 2);
        assert_eq!(ctx.stats().text_lines(), 2);
        assert_eq!(ctx.stats().malformed(), 1);
        assert_eq!(ctx.catalog().len(), 2);
    }
}
