/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use memchr::memmem;

use g3_apm_proto::{Metric, MetricCatalog, MetricName, MetricType, MetricValue};

use super::{Stage, StageAction};
use crate::AppContext;
use crate::session::ArcSession;

const MAX_ELEMENT_SIZE: usize = 64 << 10;

fn unescape(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }
    Cow::Owned(
        s.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

/// Attributes of a start tag body like `metric fqn="a" type='b'`
fn parse_attributes(body: &str) -> Option<Vec<(&str, Cow<'_, str>)>> {
    let mut attrs = Vec::new();
    let mut left = body.trim_start();
    while !left.is_empty() {
        let eq = left.find('=')?;
        let key = left[..eq].trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return None;
        }
        let rest = left[eq + 1..].trim_start();
        let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let end = rest[1..].find(quote)?;
        attrs.push((key, unescape(&rest[1..end + 1])));
        left = rest[end + 2..].trim_start();
    }
    Some(attrs)
}

/// Build a metric from the content of a `<metric .../>` tag, without the brackets
pub(crate) fn parse_metric_element(tag: &str, now_ms: i64) -> Option<Metric> {
    let body = tag.strip_prefix("metric")?;
    let body = body.strip_suffix('/').unwrap_or(body);
    let attrs = parse_attributes(body)?;
    let get = |k: &str| attrs.iter().find(|(n, _)| *n == k).map(|(_, v)| v.as_ref());

    let name = MetricName::from_str(get("fqn")?).ok()?;
    let metric_type = MetricType::from_str(get("type")?).ok()?;
    let value = MetricValue::parse_as(get("value")?, metric_type)?;
    let timestamp = match get("time").or_else(|| get("timestamp")) {
        Some(s) => i64::from_str(s).ok()?,
        None => now_ms,
    };
    Metric::new(Arc::new(name), metric_type, value, timestamp).ok()
}

/// Extracts metric elements from an xml document stream
///
/// Only `metric` elements are looked at, everything else in the document is
/// skipped without validation.
pub struct XmlStage {
    ctx: Arc<AppContext>,
    buf: BytesMut,
}

impl XmlStage {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        XmlStage {
            ctx,
            buf: BytesMut::new(),
        }
    }

    fn handle_element(&self, session: &ArcSession, tag: &[u8]) {
        let Ok(tag) = std::str::from_utf8(tag) else {
            self.ctx.stats().add_malformed();
            return;
        };
        let is_metric = tag.starts_with("metric")
            && tag[6..]
                .chars()
                .next()
                .is_none_or(|c| c.is_whitespace() || c == '/');
        if !is_metric {
            return;
        }
        match parse_metric_element(tag, chrono::Utc::now().timestamp_millis()) {
            Some(metric) => {
                self.ctx.stats().add_xml_element();
                let token = self.ctx.catalog().assign_token(metric.name());
                self.ctx.router().route(&metric.with_token(token));
            }
            None => {
                debug!("{}: invalid metric element <{tag}>", session.peer());
                self.ctx.stats().add_malformed();
            }
        }
    }
}

impl Stage for XmlStage {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn on_message(
        &mut self,
        session: &ArcSession,
        data: Bytes,
        _out: &mut Vec<Bytes>,
    ) -> StageAction {
        self.buf.extend_from_slice(&data);
        loop {
            let Some(start) = memchr::memchr(b'<', &self.buf) else {
                self.buf.clear();
                break;
            };
            let left = &self.buf[start..];
            let end = if left.starts_with(b"<!--") {
                memmem::find(left, b"-->").map(|p| p + 3)
            } else {
                memchr::memchr(b'>', left).map(|p| p + 1)
            };
            let Some(end) = end else {
                let _ = self.buf.split_to(start);
                if self.buf.len() > MAX_ELEMENT_SIZE {
                    warn!("{}: xml element too large", session.peer());
                    return StageAction::Close;
                }
                break;
            };
            let element = self.buf.split_to(start + end).split_off(start);
            self.handle_element(session, &element[1..element.len() - 1]);
        }
        StageAction::Continue
    }
}
