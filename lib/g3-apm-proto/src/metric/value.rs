/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;

use super::MetricType;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetricValue {
    Long(i64),
    Text(String),
    Bytes(Vec<u8>),
}

impl MetricValue {
    pub fn fit_type(&self, metric_type: MetricType) -> bool {
        match self {
            MetricValue::Long(_) => metric_type.is_long(),
            MetricValue::Text(_) => matches!(metric_type, MetricType::Error | MetricType::String),
            MetricValue::Bytes(_) => matches!(metric_type, MetricType::Blob | MetricType::Pdu),
        }
    }

    /// Parse a textual value for the given metric type
    pub fn parse_as(s: &str, metric_type: MetricType) -> Option<Self> {
        if metric_type.is_long() {
            if let Ok(v) = s.parse::<i64>() {
                return Some(MetricValue::Long(v));
            }
            // floating point input is truncated
            let f = s.parse::<f64>().ok()?;
            if f.is_finite() {
                Some(MetricValue::Long(f as i64))
            } else {
                None
            }
        } else if matches!(metric_type, MetricType::Error | MetricType::String) {
            Some(MetricValue::Text(s.to_string()))
        } else {
            Some(MetricValue::Bytes(s.as_bytes().to_vec()))
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            MetricValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Long(v) => write!(f, "{v}"),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}
