/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::WireError;

mod name;
pub use name::{FQN_DELIMITER, LocalNameDisplay, MetricName};

mod value;
pub use value::MetricValue;

/// Token value of a metric not yet known to the catalog
pub const TOKEN_UNKNOWN: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MetricType {
    LongCounter = 0,
    LongGauge = 1,
    DeltaCounter = 2,
    DeltaGauge = 3,
    Error = 4,
    String = 5,
    Blob = 6,
    Pdu = 7,
}

impl MetricType {
    #[inline]
    pub const fn is_long(&self) -> bool {
        (*self as u8) <= (MetricType::DeltaGauge as u8)
    }

    #[inline]
    pub const fn is_delta(&self) -> bool {
        matches!(self, MetricType::DeltaCounter | MetricType::DeltaGauge)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::LongCounter => "long_counter",
            MetricType::LongGauge => "long_gauge",
            MetricType::DeltaCounter => "delta_counter",
            MetricType::DeltaGauge => "delta_gauge",
            MetricType::Error => "error",
            MetricType::String => "string",
            MetricType::Blob => "blob",
            MetricType::Pdu => "pdu",
        }
    }
}

impl TryFrom<u8> for MetricType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(MetricType::LongCounter),
            1 => Ok(MetricType::LongGauge),
            2 => Ok(MetricType::DeltaCounter),
            3 => Ok(MetricType::DeltaGauge),
            4 => Ok(MetricType::Error),
            5 => Ok(MetricType::String),
            6 => Ok(MetricType::Blob),
            7 => Ok(MetricType::Pdu),
            n => Err(WireError::UnknownMetricType(n)),
        }
    }
}

impl FromStr for MetricType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long_counter" | "counter" | "long" => Ok(MetricType::LongCounter),
            "long_gauge" | "gauge" => Ok(MetricType::LongGauge),
            "delta_counter" | "delta" => Ok(MetricType::DeltaCounter),
            "delta_gauge" => Ok(MetricType::DeltaGauge),
            "error" => Ok(MetricType::Error),
            "string" | "str" => Ok(MetricType::String),
            "blob" => Ok(MetricType::Blob),
            "pdu" => Ok(MetricType::Pdu),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxContext {
    pub tx_id: i64,
    pub qualifier: i32,
    pub thread_id: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metric {
    name: Arc<MetricName>,
    metric_type: MetricType,
    value: MetricValue,
    timestamp: i64,
    token: i64,
    tx: Option<TxContext>,
}

impl Metric {
    pub fn new(
        name: Arc<MetricName>,
        metric_type: MetricType,
        value: MetricValue,
        timestamp: i64,
    ) -> Result<Self, WireError> {
        if !value.fit_type(metric_type) {
            return Err(WireError::ValueTypeMismatch(metric_type));
        }
        Ok(Metric {
            name,
            metric_type,
            value,
            timestamp,
            token: TOKEN_UNKNOWN,
            tx: None,
        })
    }

    pub fn with_token(mut self, token: i64) -> Self {
        self.token = token;
        self
    }

    pub fn with_tx(mut self, tx: TxContext) -> Self {
        self.tx = Some(tx);
        self
    }

    #[inline]
    pub fn name(&self) -> &Arc<MetricName> {
        &self.name
    }

    #[inline]
    pub fn fqn(&self) -> &str {
        self.name.fqn()
    }

    #[inline]
    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    #[inline]
    pub fn value(&self) -> &MetricValue {
        &self.value
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    pub fn token(&self) -> i64 {
        self.token
    }

    #[inline]
    pub fn tx(&self) -> Option<&TxContext> {
        self.tx.as_ref()
    }

    /// Key used to pair a direct send with its confirmation
    pub fn confirm_key(&self) -> String {
        format!("{}{}", self.name.fqn(), self.timestamp)
    }

    /// A new metric with host and agent replaced, it is not catalogued yet
    pub fn retag(&self, host: &str, agent: &str) -> Result<Metric, WireError> {
        let name = self.name.retag(host, agent)?;
        Ok(Metric {
            name: Arc::new(name),
            metric_type: self.metric_type,
            value: self.value.clone(),
            timestamp: self.timestamp,
            token: TOKEN_UNKNOWN,
            tx: self.tx,
        })
    }

    /// Wire view, use the token if one has been assigned
    pub fn to_record(&self) -> MetricRecord {
        let ident = if self.token == TOKEN_UNKNOWN {
            RecordIdent::Name(Arc::clone(&self.name))
        } else {
            RecordIdent::Token(self.token)
        };
        self.record_with(ident)
    }

    /// Wire view that always carries the full name
    pub fn to_named_record(&self) -> MetricRecord {
        self.record_with(RecordIdent::Name(Arc::clone(&self.name)))
    }

    fn record_with(&self, ident: RecordIdent) -> MetricRecord {
        MetricRecord {
            ident,
            metric_type: self.metric_type,
            timestamp: self.timestamp,
            value: self.value.clone(),
            tx: self.tx,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordIdent {
    Token(i64),
    Name(Arc<MetricName>),
}

/// A metric as it is carried in a frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricRecord {
    pub ident: RecordIdent,
    pub metric_type: MetricType,
    pub timestamp: i64,
    pub value: MetricValue,
    pub tx: Option<TxContext>,
}

impl MetricRecord {
    /// Build the full metric once the identity is known
    pub fn into_metric(self, name: Arc<MetricName>, token: i64) -> Result<Metric, WireError> {
        let mut metric = Metric::new(name, self.metric_type, self.value, self.timestamp)?;
        metric.token = token;
        metric.tx = self.tx;
        Ok(metric)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> Arc<MetricName> {
        Arc::new(MetricName::from_str("host1/agentA/cpu/util").unwrap())
    }

    #[test]
    fn type_ordinals() {
        assert!(MetricType::LongCounter.is_long());
        assert!(MetricType::DeltaGauge.is_long());
        assert!(!MetricType::Error.is_long());
        assert!(!MetricType::Pdu.is_long());
        assert!(MetricType::try_from(8).is_err());
        assert_eq!(MetricType::from_str("Gauge"), Ok(MetricType::LongGauge));
    }

    #[test]
    fn value_mismatch() {
        let r = Metric::new(name(), MetricType::LongGauge, MetricValue::Text("x".into()), 1);
        assert_eq!(r, Err(WireError::ValueTypeMismatch(MetricType::LongGauge)));
    }

    #[test]
    fn record_ident() {
        let m = Metric::new(name(), MetricType::LongGauge, MetricValue::Long(5), 100).unwrap();
        assert_eq!(m.to_record().ident, RecordIdent::Name(name()));
        assert_eq!(m.confirm_key(), "host1/agentA/cpu/util100");

        let m = m.with_token(42);
        assert_eq!(m.to_record().ident, RecordIdent::Token(42));
        assert_eq!(m.to_named_record().ident, RecordIdent::Name(name()));

        let r = m.retag("h2", "a2").unwrap();
        assert_eq!(r.token(), TOKEN_UNKNOWN);
        assert_eq!(r.fqn(), "h2/a2/cpu/util");
        assert_eq!(m.fqn(), "host1/agentA/cpu/util");
    }
}
