/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::sync::Arc;

use bytes::Bytes;

use g3_apm_proto::{ByteOrder, Metric, MetricRecord, OpCode, codec};

use crate::accumulate::{Accumulator, AccumulatorConfig, FlushError, FlushReceiver};
use crate::destination::{Destination, DestinationBase, DestinationState};
use crate::route::PatternError;
use crate::session::ArcSession;

struct SessionReceiver {
    session: ArcSession,
}

impl FlushReceiver for SessionReceiver {
    fn on_flush(&self, metrics: Vec<Metric>, _count: usize) -> Result<(), FlushError> {
        // subscribers hold no tokens of ours
        let records: Vec<MetricRecord> = metrics.iter().map(|m| m.to_named_record()).collect();
        let frame = codec::encode(OpCode::SendMetric, ByteOrder::Big, &records);
        if self.session.send(Bytes::from(frame)) {
            Ok(())
        } else {
            Err(FlushError::Unavailable)
        }
    }
}

/// Ephemeral destination writing matched metrics back to a subscribed connection
pub struct SubscriptionDestination {
    base: DestinationBase,
    sub_id: i64,
    session: ArcSession,
    accumulator: Arc<Accumulator>,
}

impl SubscriptionDestination {
    pub(crate) fn name_of(sub_id: i64) -> String {
        format!("sub-{sub_id}")
    }

    pub(crate) fn spawn<S: AsRef<str>>(
        sub_id: i64,
        session: ArcSession,
        patterns: &[S],
        config: AccumulatorConfig,
    ) -> Result<Self, PatternError> {
        let name = SubscriptionDestination::name_of(sub_id);
        let base = DestinationBase::new(&name, patterns)?;
        let receiver = Arc::new(SessionReceiver {
            session: Arc::clone(&session),
        });
        let accumulator = Accumulator::spawn(&name, config, receiver);
        Ok(SubscriptionDestination {
            base,
            sub_id,
            session,
            accumulator,
        })
    }

    #[inline]
    pub fn sub_id(&self) -> i64 {
        self.sub_id
    }
}

impl Destination for SubscriptionDestination {
    fn base(&self) -> &DestinationBase {
        &self.base
    }

    fn destination_type(&self) -> &'static str {
        "Subscription"
    }

    fn on_accepted(&self, metric: &Metric) {
        if !self.session.is_closed() {
            self.accumulator.append(metric.clone());
        }
    }

    fn flush(&self) -> usize {
        self.accumulator.flush()
    }

    fn stop(&self) {
        self.base.set_state(DestinationState::Stopping);
        self.accumulator.stop();
        self.base.set_state(DestinationState::Stopped);
    }
}
