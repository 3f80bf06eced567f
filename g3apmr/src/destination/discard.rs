/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use g3_apm_proto::Metric;

use super::{Destination, DestinationBase};
use crate::route::PatternError;

pub struct DiscardDestination {
    base: DestinationBase,
}

impl DiscardDestination {
    pub fn new<S: AsRef<str>>(name: &str, patterns: &[S]) -> Result<Self, PatternError> {
        Ok(DiscardDestination {
            base: DestinationBase::new(name, patterns)?,
        })
    }
}

impl Destination for DiscardDestination {
    fn base(&self) -> &DestinationBase {
        &self.base
    }

    fn destination_type(&self) -> &'static str {
        "Discard"
    }

    fn on_accepted(&self, _metric: &Metric) {}
}
