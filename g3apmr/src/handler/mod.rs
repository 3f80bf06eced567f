/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod agent;
pub use agent::AgentHandler;

#[derive(Debug, PartialEq, Eq)]
pub enum HandleResult {
    Continue,
    Close,
}
