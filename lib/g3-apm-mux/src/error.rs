/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MuxError {
    #[error("no matching protocol after {0} bytes")]
    NoMatchingProtocol(usize),
    #[error("protocol {0} has already been registered")]
    DuplicateProtocol(String),
}
