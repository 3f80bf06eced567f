/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

mod queue;
pub use queue::{DelayEntry, DelayQueue};

mod timeout;
pub use timeout::{TimeoutListener, TimeoutMap};

pub mod watch;
