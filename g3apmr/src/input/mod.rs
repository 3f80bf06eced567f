/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::input::AnyInputConfig;

mod registry;

mod ops;
pub use ops::{spawn_all, stop_all};

mod tcp;
pub use tcp::TcpInput;

mod udp;
pub use udp::UdpInput;

/// A running listener
pub trait Input: Send + Sync {
    fn name(&self) -> &str;
    fn input_type(&self) -> &'static str;
    fn local_addr(&self) -> SocketAddr;
    fn config(&self) -> AnyInputConfig;

    /// Stop accepting, established tcp connections keep running
    fn abort(&self);

    /// The listen task, it holds the socket until it ends
    fn take_runtime(&self) -> Option<JoinHandle<()>>;
}

pub type ArcInput = Arc<dyn Input>;
