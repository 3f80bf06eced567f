/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

pub mod config;
pub mod log;
pub mod opts;
pub mod signal;

pub mod accumulate;
pub mod client;
pub mod confirm;
pub mod destination;
pub mod event;
pub mod handler;
pub mod input;
pub mod route;
pub mod session;
pub mod stage;
pub mod subscribe;

mod context;
pub use context::{AppContext, RouterStats};
