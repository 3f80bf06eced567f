/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use log::debug;
use tokio::sync::Mutex;

use super::{ArcInput, TcpInput, UdpInput, registry};
use crate::AppContext;
use crate::config::input::{AnyInputConfig, InputConfigDiffAction};

static INPUT_OPS_LOCK: Mutex<()> = Mutex::const_new(());

/// Bring running inputs in line with the loaded config
pub async fn spawn_all(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    let _guard = INPUT_OPS_LOCK.lock().await;

    let mut new_names = HashSet::<String>::new();

    let all_config = crate::config::input::get_all();
    for config in all_config {
        let name = config.name();
        new_names.insert(name.to_string());
        match registry::get_config(name) {
            Some(old) => {
                debug!("reloading input {name}");
                reload_old_unlocked(ctx, old, config.as_ref().clone()).await?;
                debug!("input {name} reload OK");
            }
            None => {
                debug!("creating input {name}");
                spawn_new_unlocked(ctx, config.as_ref().clone())?;
                debug!("input {name} create OK");
            }
        }
    }

    for name in &registry::get_names() {
        if !new_names.contains(name) {
            debug!("deleting input {name}");
            delete_existed_unlocked(name).await;
            debug!("input {name} deleted");
        }
    }

    Ok(())
}

pub async fn stop_all() {
    let _guard = INPUT_OPS_LOCK.lock().await;

    for name in &registry::get_names() {
        delete_existed_unlocked(name).await;
    }
}

async fn reload_old_unlocked(
    ctx: &Arc<AppContext>,
    old: AnyInputConfig,
    new: AnyInputConfig,
) -> anyhow::Result<()> {
    let name = old.name();
    match old.diff_action(&new) {
        InputConfigDiffAction::NoAction => {
            debug!("input {name} reload: no action is needed");
            Ok(())
        }
        InputConfigDiffAction::SpawnNew | InputConfigDiffAction::ReloadAndRespawn => {
            debug!("input {name} reload: will respawn");
            // the old socket has to be released before binding again
            delete_existed_unlocked(name).await;
            spawn_new_unlocked(ctx, new)
        }
    }
}

async fn delete_existed_unlocked(name: &str) {
    let Some(input) = registry::del(name) else {
        return;
    };
    input.abort();
    if let Some(runtime) = input.take_runtime() {
        let _ = runtime.await;
    }
}

fn spawn_new_unlocked(ctx: &Arc<AppContext>, config: AnyInputConfig) -> anyhow::Result<()> {
    let name = config.name().to_string();
    let input: ArcInput = match config {
        AnyInputConfig::Tcp(config) => TcpInput::spawn(ctx, config)?,
        AnyInputConfig::Udp(config) => UdpInput::spawn(ctx, config)?,
    };
    debug!(
        "{} input {name} listening at {}",
        input.input_type(),
        input.local_addr()
    );
    registry::add(input).context(format!("failed to register input {name}"))
}
