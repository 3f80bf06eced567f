/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use foldhash::fast::FixedState;
use log::{debug, info};

use g3_delay::watch::WatchState;

use super::{ArcDestination, BatchDestination, BatchSink, ConsoleDestination, DiscardDestination};
use crate::AppContext;
use crate::client::AgentClient;
use crate::config::destination::batch::BatchSinkConfig;
use crate::config::destination::{
    AnyDestinationConfig, DestinationConfig, DestinationConfigDiffAction,
};

static RUNTIME_DESTINATION_CONFIG_REGISTRY: Mutex<
    HashMap<String, AnyDestinationConfig, FixedState>,
> = Mutex::new(HashMap::with_hasher(FixedState::with_seed(0)));

fn runtime_configs() -> Vec<AnyDestinationConfig> {
    let ht = RUNTIME_DESTINATION_CONFIG_REGISTRY.lock().unwrap();
    ht.values().cloned().collect()
}

async fn build(
    ctx: &Arc<AppContext>,
    config: &AnyDestinationConfig,
) -> anyhow::Result<ArcDestination> {
    let dest: ArcDestination = match config {
        AnyDestinationConfig::Console(c) => {
            Arc::new(ConsoleDestination::new(c.name(), c.patterns(), c.prefix.clone())?)
        }
        AnyDestinationConfig::Discard(c) => {
            Arc::new(DiscardDestination::new(c.name(), c.patterns())?)
        }
        AnyDestinationConfig::Batch(c) => {
            let (sink, watches) = match &c.sink {
                BatchSinkConfig::Console => (BatchSink::Console, Vec::new()),
                BatchSinkConfig::Log => (BatchSink::Log, Vec::new()),
                BatchSinkConfig::Discard => (BatchSink::Discard, Vec::new()),
                BatchSinkConfig::Forward(addr) => {
                    let watch_config = crate::config::watch::get();
                    let client = AgentClient::connect(
                        c.name(),
                        *addr,
                        &watch_config,
                        ctx.config().confirm_timeout,
                    )
                    .await
                    .context(format!("failed to setup forward client to {addr}"))?;
                    let control = ctx.watchdog().register_callback(client.clone());
                    client.attach_control(Arc::clone(&control));
                    let poller = ctx.watchdog().register_polled(client.clone());
                    control.set_state(WatchState::Disconnected);
                    poller.set_state(WatchState::Polling);
                    (
                        BatchSink::Forward {
                            client,
                            control: Arc::clone(&control),
                        },
                        vec![control, poller],
                    )
                }
            };
            let dest = BatchDestination::spawn(c.name(), c.patterns(), c.accumulator.clone(), sink)?
                .with_watches(watches);
            Arc::new(dest)
        }
    };
    Ok(dest)
}

async fn spawn_new(ctx: &Arc<AppContext>, config: &AnyDestinationConfig) -> anyhow::Result<()> {
    let dest = build(ctx, config)
        .await
        .context(format!("failed to spawn destination {}", config.name()))?;
    dest.start();
    if let Some(old) = ctx.router().unregister(config.name()) {
        old.stop();
    }
    if !ctx.router().register(Arc::clone(&dest)) {
        dest.stop();
        return Err(anyhow!("destination {} registered concurrently", config.name()));
    }
    let mut ht = RUNTIME_DESTINATION_CONFIG_REGISTRY.lock().unwrap();
    ht.insert(config.name().to_string(), config.clone());
    Ok(())
}

fn delete_existed(ctx: &AppContext, name: &str) {
    if let Some(dest) = ctx.router().unregister(name) {
        dest.stop();
        info!("destination {name} deleted");
    }
    RUNTIME_DESTINATION_CONFIG_REGISTRY.lock().unwrap().remove(name);
}

pub async fn spawn_all(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    for config in crate::config::destination::get_all() {
        if ctx.router().get(config.name()).is_some() {
            return Err(anyhow!("destination {} already exists", config.name()));
        }
        spawn_new(ctx, &config).await?;
    }
    Ok(())
}

/// Apply the reloaded config, patterns are updated in place where possible
pub async fn reload(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    for old in runtime_configs() {
        if crate::config::destination::get(old.name()).is_none() {
            delete_existed(ctx, old.name());
        }
    }

    for new in crate::config::destination::get_all() {
        let old = RUNTIME_DESTINATION_CONFIG_REGISTRY
            .lock()
            .unwrap()
            .get(new.name())
            .cloned();
        let Some(old) = old else {
            spawn_new(ctx, &new).await?;
            continue;
        };
        match old.diff_action(&new) {
            DestinationConfigDiffAction::NoAction => {
                debug!("destination {} not changed", new.name());
            }
            DestinationConfigDiffAction::UpdatePatterns => {
                let Some(dest) = ctx.router().get(new.name()) else {
                    spawn_new(ctx, &new).await?;
                    continue;
                };
                dest.base()
                    .patterns()
                    .replace(new.patterns())
                    .context(format!("invalid patterns for destination {}", new.name()))?;
                RUNTIME_DESTINATION_CONFIG_REGISTRY
                    .lock()
                    .unwrap()
                    .insert(new.name().to_string(), new.as_ref().clone());
                info!("destination {} patterns updated", new.name());
            }
            DestinationConfigDiffAction::SpawnNew => spawn_new(ctx, &new).await?,
        }
    }
    Ok(())
}

/// Stop every config managed destination, flushing what they hold
pub fn stop_all(ctx: &AppContext) {
    for config in runtime_configs() {
        delete_existed(ctx, config.name());
    }
}
