/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use log::{error, info, warn};
use tokio::sync::{Mutex, mpsc};

use crate::AppContext;

static RELOAD_MUTEX: Mutex<()> = Mutex::const_new(());

/// Reread the config file and apply the input and destination changes
pub async fn do_reload(ctx: &Arc<AppContext>, config_file: PathBuf) {
    let _guard = RELOAD_MUTEX.lock().await;
    info!("reloading config");

    if let Err(e) = crate::config::reload(config_file).await {
        warn!("error reloading config: {e:?}");
        warn!("reload aborted");
        return;
    }

    if let Err(e) = crate::destination::reload(ctx).await {
        error!("failed to reload all destinations: {e}");
    }
    if let Err(e) = crate::input::spawn_all(ctx).await {
        error!("failed to reload all inputs: {e}");
    }

    info!("reload finished");
}

/// Install the signal listeners, the returned receiver fires once on quit
pub fn register(
    ctx: &Arc<AppContext>,
    config_file: PathBuf,
) -> anyhow::Result<mpsc::Receiver<()>> {
    let (quit_sender, quit_receiver) = mpsc::channel(1);

    let int_sender = quit_sender.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("got interrupt signal");
            let _ = int_sender.try_send(());
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term_sig = signal(SignalKind::terminate())
            .map_err(|e| anyhow!("failed to create SIGTERM listener: {e}"))?;
        tokio::spawn(async move {
            if term_sig.recv().await.is_some() {
                info!("got terminate signal");
                let _ = quit_sender.try_send(());
            }
        });

        let mut hup_sig = signal(SignalKind::hangup())
            .map_err(|e| anyhow!("failed to create SIGHUP listener: {e}"))?;
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            while hup_sig.recv().await.is_some() {
                info!("got reload signal");
                do_reload(&ctx, config_file.clone()).await;
            }
        });
    }
    #[cfg(not(unix))]
    {
        let _ = (ctx, config_file, quit_sender);
    }

    Ok(quit_receiver)
}
