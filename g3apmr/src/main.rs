/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use anyhow::Context;
use log::{debug, error, info};

use g3apmr::AppContext;
use g3apmr::opts::ProcArgs;

fn main() -> anyhow::Result<()> {
    let Some(proc_args) =
        g3apmr::opts::parse_clap().context("failed to parse command line options")?
    else {
        return Ok(());
    };

    // set up process logger early, only proc args is used inside
    let (_log_guard, log_stats) =
        g3apmr::log::setup(proc_args.verbose_level).context("failed to setup logger")?;

    g3apmr::config::load(&proc_args.config_file)
        .context(format!("failed to load config, opts: {proc_args:?}"))?;
    debug!("loaded config from {}", proc_args.config_file.display());

    if proc_args.test_config {
        info!("the format of the config file is ok");
        return Ok(());
    }

    let r = tokio_run(&proc_args);
    if let Err(e) = &r {
        error!("{e:?}");
    }
    let s = log_stats.snapshot();
    info!(
        "log messages: total {} passed {} overflow {} closed {}",
        s.total, s.passed, s.channel_overflow, s.channel_closed
    );
    r
}

fn tokio_run(args: &ProcArgs) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name(g3apmr::opts::PKG_NAME)
        .build()
        .context("failed to start runtime")?;
    rt.block_on(async {
        let ctx = AppContext::new(g3apmr::config::router::get());

        let mut quit_receiver = g3apmr::signal::register(&ctx, args.config_file.clone())
            .context("failed to setup signal handler")?;

        load_and_spawn(&ctx).await?;
        info!("router started");

        let _ = quit_receiver.recv().await;
        info!("router will go offline");

        g3apmr::input::stop_all().await;
        g3apmr::destination::stop_all(&ctx);
        ctx.subscriptions().stop_all();
        info!("router stopped");
        Ok(())
    })
}

async fn load_and_spawn(ctx: &std::sync::Arc<AppContext>) -> anyhow::Result<()> {
    g3apmr::destination::spawn_all(ctx)
        .await
        .context("failed to spawn all destinations")?;
    g3apmr::input::spawn_all(ctx)
        .await
        .context("failed to spawn all inputs")?;
    Ok(())
}
