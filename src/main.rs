use std::sync::Arc;

use anyhow::Context;
use futures_util::future::select_all;
use tracing_subscriber::EnvFilter;
use whitelist_bridge::{
    clock::SystemClock,
    config::Config,
    db::MySqlStore,
    discord::HttpPlatform,
    health::{self, HealthState},
    reconcile::{Cycle, Reconciler, Status},
    res::Templates,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().context("loading configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let platform = Arc::new(HttpPlatform::new(&config.bot_token, &config.api_base).context("building discord client")?);
    let store = Arc::new(MySqlStore::new(&config.mysql));
    let templates = Templates::builtin().context("parsing notification templates")?;

    let reconciler = Arc::new(Reconciler::new(
        platform,
        store.clone(),
        config.roles,
        config.guild_id,
        config.channel_id,
        templates,
        Arc::new(SystemClock),
    ));
    let status = Status::default();

    if let Some(addr) = config.health_addr {
        let app = health::router(HealthState {
            store,
            status: status.clone(),
        });
        let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {addr}"))?;
        tracing::info!(%addr, "health endpoint listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "health endpoint stopped");
            }
        });
    }

    let loops = [
        (Cycle::Intake, config.poll_interval),
        (Cycle::Decisions, config.poll_interval),
        (Cycle::Cooldowns, config.cooldown_poll_interval),
    ]
    .map(|(cycle, period)| tokio::spawn(reconciler.clone().run_every(cycle, period, status.clone())));

    tokio::select! {
        (result, index, _) = select_all(loops) => {
            // the loops never return on their own
            anyhow::bail!("reconciler {index} stopped: {result:?}");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            tracing::info!("shutting down");
        }
    }

    Ok(())
}
