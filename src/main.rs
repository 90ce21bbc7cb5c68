//! pp-recalc binary entrypoint wiring MySQL, Redis, the osu! API and the calculator.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pp_recalc::{
    config::AppConfig,
    dao::{
        rank_store::redis::{RedisConfig, RedisRankStore},
        score_store::mysql::{MySqlConfig, MySqlScoreStore},
    },
    services::{
        assets::FsAssetProvider,
        beatmap_api::{OsuApiClient, OsuApiConfig},
        calculator::RosuCalculator,
        connection_supervisor::{RetryPolicy, connect_with_retry},
        pipeline,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();

    let mysql_config = MySqlConfig::from_env().context("reading MySQL configuration")?;
    let redis_config = RedisConfig::from_env().context("reading Redis configuration")?;
    let api_config = OsuApiConfig::from_env(config.api_base_url.clone(), config.api_timeout)
        .context("reading osu! API configuration")?;

    let store = connect_with_retry("mysql", RetryPolicy::default(), || {
        MySqlScoreStore::connect(mysql_config.clone())
    })
    .await
    .context("connecting to MySQL")?;
    let ranks = connect_with_retry("redis", RetryPolicy::default(), || {
        RedisRankStore::connect(redis_config.clone())
    })
    .await
    .context("connecting to Redis")?;

    let source = OsuApiClient::new(api_config).context("building osu! API client")?;
    let assets = FsAssetProvider::new(&config.beatmap_mirror_url, config.api_timeout)
        .context("building beatmap mirror client")?;

    let state = AppState::new(
        config,
        Arc::new(store.clone()),
        Arc::new(ranks),
        Arc::new(source),
        Arc::new(assets),
        Arc::new(RosuCalculator::new()),
    );

    let outcome = tokio::select! {
        result = pipeline::run(&state) => Some(result),
        _ = shutdown_signal() => None,
    };

    store.close().await;

    match outcome {
        Some(result) => {
            let summary = result.context("running recalculation")?;
            info!(?summary, "recalculation complete");
        }
        None => warn!("interrupted; stopping recalculation"),
    }

    Ok(())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sqlx=warn".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
