//! # NestBoard Binary
//!
//! The entry point that assembles the service stack. The storage backend is
//! a construction-time choice driven by configuration: `NESTBOARD_DB` is
//! either `memory` (default) or `sqlite`, with `NESTBOARD_SQLITE_URL`
//! pointing at the database file for the latter. Transport adapters mount on
//! top of the [`ServiceManager`]; this binary only wires and supervises the
//! core.

use anyhow::Context;
use nb_core::config::CoreConfig;
use nb_core::traits::Repositories;
use nb_services::ServiceManager;

async fn build_repositories() -> anyhow::Result<Repositories> {
    let backend = std::env::var("NESTBOARD_DB").unwrap_or_else(|_| "memory".to_string());

    match backend.as_str() {
        "memory" => {
            log::info!("storage backend: in-memory");
            Ok(nb_db_memory::memory_repositories())
        }
        "sqlite" => {
            let url = std::env::var("NESTBOARD_SQLITE_URL")
                .unwrap_or_else(|_| "sqlite:nestboard.db".to_string());
            log::info!("storage backend: sqlite ({url})");
            nb_db_sqlite::sqlite_repositories(&url)
                .await
                .with_context(|| format!("failed to open sqlite database at {url}"))
        }
        other => anyhow::bail!("unknown NESTBOARD_DB backend '{other}' (memory|sqlite)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = CoreConfig::from_env().context("invalid NESTBOARD_* configuration")?;
    let repos = build_repositories().await?;

    let manager = ServiceManager::new(repos, config);
    manager
        .health()
        .await
        .context("startup health check failed")?;
    log::info!("nestboard core is up; press ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    log::info!("shutdown signal received");
    manager.close().await;

    let metrics = manager.metrics().await;
    log::info!(
        "final notifier metrics: sent={} dropped={} lifetime_subscriptions={}",
        metrics.messages_sent,
        metrics.messages_dropped,
        metrics.subscriptions_total
    );

    Ok(())
}
