use actix_web::{
    middleware::{NormalizePath, TrailingSlash},
    web::Data,
    App, HttpServer,
};
use config::Config;
use scheduler::Scheduler;
use service::Service;
use tracing::level_filters::LevelFilter;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter, FmtSubscriber};
use worker::DrainWorker;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod message;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod utils;
pub mod worker;

/// Returns a builder for the main application.
///
/// Without an explicit config, settings are read from the environment.
#[bon::builder(finish_fn = start)]
pub async fn run(config: Option<Config>) -> eyre::Result<()> {
    #[cfg(debug_assertions)]
    FmtSubscriber::builder()
        .pretty()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("MSGPROC_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    #[cfg(not(debug_assertions))]
    FmtSubscriber::builder()
        .json()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("MSGPROC_LOG")
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .finish()
        .try_init()?;

    let config = match config {
        Some(config) => config,
        None => Config::load()?,
    };

    let service = Service::connect_with(&config).await?;

    let scheduler = Scheduler::new();
    DrainWorker::register(
        &scheduler,
        &service,
        config.drain_interval(),
        config.drain_timeout(),
    );

    let data = Data::new(service.clone());
    let json_cfg = api::json_config();

    tracing::info!(addr = config.listen_addr(), "starting server");

    let served = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(NormalizePath::new(TrailingSlash::Trim))
            .configure(api::routes)
            .app_data(data.clone())
            .app_data(json_cfg.clone())
    })
    .shutdown_timeout(config.shutdown_timeout_secs())
    .bind(config.listen_addr())?
    .run()
    .await;

    tracing::info!("shutting down server");

    scheduler.stop();
    if !scheduler.wait(config.shutdown_timeout()).await {
        tracing::warn!("scheduled tasks still running after shutdown timeout");
    }

    service.close().await;

    served?;

    Ok(())
}
