use crate::api::rest::{AppState, RestApi};
use crate::db::repositories::detection_events::DetectionEventsRepository;
use crate::db::repositories::device_tokens::DeviceTokensRepository;
use crate::db::repositories::upstream_credentials::UpstreamCredentialsRepository;
use crate::messaging::FeedSubscriber;
use crate::notify::{FcmClient, NotificationService, PushDispatcher};
use crate::security::upstream::UpstreamApi;
use crate::security::{AuthService, NvrApiClient, SessionCache};
use crate::services::MonitoringService;
use anyhow::Result;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

mod api;
mod config;
mod db;
mod error;
mod messaging;
mod notify;
mod security;
mod services;

pub use error::Error;

async fn run_app() -> Result<()> {
    env_logger::init();
    info!("Starting NVR notification backend");

    let config = config::load_config(None)?;
    info!("Configuration loaded");

    let database = Arc::new(db::DatabaseService::new(&config.database).await?);
    let pool = database.pool.clone();

    // Session cache with its expiry sweeper, running for the process lifetime
    let sessions = Arc::new(SessionCache::new());
    let _sweeper =
        sessions.spawn_sweeper(Duration::from_secs(config.security.sweep_interval_secs));

    let upstream: Arc<dyn UpstreamApi> = Arc::new(NvrApiClient::new(&config.upstream));

    let auth = Arc::new(AuthService::new(
        UpstreamCredentialsRepository::new(pool.clone()),
        sessions.clone(),
        upstream.clone(),
        config.upstream.verify_ttl_secs,
        config.security.clone(),
    ));

    let devices = DeviceTokensRepository::new(pool.clone());
    let dispatcher = PushDispatcher::new(Arc::new(FcmClient::new(&config.notifications)));
    let notifications = Arc::new(NotificationService::new(
        config.notifications.clone(),
        dispatcher,
        devices.clone(),
    ));

    let events = DetectionEventsRepository::new(pool.clone());
    let feed = Arc::new(FeedSubscriber::new(
        config.feed.clone(),
        events.clone(),
        notifications,
    )?);

    feed.connect().await?;
    feed.subscribe().await?;
    info!("Detection feed subscriber started");

    let monitoring = Arc::new(MonitoringService::new(upstream));

    let rest = RestApi::new(
        &config.api,
        AppState {
            auth,
            database,
            events,
            devices,
            monitoring,
            feed: feed.clone(),
        },
    );

    let api_handle = tokio::spawn(async move {
        if let Err(e) = rest.run().await {
            error!("API server stopped: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    // Best-effort teardown; in-flight sends are not awaited
    feed.disconnect().await;
    api_handle.abort();

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
