use std::{path::Path, sync::Arc};

use anyhow::Context;
use sfw_core::{
    config::{self, Config},
    followers::fetcher::{FetchSettings, PagedFetcher},
    formatting::NotificationFormatter,
    messaging::dispatcher::{DispatchConfig, RateLimitedDispatcher},
    scheduler::{Scheduler, SchedulerSettings},
    snapshot::SnapshotStore,
};
use sfw_smule::SmuleClient;
use sfw_telegram::TelegramMessenger;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv_if_present(Path::new(".env"));
    sfw_core::logging::init("sfw", &config::log_level_from_env())?;

    let cfg = Config::from_env().context("invalid configuration")?;
    info!(
        accounts = cfg.account_ids.len(),
        interval_secs = cfg.check_interval.as_secs(),
        data_dir = %cfg.data_dir.display(),
        "configuration loaded"
    );

    let source = Arc::new(SmuleClient::new(cfg.api_url.clone())?);
    let messenger = Arc::new(TelegramMessenger::from_token(cfg.telegram_token.clone()));
    let dispatcher = Arc::new(RateLimitedDispatcher::new(
        messenger,
        cfg.chat_id.clone(),
        DispatchConfig {
            max_per_second: cfg.rate_limit_per_second,
            max_per_minute: cfg.rate_limit_per_minute,
            max_attempts: cfg.send_max_attempts,
            ..DispatchConfig::default()
        },
    ));

    let store = SnapshotStore::open(cfg.data_dir.clone(), &cfg.account_ids);
    let formatter = NotificationFormatter::new(
        cfg.account_aliases.clone(),
        cfg.profile_base_url.clone(),
    );

    if !dispatcher
        .send(&formatter.startup_banner(&cfg.account_ids, cfg.check_interval))
        .await
    {
        warn!("startup banner could not be delivered");
    }

    let scheduler = Scheduler::new(
        cfg.account_ids.clone(),
        PagedFetcher::new(source, FetchSettings::default()),
        store,
        dispatcher,
        formatter,
        SchedulerSettings::with_interval(cfg.check_interval),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            info!("shutdown requested, finishing current cycle");
            cancel.cancel();
        });
    }

    scheduler.run(cancel).await;
    Ok(())
}
