use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crowdguard_sos::banner::{BannerState, DangerBanner};
use crowdguard_sos::clients::{SosAlertClient, SystemAlertClient};
use crowdguard_sos::config::AppConfig;
use crowdguard_sos::fallback::FallbackStore;
use crowdguard_sos::store::{DocumentStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting CrowdGuard SOS watcher...");

    // Init document store
    let store: Arc<dyn DocumentStore> = Arc::new(PgStore::connect(&config.database_url).await?);
    info!("Connected to document store");

    let fallback = Arc::new(FallbackStore::new(&config.fallback_dir));
    let sos = SosAlertClient::new(store.clone(), fallback);
    let broadcasts = SystemAlertClient::new(store);

    // Tail active broadcast alerts and drive the banner state; report the
    // analysis backlog on a fixed cadence.
    let mut feed = broadcasts.subscribe_active().await?;
    let mut banner = DangerBanner::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.backlog_interval_secs));

    loop {
        tokio::select! {
            snapshot = feed.next() => {
                let Some(snapshot) = snapshot else { break };
                info!("{} active system alert(s)", snapshot.len());
                banner.observe(snapshot.into_iter().next());
                match banner.state() {
                    BannerState::Visible(alert) => info!(
                        "danger banner: [{:?}] {} - {}",
                        alert.severity, alert.title, alert.message
                    ),
                    BannerState::Hidden => info!("danger banner: all clear"),
                }
            }
            _ = ticker.tick() => {
                match sos.awaiting_analysis(10).await {
                    Ok(backlog) => info!("{} alert(s) awaiting video analysis", backlog.len()),
                    Err(err) => warn!("backlog query failed: {}", err),
                }
            }
        }
    }

    Ok(())
}
