use campaign_client::{CampaignClient, CampaignClientConfig, CampaignStatus, GovernorSettings};

use futures::StreamExt;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info, warn};

// --- Configuration Environment Variable Names ---
const ENV_BASE_URL: &str = "CAMPAIGN_API_BASE_URL"; // Optional, defaults are in lib.rs
const ENV_GOVERNOR_MAX_REQUESTS: &str = "GOVERNOR_MAX_REQUESTS";
const ENV_GOVERNOR_WINDOW_MS: &str = "GOVERNOR_WINDOW_MS";

const LIVE_UPDATES_TO_SHOW: usize = 3;

// Helper to parse environment variables with a default
fn get_env_var<T: FromStr + std::fmt::Debug>(var_name: &str, default_value: T) -> T
where
    <T as FromStr>::Err: std::fmt::Debug,
{
    env::var(var_name)
        .ok()
        .and_then(|val_str| match val_str.parse::<T>() {
            Ok(val) => Some(val),
            Err(e) => {
                warn!(
                    "Failed to parse env var '{}' (value: '{}'). Error: {:?}. Using default: {:?}",
                    var_name, val_str, e, default_value
                );
                None
            }
        })
        .unwrap_or(default_value)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    let default_log_filter = "info,campaign_client=info,request_governor=info";
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| default_log_filter.to_string()))
        .init();
    if dotenv_loaded {
        info!(".env file loaded successfully.");
    }

    let defaults = CampaignClientConfig::default();
    let governor = GovernorSettings::builder()
        .max_requests(get_env_var(ENV_GOVERNOR_MAX_REQUESTS, defaults.governor.get_max_requests()))
        .window(Duration::from_millis(get_env_var(
            ENV_GOVERNOR_WINDOW_MS,
            defaults.governor.get_window().as_millis() as u64,
        )))
        .build();
    let config = CampaignClientConfig {
        base_url: env::var(ENV_BASE_URL).unwrap_or(defaults.base_url.clone()),
        governor,
        ..defaults
    };
    info!(base_url = %config.base_url, release_interval = ?config.governor.release_interval(), "Starting live dashboard");

    let client = CampaignClient::new(config)?;

    let dashboard = client.fetch_dashboard().await?;
    let insights = &dashboard.insights;
    info!(
        "{} campaigns ({} active, {} paused, {} completed); spend {:.2}, CTR {:.2}%",
        insights.total_campaigns,
        insights.active_campaigns,
        insights.paused_campaigns,
        insights.completed_campaigns,
        insights.total_spend,
        insights.avg_ctr
    );

    for campaign in dashboard.filtered("", Some(CampaignStatus::Active)) {
        info!(id = %campaign.id, name = %campaign.name, budget = campaign.budget, "Active campaign");
    }

    let Some(first) = dashboard.campaigns.first() else {
        warn!("No campaigns returned; nothing to subscribe to.");
        return Ok(());
    };

    let detail = client.fetch_campaign_detail(&first.id).await?;
    info!(
        campaign = %detail.campaign.name,
        remaining_budget = detail.remaining_budget(),
        utilization = ?detail.budget_utilization(),
        cost_per_conversion = ?detail.cost_per_conversion(),
        "Campaign detail"
    );

    let mut subscription = client.subscribe_campaign_insights(&first.id)?;
    let mut shown = 0;
    while let Some(update) = subscription.next().await {
        match update {
            Ok(update) => {
                shown += 1;
                info!(
                    impressions = update.impressions,
                    clicks = update.clicks,
                    conversions = update.conversions,
                    spend = update.spend,
                    "Live update {}/{}",
                    shown,
                    LIVE_UPDATES_TO_SHOW
                );
                if shown == LIVE_UPDATES_TO_SHOW {
                    break;
                }
            }
            Err(e) => error!("Live update stream error (will reconnect): {}", e),
        }
    }
    subscription.close();

    info!(governor = ?client.governor(), "Done");
    Ok(())
}
