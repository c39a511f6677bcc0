//! Client for the campaign analytics API.
//!
//! Every call goes through one [`RequestGovernor`], so the client as a whole
//! never exceeds the API quota: calls over the quota wait in a FIFO queue
//! instead of failing. Throttled calls (HTTP 429) are resubmitted after the
//! server's `retry_after`, and the campaign list and aggregate insights also
//! retry gateway timeouts (HTTP 504) a few times.
//!
//! Live insight updates arrive over server-sent events, either as a
//! [`futures::Stream`] ([`CampaignClient::subscribe_campaign_insights`]) or
//! pushed to callbacks ([`CampaignClient::subscribe_with_handlers`]).
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use tower::retry::Retry;
use tower::{Service, ServiceBuilder, ServiceExt};

use request_governor::governor::http::{ApiRequest, ApiResponse, HttpError};
use request_governor::governor::reqwest_integration::{ReqwestService, classify_reqwest_error};
use request_governor::governor::retries::{
    DEFAULT_RETRY_AFTER, FixedBackoffPolicy, GatewayTimeoutRetryLogic, ThrottleRetryLogic,
    ThrottleRetryPolicy,
};
use request_governor::governor::{QuotaLimit, QuotaLimitLayer, RequestGovernor};

mod error;
mod models;
mod sse;
mod subscription;

pub use error::ClientError;
pub use models::{
    AggregateInsights, Campaign, CampaignDetail, CampaignInsights, CampaignStatus, Dashboard,
};
pub use subscription::{InsightsSubscription, SubscriptionHandle};
pub use request_governor::governor::GovernorSettings;

use error::DecodeSnafu;
use models::{CampaignInsightsResponse, CampaignResponse, CampaignsResponse, InsightsResponse};
use subscription::ByteStream;

// --- Constants ---
const DEFAULT_BASE_URL: &str = "https://mixo-fe-backend-task.vercel.app";
const DEFAULT_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// --- Configuration ---
#[derive(Clone, Debug)]
pub struct CampaignClientConfig {
    pub base_url: String,
    pub user_agent: Option<String>,
    /// Used for both plain requests and live update streams when set.
    pub reqwest_client: Option<ReqwestClient>,
    pub request_timeout: Duration,
    pub governor: GovernorSettings,
    /// Resubmissions of a throttled request before `RateLimited` is returned.
    pub max_throttle_retries: usize,
    /// Wait after a 429 whose body carries no usable `retry_after`.
    pub default_retry_after: Duration,
    /// Extra attempts for list and aggregate fetches after a 504.
    pub gateway_retry_attempts: usize,
    pub gateway_retry_delay: Duration,
    pub stream_reconnect_delay: Duration,
}

impl Default for CampaignClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            reqwest_client: None,
            request_timeout: Duration::from_secs(10),
            governor: GovernorSettings::default(),
            max_throttle_retries: 5,
            default_retry_after: DEFAULT_RETRY_AFTER,
            gateway_retry_attempts: 2,
            gateway_retry_delay: Duration::from_secs(1),
            stream_reconnect_delay: Duration::from_secs(3),
        }
    }
}

// --- Routes ---
mod routes {
    pub const CAMPAIGNS: &str = "/campaigns";
    pub const INSIGHTS: &str = "/campaigns/insights";

    pub fn campaign(id: &str) -> String {
        format!("/campaigns/{id}")
    }

    pub fn campaign_insights(id: &str) -> String {
        format!("/campaigns/{id}/insights")
    }

    pub fn campaign_insights_stream(id: &str) -> String {
        format!("/campaigns/{id}/insights/stream")
    }
}

// --- Campaign Client ---
/// The transport wrapped in admission control, with throttled requests
/// resubmitted through admission.
type GovernedService<T> = Retry<ThrottleRetryPolicy<ThrottleRetryLogic>, QuotaLimit<T>>;

/// Client for the campaign analytics API.
///
/// Cheap to clone; clones share the quota, the queue and the connection pool.
#[derive(Clone)]
pub struct CampaignClient<T = ReqwestService> {
    service: GovernedService<T>,
    gateway_retry: FixedBackoffPolicy<GatewayTimeoutRetryLogic>,
    governor: RequestGovernor,
    streams: Option<ReqwestService>,
    /// Shared configuration for the client.
    pub config: Arc<CampaignClientConfig>,
}

impl<T> Debug for CampaignClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignClient")
            .field("config", &self.config)
            .field("governor", &self.governor)
            .finish_non_exhaustive()
    }
}

impl CampaignClient<ReqwestService> {
    /// Creates a client talking to `config.base_url` over HTTP.
    ///
    /// # Errors
    ///
    /// `InvalidUrl` if the base URL does not parse, `Initialization` if the
    /// HTTP client cannot be built.
    pub fn new(config: CampaignClientConfig) -> Result<Self, ClientError> {
        let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);

        let (request_client, stream_client) = match config.reqwest_client.clone() {
            Some(client) => (client.clone(), client),
            None => {
                let request_client = ReqwestClient::builder()
                    .timeout(config.request_timeout)
                    .connect_timeout(CONNECT_TIMEOUT)
                    .user_agent(user_agent)
                    .build()
                    .map_err(|e| ClientError::Initialization {
                        message: format!("Failed to build HTTP client: {e}"),
                    })?;
                // No total timeout: live update responses never finish.
                let stream_client = ReqwestClient::builder()
                    .connect_timeout(CONNECT_TIMEOUT)
                    .user_agent(user_agent)
                    .build()
                    .map_err(|e| ClientError::Initialization {
                        message: format!("Failed to build streaming HTTP client: {e}"),
                    })?;
                (request_client, stream_client)
            }
        };

        let transport = ReqwestService::new_with_client(request_client, &config.base_url)
            .map_err(|e| ClientError::InvalidUrl {
                details: e.to_string(),
            })?;
        let streams = ReqwestService::new_with_client(stream_client, &config.base_url).map_err(
            |e| ClientError::InvalidUrl {
                details: e.to_string(),
            },
        )?;

        tracing::info!(target: "campaign_client", base_url = %transport.base_url(), "Campaign client ready");

        let mut client = Self::with_transport(config, transport);
        client.streams = Some(streams);
        Ok(client)
    }

    /// Opens live insight updates for one campaign.
    ///
    /// Each (re)connection is admitted through the same quota as every other
    /// request. See [`InsightsSubscription`] for failure behavior.
    pub fn subscribe_campaign_insights(
        &self,
        campaign_id: &str,
    ) -> Result<InsightsSubscription, ClientError> {
        validate_campaign_id(campaign_id)?;
        let streams = self.streams.clone().ok_or_else(|| ClientError::Initialization {
            message: "live updates need an HTTP transport".to_string(),
        })?;
        let path = routes::campaign_insights_stream(campaign_id);
        let governor = self.governor.clone();

        tracing::debug!(target: "campaign_client", %path, "Subscribing to live insights");

        let connect = move |last_event_id: Option<String>| {
            let governor = governor.clone();
            let streams = streams.clone();
            let path = path.clone();
            async move {
                governor.acquire().await?;
                open_event_stream(&streams, &path, last_event_id.as_deref()).await
            }
        };

        Ok(InsightsSubscription::new(
            campaign_id.to_string(),
            connect,
            self.config.stream_reconnect_delay,
            self.config.default_retry_after,
        ))
    }

    /// Delivers live insight updates to `on_message` from a background task.
    ///
    /// Callbacks for one subscription never run concurrently. Connection
    /// failures go to `on_error` and the subscription keeps reconnecting
    /// until the handle is closed or dropped.
    pub fn subscribe_with_handlers<M, E>(
        &self,
        campaign_id: &str,
        on_message: M,
        on_error: E,
    ) -> Result<SubscriptionHandle, ClientError>
    where
        M: FnMut(CampaignInsights) + Send + 'static,
        E: FnMut(&ClientError) + Send + 'static,
    {
        let subscription = self.subscribe_campaign_insights(campaign_id)?;
        Ok(SubscriptionHandle::spawn(subscription, on_message, on_error))
    }
}

async fn open_event_stream(
    streams: &ReqwestService,
    path: &str,
    last_event_id: Option<&str>,
) -> Result<ByteStream, HttpError> {
    let url = streams.url_for(path)?;
    let mut request = streams
        .client()
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream");
    if let Some(id) = last_event_id {
        request = request.header("Last-Event-ID", id);
    }
    let response = request
        .send()
        .await
        .map_err(classify_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HttpError::Status { status, body });
    }

    Ok(response.bytes_stream().map_err(classify_reqwest_error).boxed())
}

impl<T> CampaignClient<T>
where
    T: Service<ApiRequest, Response = ApiResponse, Error = HttpError> + Clone + Send + 'static,
    T::Future: Send,
{
    /// Builds a client over any transport service; live updates are not
    /// available on such a client.
    pub fn with_transport(config: CampaignClientConfig, transport: T) -> Self {
        let governor = RequestGovernor::new(config.governor.clone());

        let throttle_retry = ThrottleRetryPolicy::new(
            config.max_throttle_retries,
            config.default_retry_after,
            ThrottleRetryLogic,
        );
        let gateway_retry = FixedBackoffPolicy::new(
            config.gateway_retry_attempts,
            config.gateway_retry_delay,
            GatewayTimeoutRetryLogic,
        );

        let service = ServiceBuilder::new()
            .retry(throttle_retry)
            .layer(QuotaLimitLayer::new(governor.clone()))
            .service(transport);

        Self {
            service,
            gateway_retry,
            governor,
            streams: None,
            config: Arc::new(config),
        }
    }

    /// The governor every request of this client is admitted through.
    pub fn governor(&self) -> &RequestGovernor {
        &self.governor
    }

    pub async fn fetch_campaigns(&self) -> Result<Vec<Campaign>, ClientError> {
        let response: CampaignsResponse = self.get_with_gateway_retry(routes::CAMPAIGNS).await?;
        tracing::debug!(target: "campaign_client", count = response.campaigns.len(), "Fetched campaigns");
        Ok(response.campaigns)
    }

    /// # Errors
    ///
    /// `NotFound` when no campaign has this id.
    pub async fn fetch_campaign(&self, campaign_id: &str) -> Result<Campaign, ClientError> {
        validate_campaign_id(campaign_id)?;
        let response: CampaignResponse = self.get(&routes::campaign(campaign_id)).await?;
        Ok(response.campaign)
    }

    pub async fn fetch_insights(&self) -> Result<AggregateInsights, ClientError> {
        let response: InsightsResponse = self.get_with_gateway_retry(routes::INSIGHTS).await?;
        Ok(response.insights)
    }

    pub async fn fetch_campaign_insights(
        &self,
        campaign_id: &str,
    ) -> Result<CampaignInsights, ClientError> {
        validate_campaign_id(campaign_id)?;
        let response: CampaignInsightsResponse =
            self.get(&routes::campaign_insights(campaign_id)).await?;
        Ok(response.insights)
    }

    /// Campaign list and aggregate insights, fetched concurrently.
    pub async fn fetch_dashboard(&self) -> Result<Dashboard, ClientError> {
        let (campaigns, insights) =
            futures::try_join!(self.fetch_campaigns(), self.fetch_insights())?;
        Ok(Dashboard {
            campaigns,
            insights,
        })
    }

    /// One campaign and its insights, fetched concurrently.
    pub async fn fetch_campaign_detail(&self, campaign_id: &str) -> Result<CampaignDetail, ClientError> {
        let (campaign, insights) = futures::try_join!(
            self.fetch_campaign(campaign_id),
            self.fetch_campaign_insights(campaign_id)
        )?;
        Ok(CampaignDetail { campaign, insights })
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        tracing::debug!(target: "campaign_client", %path, "Sending request");
        let response = self
            .service
            .clone()
            .oneshot(ApiRequest::get(path))
            .await
            .map_err(|e| ClientError::from_http(e, path))?;
        decode(path, &response)
    }

    async fn get_with_gateway_retry<R: DeserializeOwned>(&self, path: &str) -> Result<R, ClientError> {
        tracing::debug!(target: "campaign_client", %path, "Sending request with gateway-timeout retry");
        let response = Retry::new(self.gateway_retry.clone(), self.service.clone())
            .oneshot(ApiRequest::get(path))
            .await
            .map_err(|e| {
                if e.is_status(http::StatusCode::GATEWAY_TIMEOUT) {
                    tracing::error!(target: "campaign_client", %path, "Gateway timeouts persisted after retries");
                }
                ClientError::from_http(e, path)
            })?;
        decode(path, &response)
    }
}

fn decode<R: DeserializeOwned>(path: &str, response: &ApiResponse) -> Result<R, ClientError> {
    response.json().context(DecodeSnafu { path })
}

fn validate_campaign_id(campaign_id: &str) -> Result<(), ClientError> {
    let invalid = campaign_id.is_empty()
        || campaign_id
            .chars()
            .any(|c| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace());
    if invalid {
        return Err(ClientError::InvalidCampaignId {
            id: campaign_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;
    use tokio::time::Instant;

    use super::*;

    /// Records when each request reached the transport.
    #[derive(Clone, Default)]
    struct Calls(Arc<Mutex<Vec<(String, Instant)>>>);

    impl Calls {
        /// Returns how many times `path` has been requested, this one included.
        fn record(&self, path: &str) -> usize {
            let mut calls = self.0.lock().unwrap();
            calls.push((path.to_string(), Instant::now()));
            calls.iter().filter(|(p, _)| p == path).count()
        }

        fn times_for(&self, path: &str) -> Vec<Instant> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .filter(|(p, _)| p == path)
                .map(|(_, at)| *at)
                .collect()
        }

        fn total(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    const CAMPAIGN_JSON: &str = r#"{
        "id": "camp_1",
        "name": "Summer Sale",
        "status": "active",
        "budget": 5000,
        "daily_budget": 250,
        "platforms": ["meta"],
        "created_at": "2024-05-01T10:00:00Z"
    }"#;

    fn ok(body: String) -> Result<ApiResponse, HttpError> {
        Ok(ApiResponse::new(StatusCode::OK, body))
    }

    fn status(code: StatusCode, body: &str) -> Result<ApiResponse, HttpError> {
        Err(HttpError::Status {
            status: code,
            body: body.to_string(),
        })
    }

    /// A transport whose answer depends on the path and on how many times
    /// that path was requested so far (1-based).
    fn client<F>(
        config: CampaignClientConfig,
        calls: &Calls,
        respond: F,
    ) -> CampaignClient<
        impl Service<ApiRequest, Response = ApiResponse, Error = HttpError, Future: Send>
        + Clone
        + Send
        + 'static,
    >
    where
        F: Fn(&str, usize) -> Result<ApiResponse, HttpError> + Send + Sync + 'static,
    {
        let calls = calls.clone();
        let respond = Arc::new(respond);
        let transport = tower::service_fn(move |request: ApiRequest| {
            let attempt = calls.record(&request.path);
            let result = respond(&request.path, attempt);
            async move { result }
        });
        CampaignClient::with_transport(config, transport)
    }

    fn default_api(path: &str, _attempt: usize) -> Result<ApiResponse, HttpError> {
        match path {
            "/campaigns" => ok(format!(r#"{{"campaigns": [{CAMPAIGN_JSON}]}}"#)),
            "/campaigns/insights" => ok(r#"{"insights": {"total_campaigns": 1, "active_campaigns": 1, "total_spend": 120.5}}"#.to_string()),
            "/campaigns/camp_1" => ok(format!(r#"{{"campaign": {CAMPAIGN_JSON}}}"#)),
            "/campaigns/camp_1/insights" => ok(r#"{"insights": {"campaign_id": "camp_1", "spend": 1250, "conversions": 25}}"#.to_string()),
            _ => status(StatusCode::NOT_FOUND, r#"{"error": "not found"}"#),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_and_decodes_resources() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, default_api);

        let campaigns = client.fetch_campaigns().await.unwrap();
        assert_eq!(campaigns.len(), 1);
        assert_eq!(campaigns[0].status, CampaignStatus::Active);

        let insights = client.fetch_insights().await.unwrap();
        assert_eq!(insights.total_campaigns, 1);
        assert_eq!(insights.total_spend, 120.5);

        let campaign = client.fetch_campaign("camp_1").await.unwrap();
        assert_eq!(campaign.name, "Summer Sale");

        let campaign_insights = client.fetch_campaign_insights("camp_1").await.unwrap();
        assert_eq!(campaign_insights.conversions, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_campaign_is_not_found() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, default_api);

        let error = client.fetch_campaign("nope").await.unwrap_err();
        assert!(matches!(error, ClientError::NotFound { ref resource } if resource == "/campaigns/nope"));
        assert!(!error.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_ids_are_rejected_before_sending() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, default_api);

        for id in ["", "a/b", "a b", "x?y"] {
            assert!(matches!(
                client.fetch_campaign(id).await,
                Err(ClientError::InvalidCampaignId { .. })
            ));
        }
        assert_eq!(calls.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_json_is_a_decode_error() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, |_, _| {
            ok("<html>oops</html>".to_string())
        });

        assert!(matches!(
            client.fetch_campaigns().await,
            Err(ClientError::Decode { ref path, .. }) if path == "/campaigns"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_gateway_timeout_on_aggregate_gives_up_after_three_attempts() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, |_, _| {
            status(StatusCode::GATEWAY_TIMEOUT, "")
        });

        let error = client.fetch_insights().await.unwrap_err();
        assert!(matches!(error, ClientError::GatewayTimeout { .. }));

        let times = calls.times_for("/campaigns/insights");
        assert_eq!(times.len(), 3);
        for pair in times.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= Duration::from_secs(1) && gap < Duration::from_secs(2), "gap {gap:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_gateway_timeout_on_list_is_invisible() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, |path, attempt| {
            if attempt == 1 {
                status(StatusCode::GATEWAY_TIMEOUT, "")
            } else {
                default_api(path, attempt)
            }
        });

        assert_eq!(client.fetch_campaigns().await.unwrap().len(), 1);
        assert_eq!(calls.times_for("/campaigns").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_campaign_fetch_does_not_retry_gateway_timeouts() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, |_, _| {
            status(StatusCode::GATEWAY_TIMEOUT, "")
        });

        assert!(matches!(
            client.fetch_campaign("camp_1").await,
            Err(ClientError::GatewayTimeout { .. })
        ));
        assert_eq!(calls.total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_request_is_resubmitted_after_retry_after() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, |path, attempt| {
            if attempt == 1 {
                status(StatusCode::TOO_MANY_REQUESTS, r#"{"retry_after": 5}"#)
            } else {
                default_api(path, attempt)
            }
        });

        let start = Instant::now();
        let campaign = client.fetch_campaign("camp_1").await.unwrap();
        assert_eq!(campaign.id, "camp_1");
        assert!(start.elapsed() >= Duration::from_secs(5));

        let times = calls.times_for("/campaigns/camp_1");
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_retry_after_waits_the_capped_delay() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, |path, attempt| {
            if attempt == 1 {
                status(
                    StatusCode::TOO_MANY_REQUESTS,
                    r#"{"retry_after": 18446744073709551616}"#,
                )
            } else {
                default_api(path, attempt)
            }
        });

        let start = Instant::now();
        assert_eq!(client.fetch_campaign("camp_1").await.unwrap().id, "camp_1");
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(3600) && waited < Duration::from_secs(3660));
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_beyond_the_ceiling_is_rate_limited() {
        let calls = Calls::default();
        let config = CampaignClientConfig {
            max_throttle_retries: 2,
            ..Default::default()
        };
        let client = client(config, &calls, |_, _| {
            status(StatusCode::TOO_MANY_REQUESTS, r#"{"retry_after": 1}"#)
        });

        let error = client.fetch_campaign("camp_1").await.unwrap_err();
        assert!(matches!(
            error,
            ClientError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(1)
        ));
        assert_eq!(calls.total(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn requests_over_the_quota_queue_instead_of_failing() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, default_api);
        let start = Instant::now();

        let fetches = (0..12).map(|_| client.fetch_campaign("camp_1"));
        let results = futures::future::join_all(fetches).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let mut offsets: Vec<Duration> = calls
            .times_for("/campaigns/camp_1")
            .into_iter()
            .map(|at| at - start)
            .collect();
        offsets.sort();
        assert_eq!(offsets.len(), 12);
        assert!(offsets[..10].iter().all(|o| o.is_zero()));
        assert!(offsets[10] >= Duration::from_secs(6) && offsets[10] < Duration::from_secs(7));
        assert!(offsets[11] >= Duration::from_secs(12) && offsets[11] < Duration::from_secs(13));
    }

    #[tokio::test(start_paused = true)]
    async fn dashboard_and_detail_combine_concurrent_fetches() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, default_api);

        let dashboard = client.fetch_dashboard().await.unwrap();
        assert_eq!(dashboard.campaigns.len(), 1);
        assert_eq!(dashboard.insights.active_campaigns, 1);
        assert_eq!(dashboard.filtered("summer", Some(CampaignStatus::Active)).count(), 1);
        assert_eq!(dashboard.filtered("", Some(CampaignStatus::Paused)).count(), 0);

        let detail = client.fetch_campaign_detail("camp_1").await.unwrap();
        assert_eq!(detail.campaign.id, "camp_1");
        assert_eq!(detail.remaining_budget(), 3750.0);
        assert_eq!(calls.total(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn dashboard_fails_when_either_fetch_fails() {
        let calls = Calls::default();
        let client = client(CampaignClientConfig::default(), &calls, |path, attempt| {
            if path == "/campaigns/insights" {
                status(StatusCode::INTERNAL_SERVER_ERROR, "boom")
            } else {
                default_api(path, attempt)
            }
        });

        assert!(matches!(
            client.fetch_dashboard().await,
            Err(ClientError::Api { status, .. }) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[test]
    fn default_config_matches_the_api_contract() {
        let config = CampaignClientConfig::default();
        assert_eq!(config.base_url, "https://mixo-fe-backend-task.vercel.app");
        assert_eq!(config.governor.get_max_requests(), 10);
        assert_eq!(config.governor.get_window(), Duration::from_secs(60));
        assert_eq!(config.default_retry_after, Duration::from_secs(60));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn http_client_rejects_bad_base_url() {
        let config = CampaignClientConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            CampaignClient::new(config),
            Err(ClientError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn subscribing_needs_the_streaming_transport() {
        let transport = ReqwestService::new("http://127.0.0.1:9").unwrap();
        let client = CampaignClient::with_transport(CampaignClientConfig::default(), transport);
        assert!(matches!(
            client.subscribe_campaign_insights("camp_1"),
            Err(ClientError::Initialization { .. })
        ));
    }

    #[tokio::test]
    async fn subscription_rejects_invalid_campaign_id() {
        let client = CampaignClient::new(CampaignClientConfig::default()).unwrap();
        assert!(matches!(
            client.subscribe_campaign_insights("a/b"),
            Err(ClientError::InvalidCampaignId { .. })
        ));
    }
}
