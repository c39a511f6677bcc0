use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};
use http::StatusCode;
use request_governor::governor::{http::HttpError, retries::RetryDirective};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::{
    error::ClientError,
    models::CampaignInsights,
    sse::{SseDecoder, SseEvent},
};

/// Raw body of one live update connection.
pub(crate) type ByteStream = BoxStream<'static, Result<Bytes, HttpError>>;

/// Live insight updates for one campaign.
///
/// Yields one item per well-formed update event. A failed or dropped
/// connection is reported as [`ClientError::StreamConnection`] and the
/// subscription keeps going: the next poll reconnects after the reconnect
/// delay (or the server's `retry:` hint) and resumes from the last event id
/// seen. Events whose payload is not valid insights JSON are logged and
/// skipped.
///
/// The stream never ends on its own; call [`close`](Self::close) or drop it.
pub struct InsightsSubscription {
    campaign_id: String,
    events: Option<BoxStream<'static, Result<CampaignInsights, ClientError>>>,
}

impl std::fmt::Debug for InsightsSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightsSubscription")
            .field("campaign_id", &self.campaign_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl InsightsSubscription {
    /// `connect` opens a fresh connection each time it is called, given the
    /// id of the last event received so far.
    pub(crate) fn new<F, Fut>(
        campaign_id: String,
        connect: F,
        reconnect_delay: Duration,
        default_retry_after: Duration,
    ) -> Self
    where
        F: FnMut(Option<String>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<ByteStream, HttpError>> + Send + 'static,
    {
        let state = StreamState {
            campaign_id: campaign_id.clone(),
            connect,
            body: None,
            decoder: SseDecoder::default(),
            last_event_id: None,
            pending: VecDeque::new(),
            reconnect_delay,
            default_retry_after,
            next_delay: None,
        };
        let events = stream::unfold(state, StreamState::next_item).boxed();

        Self {
            campaign_id,
            events: Some(events),
        }
    }

    pub fn campaign_id(&self) -> &str {
        &self.campaign_id
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_none()
    }

    /// Drops the connection. Later polls return `None`; closing twice is a
    /// no-op.
    pub fn close(&mut self) {
        if self.events.take().is_some() {
            info!(target: "campaign_client::stream", campaign_id = %self.campaign_id, "Closed live insights subscription.");
        }
    }
}

impl Stream for InsightsSubscription {
    type Item = Result<CampaignInsights, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.events.as_mut() {
            Some(events) => events.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

struct StreamState<F> {
    campaign_id: String,
    connect: F,
    body: Option<ByteStream>,
    decoder: SseDecoder,
    last_event_id: Option<String>,
    pending: VecDeque<CampaignInsights>,
    reconnect_delay: Duration,
    default_retry_after: Duration,
    /// Set after a failure; the next connect waits this long first.
    next_delay: Option<Duration>,
}

impl<F, Fut> StreamState<F>
where
    F: FnMut(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<ByteStream, HttpError>> + Send + 'static,
{
    async fn next_item(mut self) -> Option<(Result<CampaignInsights, ClientError>, Self)> {
        loop {
            if let Some(insights) = self.pending.pop_front() {
                return Some((Ok(insights), self));
            }

            if self.body.is_none() {
                if let Some(delay) = self.next_delay.take() {
                    debug!(target: "campaign_client::stream", campaign_id = %self.campaign_id, delay_ms = delay.as_millis() as u64, "Waiting before reconnecting.");
                    tokio::time::sleep(delay).await;
                }
                match (self.connect)(self.last_event_id.clone()).await {
                    Ok(body) => {
                        info!(target: "campaign_client::stream", campaign_id = %self.campaign_id, "Live insights stream connected.");
                        self.body = Some(body);
                        self.decoder = SseDecoder::default();
                        continue;
                    }
                    Err(source) => {
                        self.next_delay = Some(self.delay_after(&source));
                        error!(target: "campaign_client::stream", campaign_id = %self.campaign_id, error = %source, "Live insights connection failed.");
                        return Some((Err(ClientError::StreamConnection { source }), self));
                    }
                }
            }

            let next = match self.body.as_mut() {
                Some(body) => body.next().await,
                None => continue,
            };

            match next {
                Some(Ok(chunk)) => {
                    match self.decoder.push(&chunk) {
                        Ok(events) => {
                            for event in events {
                                self.accept(event);
                            }
                        }
                        Err(overflow) => {
                            self.body = None;
                            self.next_delay = Some(self.reconnect_delay);
                            error!(target: "campaign_client::stream", campaign_id = %self.campaign_id, error = %overflow, "Live insights stream sent an oversized line.");
                            let source = HttpError::ClientError {
                                source: Box::new(overflow),
                            };
                            return Some((Err(ClientError::StreamConnection { source }), self));
                        }
                    }
                    if let Some(retry) = self.decoder.take_retry() {
                        self.reconnect_delay = retry;
                    }
                }
                Some(Err(source)) => {
                    self.body = None;
                    self.next_delay = Some(self.reconnect_delay);
                    error!(target: "campaign_client::stream", campaign_id = %self.campaign_id, error = %source, "Live insights stream failed.");
                    return Some((Err(ClientError::StreamConnection { source }), self));
                }
                None => {
                    self.body = None;
                    self.next_delay = Some(self.reconnect_delay);
                    warn!(target: "campaign_client::stream", campaign_id = %self.campaign_id, "Live insights stream closed by server.");
                    let source = HttpError::Transport {
                        source: "event stream ended".into(),
                    };
                    return Some((Err(ClientError::StreamConnection { source }), self));
                }
            }
        }
    }

    fn accept(&mut self, event: SseEvent) {
        if event.id.is_some() {
            self.last_event_id = event.id.clone();
        }
        if !event.is_message() {
            trace!(target: "campaign_client::stream", campaign_id = %self.campaign_id, event = ?event.event, "Ignoring named event.");
            return;
        }
        match serde_json::from_str::<CampaignInsights>(&event.data) {
            Ok(insights) => self.pending.push_back(insights),
            Err(e) => {
                warn!(target: "campaign_client::stream", campaign_id = %self.campaign_id, error = %e, "Discarding malformed live update.");
            }
        }
    }

    /// A throttled connect waits as long as the server asks.
    fn delay_after(&self, error: &HttpError) -> Duration {
        match error {
            HttpError::Status { status, body } if *status == StatusCode::TOO_MANY_REQUESTS => {
                RetryDirective::from_throttle_body(body)
                    .map(|directive| directive.delay)
                    .unwrap_or(self.default_retry_after)
            }
            _ => self.reconnect_delay,
        }
    }
}

/// Background delivery of a subscription to callbacks.
///
/// Dropping the handle closes the subscription too.
#[derive(Debug)]
pub struct SubscriptionHandle {
    campaign_id: String,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub(crate) fn spawn<M, E>(mut subscription: InsightsSubscription, mut on_message: M, mut on_error: E) -> Self
    where
        M: FnMut(CampaignInsights) + Send + 'static,
        E: FnMut(&ClientError) + Send + 'static,
    {
        let campaign_id = subscription.campaign_id().to_string();
        let task = tokio::spawn(async move {
            while let Some(item) = subscription.next().await {
                match item {
                    Ok(insights) => on_message(insights),
                    Err(error) => on_error(&error),
                }
            }
        });
        Self { campaign_id, task }
    }

    pub fn campaign_id(&self) -> &str {
        &self.campaign_id
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops delivery. A callback that is already running finishes, but no
    /// further updates are delivered once the task stops.
    pub fn close(self) {
        self.task.abort();
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!(target: "campaign_client::stream", campaign_id = %self.campaign_id, "Stopped live insights delivery.");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use tokio::time::Instant;
    use tokio_test::{assert_pending, task};

    use super::*;

    fn body(chunks: &[&'static str]) -> ByteStream {
        let chunks: Vec<Result<Bytes, HttpError>> = chunks
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        // Stay open after the scripted chunks, like a live connection.
        stream::iter(chunks).chain(stream::pending()).boxed()
    }

    fn subscription<F>(connect: F) -> InsightsSubscription
    where
        F: FnMut(Option<String>) -> futures::future::Ready<Result<ByteStream, HttpError>>
            + Send
            + 'static,
    {
        InsightsSubscription::new(
            "camp_1".to_string(),
            connect,
            Duration::from_secs(3),
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn yields_updates_and_skips_malformed_events() {
        let mut sub = subscription(|_| {
            futures::future::ready(Ok(body(&[
                "data: {not json\n\n",
                "event: heartbeat\ndata: {}\n\n",
                "data: {\"impressions\": 10, \"clicks\": 2}\n\n",
                "data: {\"impressions\": 11, \"clicks\": 3}\n\n",
            ])))
        });

        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.impressions, 10);
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.clicks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_is_reported_then_retried_after_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut sub = subscription(move |_| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(if call == 0 {
                Err(HttpError::Transport {
                    source: "connection refused".into(),
                })
            } else {
                Ok(body(&["data: {\"conversions\": 4}\n\n"]))
            })
        });

        let start = Instant::now();
        let error = sub.next().await.unwrap().unwrap_err();
        assert!(matches!(error, ClientError::StreamConnection { .. }));
        assert!(error.is_retryable());

        let update = sub.next().await.unwrap().unwrap();
        assert_eq!(update.conversions, 4);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn server_retry_hint_replaces_reconnect_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut sub = subscription(move |_| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            let chunks: Vec<Result<Bytes, HttpError>> = if call == 0 {
                vec![Ok(Bytes::from_static(b"retry: 500\ndata: {\"clicks\": 1}\n\n"))]
            } else {
                vec![Ok(Bytes::from_static(b"data: {\"clicks\": 2}\n\n"))]
            };
            let body: ByteStream = if call == 0 {
                // First connection ends after one event.
                stream::iter(chunks).boxed()
            } else {
                stream::iter(chunks).chain(stream::pending()).boxed()
            };
            futures::future::ready(Ok(body))
        });

        assert_eq!(sub.next().await.unwrap().unwrap().clicks, 1);
        assert!(matches!(
            sub.next().await.unwrap(),
            Err(ClientError::StreamConnection { .. })
        ));

        let start = Instant::now();
        assert_eq!(sub.next().await.unwrap().unwrap().clicks, 2);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(500) && waited < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_connect_waits_for_retry_after() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut sub = subscription(move |_| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(if call == 0 {
                Err(HttpError::Status {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    body: r#"{"retry_after": 20}"#.to_string(),
                })
            } else {
                Ok(body(&["data: {}\n\n"]))
            })
        });

        assert!(sub.next().await.unwrap().is_err());
        let start = Instant::now();
        assert!(sub.next().await.unwrap().is_ok());
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_subscription_ends_and_close_is_idempotent() {
        let mut sub = subscription(|_| futures::future::ready(Ok(body(&[]))));
        assert!(!sub.is_closed());

        sub.close();
        sub.close();
        assert!(sub.is_closed());
        assert!(sub.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn handle_delivers_to_callbacks_until_closed() {
        let sub = subscription(|_| {
            futures::future::ready(Ok(body(&[
                "data: {\"spend\": 1.5}\n\n",
                "data: {\"spend\": 2.5}\n\n",
            ])))
        });

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let errors = Arc::new(AtomicUsize::new(0));
        let error_count = errors.clone();
        let handle = SubscriptionHandle::spawn(
            sub,
            move |insights| {
                let _ = tx.send(insights.spend);
            },
            move |_| {
                error_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(rx.recv().await, Some(1.5));
        assert_eq!(rx.recv().await, Some(2.5));
        assert_eq!(handle.campaign_id(), "camp_1");

        handle.close();
        // The task owned the sender; aborting it closes the channel.
        assert_eq!(rx.recv().await, None);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn idle_connection_stays_pending() {
        let mut sub = subscription(|_| futures::future::ready(Ok(body(&[": keep-alive\n\n"]))));

        let mut next = task::spawn(sub.next());
        assert_pending!(next.poll());
        assert_pending!(next.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_resumes_from_last_event_id() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let mut sub = subscription(move |last_event_id| {
            let mut seen = recorded.lock().unwrap();
            seen.push(last_event_id);
            let body: ByteStream = if seen.len() == 1 {
                // First connection ends after one event.
                stream::iter(vec![Ok(Bytes::from_static(
                    b"id: 7\ndata: {\"clicks\": 1}\n\n",
                ))])
                .boxed()
            } else {
                body(&["data: {\"clicks\": 2}\n\n"])
            };
            futures::future::ready(Ok(body))
        });

        assert_eq!(sub.next().await.unwrap().unwrap().clicks, 1);
        assert!(sub.next().await.unwrap().is_err());
        assert_eq!(sub.next().await.unwrap().unwrap().clicks, 2);
        assert_eq!(*seen.lock().unwrap(), vec![None, Some("7".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_line_drops_the_connection_and_reconnects() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut sub = subscription(move |_| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            let body: ByteStream = if call == 0 {
                let flood = Bytes::from(vec![b'x'; crate::sse::MAX_LINE_BYTES + 1]);
                stream::iter(vec![Ok(flood)]).chain(stream::pending()).boxed()
            } else {
                body(&["data: {\"conversions\": 9}\n\n"])
            };
            futures::future::ready(Ok(body))
        });

        assert!(matches!(
            sub.next().await.unwrap(),
            Err(ClientError::StreamConnection {
                source: HttpError::ClientError { .. }
            })
        ));
        assert_eq!(sub.next().await.unwrap().unwrap().conversions, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_reports_errors_and_keeps_delivering() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = subscription(move |_| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(if call == 0 {
                Err(HttpError::Timeout)
            } else {
                Ok(body(&["data: {\"spend\": 4.0}\n\n"]))
            })
        });

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let errors = Arc::new(AtomicUsize::new(0));
        let error_count = errors.clone();
        let handle = SubscriptionHandle::spawn(
            sub,
            move |insights| {
                let _ = tx.send(insights.spend);
            },
            move |error| {
                assert!(matches!(error, ClientError::StreamConnection { .. }));
                error_count.fetch_add(1, Ordering::SeqCst);
            },
        );

        let start = Instant::now();
        assert_eq!(rx.recv().await, Some(4.0));
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert!(!handle.is_closed());
        handle.close();
    }
}
