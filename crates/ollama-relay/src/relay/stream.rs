use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONNECTION, HeaderMap, HeaderValue};
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout_at};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Config, DefaultsConfig, ForwardingMode, RelayConfig, UpstreamConfig};
use crate::error::RelayError;

use super::line_buffer::LineBuffer;
use super::pacing::{Pacer, tokenize};
use super::record::UpstreamRecord;
use super::request::GenerationRequest;

/// Longest upstream error body quoted back in an `Upstream` error
const ERROR_EXCERPT_LEN: usize = 200;

/// How a relay stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The upstream sent a record with `done: true`
    Done,
    /// The upstream body ended without an explicit `done`
    Exhausted,
    /// The consumer dropped the stream
    ConsumerGone,
    /// Reading the upstream body failed mid-stream
    ReadFailed(String),
}

impl StreamEnd {
    /// Whether the stream ended because the upstream finished
    pub fn is_clean(&self) -> bool {
        matches!(self, StreamEnd::Done | StreamEnd::Exhausted)
    }
}

/// Resolves once the producer side of a [`RelayStream`] has stopped
pub struct CompletionHandle {
    receiver: oneshot::Receiver<StreamEnd>,
}

impl CompletionHandle {
    pub async fn wait(self) -> StreamEnd {
        self.receiver
            .await
            .unwrap_or_else(|_| StreamEnd::ReadFailed("relay task ended unexpectedly".to_string()))
    }
}

/// Outbound byte stream of decoded text
///
/// End of stream marks completion. Dropping the stream cancels the relay and
/// releases the upstream connection.
pub struct RelayStream {
    inner: ReceiverStream<Bytes>,
    completion: Option<CompletionHandle>,
    _cancel_on_drop: DropGuard,
}

impl RelayStream {
    /// Take the handle reporting how the stream ended
    ///
    /// The byte stream itself never carries errors; this is the only way to
    /// tell a clean end from a failed mid-stream read.
    pub fn take_completion(&mut self) -> Option<CompletionHandle> {
        self.completion.take()
    }
}

impl Stream for RelayStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Opens generation requests and reframes their responses
#[derive(Debug, Clone)]
pub struct StreamRelay {
    client: reqwest::Client,
    upstream: UpstreamConfig,
    relay: RelayConfig,
    defaults: DefaultsConfig,
}

impl StreamRelay {
    /// Create a relay with its own HTTP client
    pub fn new(config: &Config) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a relay sharing an existing HTTP client
    fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            upstream: config.upstream.clone(),
            relay: config.relay.clone(),
            defaults: config.defaults.clone(),
        }
    }

    /// Issue the upstream request and return the outbound stream
    ///
    /// Errors are returned only while no byte has been forwarded yet. The
    /// configured timeout covers the wait for response headers; once they
    /// arrive the stream runs until the upstream finishes or the consumer
    /// drops it.
    pub async fn open(&self, request: GenerationRequest) -> Result<RelayStream, RelayError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "relay",
            %request_id,
            model = %request.model,
            user_id = request.identity.as_ref().and_then(|i| i.id.as_deref()),
            user_email = request.identity.as_ref().and_then(|i| i.email.as_deref()),
        );

        self.open_inner(request).instrument(span).await
    }

    async fn open_inner(&self, request: GenerationRequest) -> Result<RelayStream, RelayError> {
        let deadline = Instant::now() + self.upstream.timeout();
        let url = self
            .upstream
            .generate_url()
            .map_err(|e| RelayError::Internal(e.to_string()))?;
        let body = request.to_body(&self.defaults, self.upstream.stream);

        tracing::debug!(state = "request_sent", %url, stream = self.upstream.stream, "Sending generation request");

        let send = self
            .client
            .post(url)
            .headers(self.request_headers())
            .json(&body)
            .send();

        let response = match timeout_at(deadline, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.classify(e)),
            Err(_) => {
                tracing::warn!(
                    error_type = "timeout",
                    timeout_ms = self.upstream.timeout_ms,
                    "Upstream did not respond before the deadline"
                );
                return Err(RelayError::Timeout);
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(read_upstream_error(response, deadline).await);
        }

        tracing::debug!(state = "streaming", %status, "Upstream accepted request");

        let pump = Pump {
            mode: self.relay.forwarding,
            token_delay: self.relay.token_delay(),
            cancel: CancellationToken::new(),
        };
        Ok(spawn_pump(
            response.bytes_stream(),
            pump,
            self.relay.channel_capacity,
        ))
    }

    fn request_headers(&self) -> HeaderMap {
        let accept = if self.upstream.stream {
            "text/event_stream"
        } else {
            "application/json"
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers
    }

    fn classify(&self, error: reqwest::Error) -> RelayError {
        // The client has no timeout of its own; deadlines come from `timeout_at`
        if error.is_connect() {
            tracing::error!(
                error_type = "connection",
                error_message = %error,
                host = self.upstream.display_host(),
                "Failed to connect to upstream"
            );
            RelayError::Connection {
                host: self.upstream.display_host().to_string(),
            }
        } else {
            tracing::error!(error_type = "internal", error_message = %error, "Upstream request failed");
            RelayError::Internal(format!("Request failed: {error}"))
        }
    }
}

/// Turn a non-success upstream response into an `Upstream` error
async fn read_upstream_error(response: reqwest::Response, deadline: Instant) -> RelayError {
    let status = response.status();

    let text = match timeout_at(deadline, response.text()).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            return RelayError::Internal(format!("Failed to read upstream error body: {e}"));
        }
        Err(_) => return RelayError::Timeout,
    };

    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|json| match json.get("error")? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| format!("upstream returned {status}: {}", excerpt(&text)));

    tracing::error!(
        error_type = "upstream",
        status = %status,
        error_message = %message,
        "Upstream returned error"
    );

    RelayError::Upstream(message)
}

fn excerpt(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().nth(ERROR_EXCERPT_LEN) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Start the producer task for a response body
fn spawn_pump<S, E>(body: S, pump: Pump, capacity: usize) -> RelayStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (end_tx, end_rx) = oneshot::channel();
    let guard = pump.cancel.clone().drop_guard();

    tokio::spawn(
        async move {
            let end = pump.run(body, tx).await;
            match &end {
                StreamEnd::Done | StreamEnd::Exhausted => {
                    tracing::debug!(state = "completed", end = ?end, "Relay stream closed")
                }
                _ => tracing::warn!(end = ?end, "Relay stream ended early"),
            }
            let _ = end_tx.send(end);
        }
        .in_current_span(),
    );

    RelayStream {
        inner: ReceiverStream::new(rx),
        completion: Some(CompletionHandle { receiver: end_rx }),
        _cancel_on_drop: guard,
    }
}

enum LineOutcome {
    Continue,
    Stop(StreamEnd),
}

/// The read-decode-forward loop of one relay invocation
struct Pump {
    mode: ForwardingMode,
    token_delay: Duration,
    cancel: CancellationToken,
}

impl Pump {
    async fn run<S, E>(self, body: S, tx: mpsc::Sender<Bytes>) -> StreamEnd
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let mut body = std::pin::pin!(body);
        let mut buffer = LineBuffer::new();
        let mut pacer = Pacer::new(self.token_delay);

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return StreamEnd::ConsumerGone,
                next = body.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    tracing::warn!(
                        error_type = "read",
                        error_message = %e,
                        "Upstream read failed mid-stream, closing output"
                    );
                    return StreamEnd::ReadFailed(e.to_string());
                }
                None => break,
            };

            tracing::trace!(bytes = chunk.len(), "Received upstream chunk");

            for line in buffer.push(&chunk) {
                if let LineOutcome::Stop(end) = self.handle_line(&line, &tx, &mut pacer).await {
                    return end;
                }
            }
        }

        if let Some(rest) = buffer.finish() {
            if let LineOutcome::Stop(end) = self.handle_line(&rest, &tx, &mut pacer).await {
                return end;
            }
        }

        StreamEnd::Exhausted
    }

    async fn handle_line(
        &self,
        line: &str,
        tx: &mpsc::Sender<Bytes>,
        pacer: &mut Pacer,
    ) -> LineOutcome {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return LineOutcome::Continue;
        }

        let record = match UpstreamRecord::parse(trimmed) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(
                    error_type = "malformed_line",
                    error_message = %e,
                    line_len = trimmed.len(),
                    "Skipping upstream line that is not valid JSON"
                );
                return LineOutcome::Continue;
            }
        };

        if let Some(error) = &record.error {
            tracing::warn!(error_type = "upstream", error_message = %error, "Upstream reported an error mid-stream");
        }

        if let Some(fragment) = record.fragment() {
            if let Err(end) = self.forward(fragment, tx, pacer).await {
                return LineOutcome::Stop(end);
            }
        }

        if record.done {
            return LineOutcome::Stop(StreamEnd::Done);
        }

        LineOutcome::Continue
    }

    async fn forward(
        &self,
        fragment: &str,
        tx: &mpsc::Sender<Bytes>,
        pacer: &mut Pacer,
    ) -> Result<(), StreamEnd> {
        match self.mode {
            ForwardingMode::Whole => {
                self.send(Bytes::copy_from_slice(fragment.as_bytes()), tx)
                    .await
            }
            ForwardingMode::Paced => {
                for token in tokenize(fragment) {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(StreamEnd::ConsumerGone),
                        _ = pacer.tick() => {}
                    }
                    self.send(Bytes::copy_from_slice(token.as_bytes()), tx)
                        .await?;
                }
                Ok(())
            }
        }
    }

    async fn send(&self, bytes: Bytes, tx: &mpsc::Sender<Bytes>) -> Result<(), StreamEnd> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(StreamEnd::ConsumerGone),
            sent = tx.send(bytes) => sent.map_err(|_| StreamEnd::ConsumerGone),
        }
    }
}
