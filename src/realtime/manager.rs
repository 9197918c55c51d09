//! Session WebSocket client with reconnection, heartbeat and batching.
//!
//! One [`RealTimeManager`] owns at most one live socket. It runs as a
//! spawned task; callers talk to it through [`RealTimeManager::send`] and
//! read [`RealtimeEvent`]s from the receiver returned by `connect`.
//!
//! ```text
//! frames ─> decode ─> heartbeat/error consumed
//!                  └> UpdateFilter (dup / stale) ─> pending
//!                                                    │ drained frames
//!                                                    v
//!                               collapse() ─> RealtimeEvent::Updates
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use futures::FutureExt;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use issuedesk_common::{InboundUpdate, OutboundEnvelope, UpdateKind, UpdatePayload};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::backoff::{Backoff, ReconnectPolicy};
use super::batch::{Update, collapse};
use super::filter::{UpdateFilter, Verdict};
use crate::config::RealtimeConfig;
use crate::errors::RealtimeError;

/// Upper bound on a single connection handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Frame>;

/// Build `{ws_base}/sessions/{id}/ws?token=...`; the id is path-encoded and
/// the token query-encoded.
pub fn session_ws_url(ws_base: &str, session_id: &str, token: &str) -> Result<String, String> {
    let mut url = reqwest::Url::parse(ws_base).map_err(|e| format!("{}: {}", ws_base, e))?;
    url.path_segments_mut()
        .map_err(|_| format!("{}: not a base URL", ws_base))?
        .pop_if_empty()
        .extend(["sessions", session_id, "ws"]);
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.to_string())
}

/// What the manager reports to its owner.
#[derive(Debug)]
pub enum RealtimeEvent {
    Connected,
    Disconnected { reason: Option<String> },
    Reconnecting { attempt: u32, delay: Duration },
    Updates(Vec<Update>),
    /// Recoverable failure; the manager keeps going
    Error(RealtimeError),
    /// The manager has stopped and will not reconnect
    Terminal(RealtimeError),
}

enum Command {
    Send(OutboundEnvelope),
}

enum SessionEnd {
    Closed(Option<String>),
    Cancelled,
}

pub struct RealTimeManager {
    commands: mpsc::UnboundedSender<Command>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RealTimeManager {
    /// Spawn the connection task. Must be called inside a tokio runtime.
    pub fn connect(
        url: impl Into<String>,
        config: &RealtimeConfig,
    ) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let cancel = CancellationToken::new();

        let worker = Worker {
            url: url.into(),
            policy: ReconnectPolicy::from_config(config),
            heartbeat: config.heartbeat(),
            filter: UpdateFilter::new(config.dedup_window()),
            queue: VecDeque::new(),
            commands: command_rx,
            events: event_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        (
            Self {
                commands: command_tx,
                cancel,
                task: Some(task),
            },
            event_rx,
        )
    }

    /// Queue a frame. Sent immediately when connected, otherwise on the next
    /// successful open. Returns the frame id.
    pub fn send(&self, kind: UpdateKind, data: serde_json::Value) -> Result<String, RealtimeError> {
        let envelope = OutboundEnvelope::new(kind, data);
        let id = envelope.id.clone();
        self.commands
            .send(Command::Send(envelope))
            .map_err(|_| RealtimeError::Closed)?;
        Ok(id)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Close the socket and stop all timers. No reconnection follows.
    pub async fn disconnect(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for RealTimeManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    url: String,
    policy: ReconnectPolicy,
    heartbeat: Duration,
    filter: UpdateFilter,
    queue: VecDeque<OutboundEnvelope>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<RealtimeEvent>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        let mut backoff = Backoff::new(self.policy);
        loop {
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str())) => result,
            };

            match outcome {
                Ok(Ok((socket, _response))) => {
                    backoff.reset();
                    info!(url = %redact(&self.url), "Realtime connection open");
                    self.emit(RealtimeEvent::Connected).await;
                    match self.drive(socket).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Closed(reason) => {
                            info!(reason = ?reason, "Realtime connection closed");
                            self.emit(RealtimeEvent::Disconnected { reason }).await;
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Realtime connect failed");
                    self.emit(RealtimeEvent::Error(RealtimeError::Connect {
                        url: redact(&self.url),
                        source: Box::new(e),
                    }))
                    .await;
                }
                Err(_elapsed) => {
                    warn!(timeout = ?CONNECT_TIMEOUT, "Realtime connect timed out");
                    self.emit(RealtimeEvent::Error(RealtimeError::Connect {
                        url: redact(&self.url),
                        source: Box::new(tokio_tungstenite::tungstenite::Error::Io(
                            std::io::Error::new(std::io::ErrorKind::TimedOut, "handshake timed out"),
                        )),
                    }))
                    .await;
                }
            }

            let Some((attempt, delay)) = backoff.next_delay() else {
                warn!(attempts = self.policy.max_attempts, "Realtime reconnection exhausted");
                self.emit(RealtimeEvent::Terminal(RealtimeError::ReconnectExhausted {
                    attempts: self.policy.max_attempts,
                }))
                .await;
                break;
            };
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
            self.emit(RealtimeEvent::Reconnecting { attempt, delay }).await;
            if !self.wait(delay).await {
                break;
            }
        }
        debug!("Realtime manager stopped");
    }

    /// Sleep out a reconnect delay while still accepting sends.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::Send(envelope)) => self.queue.push_back(envelope),
                    None => return false,
                },
            }
        }
    }

    async fn drive(&mut self, socket: Socket) -> SessionEnd {
        let (mut sink, mut source) = socket.split();

        while let Some(envelope) = self.queue.pop_front() {
            if let Err(e) = send_envelope(&mut sink, &envelope).await {
                self.queue.push_front(envelope);
                return SessionEnd::Closed(Some(e.to_string()));
            }
        }

        let mut heartbeat = heartbeat_interval(self.heartbeat);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = sink.send(Frame::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                _ = tick(&mut heartbeat) => {
                    let envelope = OutboundEnvelope::heartbeat();
                    if let Err(e) = send_envelope(&mut sink, &envelope).await {
                        return SessionEnd::Closed(Some(e.to_string()));
                    }
                    trace!("Heartbeat sent");
                }
                command = self.commands.recv() => match command {
                    Some(Command::Send(envelope)) => {
                        if let Err(e) = send_envelope(&mut sink, &envelope).await {
                            warn!(id = %envelope.id, error = %e, "Send failed; re-queued");
                            self.queue.push_front(envelope);
                            return SessionEnd::Closed(Some(e.to_string()));
                        }
                    }
                    None => {
                        let _ = sink.send(Frame::Close(None)).await;
                        return SessionEnd::Cancelled;
                    }
                },
                frame = source.next() => {
                    let mut pending = Vec::new();
                    let mut end = self.ingest(frame, &mut pending);
                    // Drain whatever is already buffered so one burst becomes one batch.
                    while end.is_none() {
                        match source.next().now_or_never() {
                            Some(frame) => end = self.ingest(frame, &mut pending),
                            None => break,
                        }
                    }
                    self.flush(pending).await;
                    if let Some(end) = end {
                        return end;
                    }
                }
            }
        }
    }

    fn ingest(
        &mut self,
        frame: Option<Result<Frame, tokio_tungstenite::tungstenite::Error>>,
        pending: &mut Vec<InboundUpdate>,
    ) -> Option<SessionEnd> {
        match frame {
            None => Some(SessionEnd::Closed(None)),
            Some(Err(e)) => Some(SessionEnd::Closed(Some(e.to_string()))),
            Some(Ok(Frame::Close(close))) => {
                Some(SessionEnd::Closed(close.map(|c| c.reason.as_str().to_string())))
            }
            Some(Ok(Frame::Text(text))) => {
                self.accept(text.as_str(), pending);
                None
            }
            Some(Ok(Frame::Binary(bytes))) => {
                match std::str::from_utf8(&bytes) {
                    Ok(text) => self.accept(text, pending),
                    Err(_) => warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                }
                None
            }
            Some(Ok(_)) => None,
        }
    }

    fn accept(&mut self, text: &str, pending: &mut Vec<InboundUpdate>) {
        let update = match InboundUpdate::decode(text) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "Dropping malformed realtime frame");
                return;
            }
        };

        match &update.payload {
            UpdatePayload::Heartbeat => {
                trace!("Heartbeat received");
                return;
            }
            UpdatePayload::Error(err) => {
                warn!(message = %err.message, code = ?err.code, "Server reported an error");
                return;
            }
            _ => {}
        }

        match self.filter.check(&update, Instant::now()) {
            Verdict::Accept => pending.push(update),
            Verdict::Duplicate => debug!(id = %update.update_id(), "Duplicate update suppressed"),
            Verdict::Stale => debug!(id = %update.update_id(), "Stale update suppressed"),
        }
    }

    async fn flush(&mut self, pending: Vec<InboundUpdate>) {
        if pending.is_empty() {
            return;
        }
        let received = pending.len();
        let updates = collapse(pending);
        trace!(received, forwarded = updates.len(), "Flushing update batch");
        if !updates.is_empty() {
            self.emit(RealtimeEvent::Updates(updates)).await;
        }
    }

    /// Deliver an event, giving up once the manager is cancelled so a full
    /// channel can never block `disconnect`.
    async fn emit(&self, event: RealtimeEvent) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => trace!("Realtime event dropped; manager cancelled"),
            sent = self.events.send(event) => {
                if sent.is_err() {
                    trace!("Realtime event dropped; receiver gone");
                }
            }
        }
    }
}

async fn send_envelope(
    sink: &mut SocketSink,
    envelope: &OutboundEnvelope,
) -> Result<(), RealtimeError> {
    let json = serde_json::to_string(envelope).map_err(RealtimeError::Encode)?;
    sink.send(Frame::Text(json.into()))
        .await
        .map_err(|e| RealtimeError::Transport(Box::new(e)))
}

fn heartbeat_interval(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Strip the query string so tokens never reach the logs.
fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?token=***", base),
        None => url.to_string(),
    }
}
