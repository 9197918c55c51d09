//! Single-run trajectory streaming over SSE.
//!
//! Lifecycle: `Idle -> Connecting -> Streaming -> Completed | Error`. There
//! is no automatic reconnect; a transport failure or a server `error` event
//! is final.

use std::future::Future;

use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use issuedesk_common::{RunStatus, TrajectoryEntry, TrajectoryEvent, TrajectoryInfo};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::api::ApiClient;
use crate::errors::StreamError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamPhase {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Completed,
    Error,
}

impl StreamPhase {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectorySnapshot {
    pub phase: StreamPhase,
    pub messages: Vec<TrajectoryEntry>,
    /// Count reported by the most recent `trajectory_update`
    pub message_count: usize,
    pub info: TrajectoryInfo,
    pub status: Option<RunStatus>,
    pub error: Option<String>,
}

/// Fold one decoded event into the snapshot. Returns `true` when the
/// channel should be closed.
pub fn apply_event(snapshot: &mut TrajectorySnapshot, event: TrajectoryEvent) -> bool {
    match event {
        TrajectoryEvent::Update(update) => {
            snapshot.messages.extend(update.messages);
            snapshot.message_count = update.message_count;
            if let Some(info) = update.info {
                snapshot.info.apply(&info);
            }
            snapshot.phase = StreamPhase::Streaming;
            false
        }
        TrajectoryEvent::Status(status) => {
            snapshot.status = Some(status.status);
            if status.status.is_terminal() {
                snapshot.phase = StreamPhase::Completed;
                return true;
            }
            false
        }
        TrajectoryEvent::Error(err) => {
            snapshot.phase = StreamPhase::Error;
            snapshot.error = Some(StreamError::Server(err.message).to_string());
            true
        }
        TrajectoryEvent::Done => {
            snapshot.phase = StreamPhase::Completed;
            true
        }
        TrajectoryEvent::Heartbeat => false,
    }
}

/// Handle to a running trajectory stream. Dropping it closes the channel.
pub struct TrajectoryStream {
    cancel: CancellationToken,
    snapshot: watch::Receiver<TrajectorySnapshot>,
    task: Option<JoinHandle<()>>,
}

impl TrajectoryStream {
    pub fn open(api: ApiClient, solve_id: &str, run_id: &str) -> Self {
        let solve_id = solve_id.to_string();
        let run_id = run_id.to_string();
        Self::spawn(async move {
            let response = api.open_trajectory_stream(&solve_id, &run_id).await?;
            Ok(response.bytes_stream())
        })
    }

    /// Run the state machine over any byte-chunk source.
    pub fn spawn<C, S, B, E>(connect: C) -> Self
    where
        C: Future<Output = Result<S, StreamError>> + Send + 'static,
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Into<StreamError> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(TrajectorySnapshot::default());
        let task = tokio::spawn(run(connect, tx, cancel.clone()));
        Self {
            cancel,
            snapshot: rx,
            task: Some(task),
        }
    }

    pub fn snapshot(&self) -> TrajectorySnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrajectorySnapshot> {
        self.snapshot.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the stream to close and return its final state.
    pub async fn finished(mut self) -> TrajectorySnapshot {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.snapshot()
    }
}

impl Drop for TrajectoryStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<C, S, B, E>(connect: C, tx: watch::Sender<TrajectorySnapshot>, cancel: CancellationToken)
where
    C: Future<Output = Result<S, StreamError>>,
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<StreamError>,
{
    tx.send_modify(|s| s.phase = StreamPhase::Connecting);

    let source = tokio::select! {
        _ = cancel.cancelled() => return,
        result = connect => result,
    };
    let source = match source {
        Ok(source) => source,
        Err(e) => {
            warn!(error = %e, "Trajectory stream failed to open");
            fail(&tx, e);
            return;
        }
    };
    tx.send_modify(|s| s.phase = StreamPhase::Streaming);
    debug!("Trajectory stream open");

    let events = source.map(|chunk| chunk.map_err(Into::<StreamError>::into)).eventsource();
    tokio::pin!(events);
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Trajectory stream cancelled");
                return;
            }
            next = events.next() => next,
        };
        match next {
            Some(Ok(raw)) => {
                let event = match TrajectoryEvent::decode(&raw.event, &raw.data) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(event = %raw.event, error = %e, "Skipping malformed trajectory event");
                        continue;
                    }
                };
                trace!(event = %raw.event, "Trajectory event");
                let mut close = false;
                tx.send_modify(|s| close = apply_event(s, event));
                if close {
                    let phase = tx.borrow().phase;
                    info!(phase = phase.as_str(), "Trajectory stream closed");
                    return;
                }
            }
            Some(Err(e)) => {
                let err = match e {
                    EventStreamError::Transport(err) => err,
                    framing => StreamError::Framing(framing.to_string()),
                };
                warn!(error = %err, "Trajectory stream transport error");
                fail(&tx, err);
                return;
            }
            None => {
                fail(&tx, StreamError::UnexpectedEof);
                return;
            }
        }
    }
}

fn fail(tx: &watch::Sender<TrajectorySnapshot>, err: StreamError) {
    tx.send_modify(|s| {
        s.phase = StreamPhase::Error;
        s.error = Some(err.to_string());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use issuedesk_common::{RunStatusEvent, ServerError, TrajectoryUpdate};

    fn entry(content: &str) -> TrajectoryEntry {
        TrajectoryEntry {
            role: "assistant".into(),
            content: content.into(),
        }
    }

    fn update(contents: &[&str], count: usize) -> TrajectoryEvent {
        TrajectoryEvent::Update(TrajectoryUpdate {
            messages: contents.iter().map(|c| entry(c)).collect(),
            message_count: count,
            info: None,
        })
    }

    fn chunks(parts: Vec<&'static str>) -> impl Stream<Item = Result<&'static [u8], StreamError>> {
        stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes())))
    }

    #[test]
    fn test_updates_concatenate_in_arrival_order() {
        let mut snap = TrajectorySnapshot::default();
        assert!(!apply_event(&mut snap, update(&["a", "b"], 2)));
        assert!(!apply_event(&mut snap, update(&["c"], 3)));
        let contents: Vec<_> = snap.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
        assert_eq!(snap.message_count, 3);
        assert_eq!(snap.phase, StreamPhase::Streaming);
    }

    #[test]
    fn test_terminal_status_closes_but_running_does_not() {
        let mut snap = TrajectorySnapshot::default();
        let running = TrajectoryEvent::Status(RunStatusEvent {
            status: RunStatus::Running,
            message: None,
        });
        assert!(!apply_event(&mut snap, running));
        let completed = TrajectoryEvent::Status(RunStatusEvent {
            status: RunStatus::Completed,
            message: None,
        });
        assert!(apply_event(&mut snap, completed));
        assert_eq!(snap.phase, StreamPhase::Completed);
        assert_eq!(snap.status, Some(RunStatus::Completed));
    }

    #[test]
    fn test_heartbeat_changes_nothing() {
        let mut snap = TrajectorySnapshot::default();
        apply_event(&mut snap, update(&["a"], 1));
        let before = snap.clone();
        assert!(!apply_event(&mut snap, TrajectoryEvent::Heartbeat));
        assert_eq!(snap, before);
    }

    #[test]
    fn test_server_error_event_is_final() {
        let mut snap = TrajectorySnapshot::default();
        let closed = apply_event(
            &mut snap,
            TrajectoryEvent::Error(ServerError {
                message: "run crashed".into(),
                code: None,
            }),
        );
        assert!(closed);
        assert_eq!(snap.phase, StreamPhase::Error);
        assert!(snap.error.unwrap().contains("run crashed"));
    }

    #[tokio::test]
    async fn test_stream_skips_malformed_and_completes_on_done() {
        let source = chunks(vec![
            "event: trajectory_update\ndata: {\"messages\":[{\"role\":\"user\",\"content\":\"fix it\"}],\"message_count\":1}\n\n",
            "event: trajectory_update\ndata: {not json}\n\n",
            ": ping\n\nevent: heartbeat\ndata: {}\n\n",
            "event: trajectory_update\ndata: {\"messages\":[{\"role\":\"assistant\",\"content\":\"ok\"}],\"message_count\":2}\n\n",
            "event: done\ndata: {}\n\n",
            "event: trajectory_update\ndata: {\"messages\":[{\"role\":\"assistant\",\"content\":\"late\"}],\"message_count\":3}\n\n",
        ]);
        let stream = TrajectoryStream::spawn(async move { Ok(source) });
        let snap = stream.finished().await;

        assert_eq!(snap.phase, StreamPhase::Completed);
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.message_count, 2);
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let source = chunks(vec![
            ": keep-alive\r\nevent: trajectory_up",
            "date\r\ndata: {\"messages\":[{\"role\":\"assistant\",\"content\":\"",
            "héllo\"}],\"message_count\":1}\r\n\r\nevent: status\ndata: {\"status\":\"failed\"}\n",
            "\n",
        ]);
        let snap = TrajectoryStream::spawn(async move { Ok(source) }).finished().await;
        assert_eq!(snap.phase, StreamPhase::Completed);
        assert_eq!(snap.status, Some(RunStatus::Failed));
        assert_eq!(snap.messages[0].content, "héllo");
    }

    #[tokio::test]
    async fn test_transport_error_sets_error_without_retry() {
        let source = stream::iter(vec![
            Ok("event: trajectory_update\ndata: {\"messages\":[],\"message_count\":0}\n\n".as_bytes()),
            Err(StreamError::Server("connection reset".into())),
        ]);
        let stream = TrajectoryStream::spawn(async move { Ok(source) });
        let snap = stream.finished().await;
        assert_eq!(snap.phase, StreamPhase::Error);
        assert!(snap.error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_eof_before_done_is_an_error() {
        let source = chunks(vec![
            "event: trajectory_update\ndata: {\"messages\":[],\"message_count\":0}\n\n",
        ]);
        let snap = TrajectoryStream::spawn(async move { Ok(source) }).finished().await;
        assert_eq!(snap.phase, StreamPhase::Error);
    }

    #[tokio::test]
    async fn test_open_failure_sets_error() {
        let stream = TrajectoryStream::spawn(async {
            Err::<stream::Empty<Result<&'static [u8], StreamError>>, _>(StreamError::Client(
                crate::errors::ClientError::Unauthorized,
            ))
        });
        let snap = stream.finished().await;
        assert_eq!(snap.phase, StreamPhase::Error);
        assert!(snap.error.unwrap().contains("login"));
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_stream() {
        let stream = TrajectoryStream::spawn(async {
            Ok(stream::pending::<Result<&'static [u8], StreamError>>())
        });
        let mut rx = stream.subscribe();
        rx.wait_for(|s| s.phase == StreamPhase::Streaming).await.unwrap();
        stream.cancel();
        let snap = stream.finished().await;
        assert_eq!(snap.phase, StreamPhase::Streaming);
    }
}
