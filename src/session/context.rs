//! Owned session actor.
//!
//! A [`SessionContext`] is created explicitly with `open` (or `spawn` when the
//! caller already holds the parts) and torn down with `shutdown`. Remote
//! updates are debounced through a [`Coalescer`]; local actions skip the
//! window so optimistic messages show up before any network round-trip.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use issuedesk_common::Message;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::coalesce::Coalescer;
use super::state::{Action, ConnectionStatus, SessionState, reduce};
use crate::api::ApiClient;
use crate::config::IssuedeskConfig;
use crate::errors::ClientError;
use crate::realtime::{RealTimeManager, RealtimeEvent, Update, session_ws_url};

/// Where chat messages are posted. Implemented by [`ApiClient`].
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn post_message(
        &self,
        session_id: &str,
        content: &str,
        client_id: &str,
    ) -> Result<Message, ClientError>;
}

enum ContextCommand {
    Apply {
        action: Action,
        ack: oneshot::Sender<()>,
    },
    Shutdown,
}

pub struct SessionContext {
    session_id: String,
    backend: Arc<dyn ChatBackend>,
    commands: mpsc::UnboundedSender<ContextCommand>,
    state: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

impl SessionContext {
    /// Load the session over REST, then attach the realtime channel.
    pub async fn open(
        api: ApiClient,
        config: &IssuedeskConfig,
        session_id: &str,
        token: &str,
    ) -> Result<Self, ClientError> {
        let session = api.get_session(session_id).await?;
        let messages = api.list_messages(session_id).await?;
        let cards = api.list_context_cards(session_id).await?;
        let url = session_ws_url(&config.server.ws_base(), session_id, token)
            .map_err(ClientError::InvalidUrl)?;

        info!(session = %session_id, messages = messages.len(), cards = cards.len(), "Session loaded");
        let (manager, events) = RealTimeManager::connect(url, &config.realtime);
        Ok(Self::spawn(
            SessionState::loaded(session, messages, cards),
            Arc::new(api),
            events,
            Some(manager),
            config.realtime.debounce(),
        ))
    }

    /// Start the actor over an existing event source.
    pub fn spawn(
        initial: SessionState,
        backend: Arc<dyn ChatBackend>,
        events: mpsc::Receiver<RealtimeEvent>,
        manager: Option<RealTimeManager>,
        debounce: Duration,
    ) -> Self {
        let session_id = initial.session_id.clone().unwrap_or_default();
        let (state_tx, state_rx) = watch::channel(initial.clone());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let actor = Actor {
            state: initial,
            pending: Coalescer::new(debounce),
            state_tx,
            commands: command_rx,
            events,
            manager,
        };
        let task = tokio::spawn(actor.run());

        Self {
            session_id,
            backend,
            commands: command_tx,
            state: state_rx,
            task: Some(task),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Show the message immediately, then post it. On failure the entry
    /// stays visible with a failed status.
    pub async fn send_message(&self, content: &str) -> Result<Message, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::InvalidInput("message is empty".into()));
        }

        let client_id = Uuid::new_v4().to_string();
        self.dispatch(Action::SendMessage {
            content: content.to_string(),
            client_id: client_id.clone(),
            at: Utc::now(),
        })
        .await?;

        match self
            .backend
            .post_message(&self.session_id, content, &client_id)
            .await
        {
            Ok(mut message) => {
                message.client_id.get_or_insert(client_id);
                self.dispatch(Action::Remote(Update::Message(message.clone())))
                    .await?;
                Ok(message)
            }
            Err(e) => {
                warn!(error = %e, "Message send failed");
                let _ = self.dispatch(Action::MessageFailed { client_id }).await;
                Err(e)
            }
        }
    }

    /// Disconnect the socket and stop the actor.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(ContextCommand::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn dispatch(&self, action: Action) -> Result<(), ClientError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(ContextCommand::Apply { action, ack })
            .map_err(|_| ClientError::ContextClosed)?;
        done.await.map_err(|_| ClientError::ContextClosed)
    }
}

struct Actor {
    state: SessionState,
    pending: Coalescer<Action>,
    state_tx: watch::Sender<SessionState>,
    commands: mpsc::UnboundedReceiver<ContextCommand>,
    events: mpsc::Receiver<RealtimeEvent>,
    manager: Option<RealTimeManager>,
}

impl Actor {
    async fn run(mut self) {
        let mut events_open = true;
        loop {
            let deadline = self.pending.deadline();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ContextCommand::Apply { action, ack }) => {
                        self.flush();
                        self.apply(action);
                        self.publish();
                        let _ = ack.send(());
                    }
                    Some(ContextCommand::Shutdown) | None => break,
                },
                event = self.events.recv(), if events_open => match event {
                    Some(event) => self.on_event(event),
                    None => {
                        debug!("Realtime event stream ended");
                        events_open = false;
                    }
                },
                _ = until(deadline) => {
                    self.flush();
                    self.publish();
                }
            }
        }

        self.flush();
        self.publish();
        self.events.close();
        if let Some(manager) = self.manager.take() {
            manager.disconnect().await;
        }
        debug!("Session context stopped");
    }

    fn on_event(&mut self, event: RealtimeEvent) {
        let action = match event {
            RealtimeEvent::Updates(updates) => {
                self.pending
                    .extend(updates.into_iter().map(Action::Remote), Instant::now());
                return;
            }
            RealtimeEvent::Connected => Action::Connection(ConnectionStatus::Connected),
            RealtimeEvent::Disconnected { .. } => {
                Action::Connection(ConnectionStatus::Disconnected)
            }
            RealtimeEvent::Reconnecting { attempt, .. } => {
                Action::Connection(ConnectionStatus::Reconnecting { attempt })
            }
            RealtimeEvent::Error(e) => Action::Error(e.to_string()),
            RealtimeEvent::Terminal(e) => {
                self.flush();
                self.apply(Action::Connection(ConnectionStatus::Failed));
                Action::Error(e.to_string())
            }
        };
        self.flush();
        self.apply(action);
        self.publish();
    }

    fn flush(&mut self) {
        for action in self.pending.take() {
            self.apply(action);
        }
    }

    fn apply(&mut self, action: Action) {
        self.state = reduce(std::mem::take(&mut self.state), action);
    }

    fn publish(&self) {
        if *self.state_tx.borrow() != self.state {
            self.state_tx.send_replace(self.state.clone());
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
