//! Client view of one session and the pure reducer that folds updates into it.

use chrono::{DateTime, Utc};
use issuedesk_common::{
    AgentStatus, CardChange, ContextCard, Message, MessageRole, MessageStatus, Repository, Session,
    Statistics,
};

use crate::realtime::Update;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Reconnecting {
        attempt: u32,
    },
    /// Reconnection exhausted; nothing further happens automatically
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub session_id: Option<String>,
    pub repository: Option<Repository>,
    pub title: Option<String>,
    pub embedded_files: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub messages: Vec<Message>,
    pub context_cards: Vec<ContextCard>,
    pub agent_status: AgentStatus,
    pub statistics: Statistics,
    pub connection: ConnectionStatus,
    pub last_error: Option<String>,
}

impl SessionState {
    pub fn loaded(session: Session, messages: Vec<Message>, cards: Vec<ContextCard>) -> Self {
        reduce(
            Self::default(),
            Action::Load {
                session,
                messages,
                cards,
            },
        )
    }

    pub fn pending_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|m| m.status == MessageStatus::Sending)
    }

    pub fn card_tokens(&self) -> u64 {
        self.context_cards.iter().map(|c| c.token_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Collapsed update from the realtime channel, or a REST confirmation
    Remote(Update),
    /// Optimistic local message, shown before the server answers
    SendMessage {
        content: String,
        client_id: String,
        at: DateTime<Utc>,
    },
    MessageFailed {
        client_id: String,
    },
    Connection(ConnectionStatus),
    Error(String),
    Load {
        session: Session,
        messages: Vec<Message>,
        cards: Vec<ContextCard>,
    },
}

/// Temporary id for an optimistic message.
pub fn temp_message_id(at: DateTime<Utc>) -> String {
    format!("temp-{}", at.timestamp_millis())
}

/// Fold one action into the state. Pure: the previous state is consumed and
/// the next one returned.
pub fn reduce(mut state: SessionState, action: Action) -> SessionState {
    match action {
        Action::Remote(update) => apply_update(&mut state, update),
        Action::SendMessage {
            content,
            client_id,
            at,
        } => {
            state.messages.push(Message {
                id: temp_message_id(at),
                session_id: state.session_id.clone().unwrap_or_default(),
                role: MessageRole::User,
                content,
                is_code: false,
                token_count: 0,
                timestamp: at,
                status: MessageStatus::Sending,
                client_id: Some(client_id),
            });
        }
        Action::MessageFailed { client_id } => {
            if let Some(msg) = find_optimistic(&mut state.messages, &client_id) {
                msg.status = MessageStatus::Failed;
            }
        }
        Action::Connection(status) => {
            if status == ConnectionStatus::Connected {
                state.last_error = None;
            }
            state.connection = status;
        }
        Action::Error(message) => state.last_error = Some(message),
        Action::Load {
            session,
            messages,
            cards,
        } => {
            let connection = state.connection;
            state = SessionState {
                session_id: Some(session.id),
                repository: Some(session.repository),
                title: session.title,
                embedded_files: session.embedded_files,
                updated_at: Some(session.updated_at),
                messages,
                context_cards: Vec::new(),
                agent_status: AgentStatus::default(),
                statistics: session.statistics,
                connection,
                last_error: None,
            };
            merge_cards(&mut state.context_cards, cards);
        }
    }
    state
}

fn apply_update(state: &mut SessionState, update: Update) {
    match update {
        Update::Session(patch) => {
            if let Some(title) = patch.title {
                state.title = Some(title);
            }
            if let Some(repository) = patch.repository {
                state.repository = Some(repository);
            }
            if let Some(files) = patch.embedded_files {
                state.embedded_files = files;
            }
            if let Some(statistics) = patch.statistics {
                state.statistics.apply(&statistics);
            }
            if let Some(updated_at) = patch.updated_at {
                state.updated_at = Some(updated_at);
            }
        }
        Update::Message(msg) => {
            if let Some(client_id) = msg.client_id.clone() {
                if let Some(slot) = find_optimistic(&mut state.messages, &client_id) {
                    *slot = Message {
                        status: MessageStatus::Sent,
                        ..msg
                    };
                    return;
                }
            }
            if !state.messages.iter().any(|m| m.id == msg.id) {
                state.messages.push(msg);
            }
        }
        Update::ContextCard(CardChange::Batch { cards }) => {
            merge_cards(&mut state.context_cards, cards);
        }
        Update::ContextCard(CardChange::Add { card }) => {
            merge_cards(&mut state.context_cards, vec![card]);
        }
        Update::ContextCard(CardChange::Remove { card_id }) => {
            state.context_cards.retain(|c| c.id != card_id);
        }
        Update::AgentStatus(patch) => state.agent_status.apply(&patch),
        Update::Statistics(patch) => state.statistics.apply(&patch),
    }
}

fn find_optimistic<'a>(messages: &'a mut [Message], client_id: &str) -> Option<&'a mut Message> {
    messages.iter_mut().find(|m| {
        m.status != MessageStatus::Sent && m.client_id.as_deref() == Some(client_id)
    })
}

/// Append cards whose id is not already present (including earlier cards
/// of the same batch).
fn merge_cards(existing: &mut Vec<ContextCard>, incoming: Vec<ContextCard>) {
    for card in incoming {
        if !existing.iter().any(|c| c.id == card.id) {
            existing.push(card);
        }
    }
}
