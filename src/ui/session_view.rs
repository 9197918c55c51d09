use std::collections::HashSet;

use console::style;
use issuedesk_common::{AgentState, AgentStatus, ContextCard, Message, MessageRole, MessageStatus};

use super::icons::{AGENT, CARD, CHAT, CROSS, PLUG, RECONNECT, WARN};
use super::truncate;
use crate::session::{ConnectionStatus, SessionState};

/// Turns successive session snapshots into the lines worth printing.
///
/// Messages print once, when the server confirms them (or when a send
/// fails). Connection and agent changes print only on transitions.
#[derive(Debug, Default)]
pub struct SessionPrinter {
    printed: HashSet<String>,
    connection: Option<ConnectionStatus>,
    agent: Option<AgentState>,
    error: Option<String>,
}

impl SessionPrinter {
    /// Start with everything in `state` considered already shown.
    pub fn primed(state: &SessionState) -> Self {
        Self {
            printed: state.messages.iter().map(|m| m.id.clone()).collect(),
            connection: Some(state.connection),
            agent: Some(state.agent_status.state),
            error: state.last_error.clone(),
        }
    }

    pub fn diff(&mut self, state: &SessionState) -> Vec<String> {
        let mut lines = Vec::new();

        if self.connection != Some(state.connection) {
            self.connection = Some(state.connection);
            lines.push(connection_line(state.connection));
        }
        if state.last_error != self.error {
            self.error = state.last_error.clone();
            if let Some(err) = &state.last_error {
                lines.push(format!("{}{}", WARN, style(err).yellow()));
            }
        }
        for msg in &state.messages {
            if msg.status == MessageStatus::Sending || self.printed.contains(&msg.id) {
                continue;
            }
            self.printed.insert(msg.id.clone());
            lines.push(message_line(msg));
        }
        if self.agent != Some(state.agent_status.state) {
            self.agent = Some(state.agent_status.state);
            if state.agent_status.state != AgentState::Idle {
                lines.push(agent_line(&state.agent_status));
            }
        }
        lines
    }
}

pub fn connection_line(status: ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connecting => format!("{}{}", PLUG, style("connecting...").dim()),
        ConnectionStatus::Connected => format!("{}{}", PLUG, style("connected").green()),
        ConnectionStatus::Disconnected => format!("{}{}", PLUG, style("disconnected").yellow()),
        ConnectionStatus::Reconnecting { attempt } => format!(
            "{}{}",
            RECONNECT,
            style(format!("reconnecting (attempt {})", attempt)).yellow()
        ),
        ConnectionStatus::Failed => format!(
            "{}{}",
            CROSS,
            style("connection lost; restart to retry").red()
        ),
    }
}

pub fn message_line(msg: &Message) -> String {
    let who = match msg.role {
        MessageRole::User => style("you").cyan().bold(),
        MessageRole::Assistant => style("assistant").magenta().bold(),
        MessageRole::System => style("system").dim().bold(),
    };
    let body = if msg.is_code {
        format!("\n{}", style(&msg.content).dim())
    } else {
        msg.content.clone()
    };
    let mut line = format!("{}{}: {}", CHAT, who, body);
    if msg.status == MessageStatus::Failed {
        line.push_str(&format!(" {}", style("(failed to send)").red()));
    }
    line
}

pub fn agent_line(status: &AgentStatus) -> String {
    let state = match status.state {
        AgentState::Idle => style("idle").dim(),
        AgentState::Thinking => style("thinking").yellow(),
        AgentState::Generating => style("generating").cyan(),
        AgentState::Error => style("error").red(),
    };
    let mut line = format!("{}{}", AGENT, state);
    if let Some(detail) = &status.detail {
        line.push_str(&format!(" {}", style(detail).dim()));
    }
    if let Some(progress) = status.progress {
        line.push_str(&format!(" {:.0}%", progress * 100.0));
    }
    line
}

pub fn card_line(card: &ContextCard) -> String {
    let mut line = format!(
        "{}{} {} {}",
        CARD,
        style(&card.id).dim(),
        style(&card.title).bold(),
        style(format!("[{}, {} tokens]", card.source.as_str(), card.token_count)).dim(),
    );
    if !card.description.is_empty() {
        line.push_str(&format!("\n     {}", truncate(&card.description, 100)));
    }
    line
}
