use std::collections::HashMap;

use issuedesk_common::{
    AgentStatusPatch, CardChange, ContextCard, InboundUpdate, Message, SessionPatch,
    StatisticsPatch, UpdateKind, UpdatePayload,
};

/// A collapsed update, ready for the session reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Session(SessionPatch),
    Message(Message),
    ContextCard(CardChange),
    AgentStatus(AgentStatusPatch),
    Statistics(StatisticsPatch),
}

impl Update {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::Session(_) => UpdateKind::SessionUpdate,
            Self::Message(_) => UpdateKind::Message,
            Self::ContextCard(_) => UpdateKind::ContextCard,
            Self::AgentStatus(_) => UpdateKind::AgentStatus,
            Self::Statistics(_) => UpdateKind::Statistics,
        }
    }
}

/// Collapse one flush cycle of accepted updates.
///
/// Kinds are emitted in order of first appearance. Within a kind:
/// `MESSAGE` and `AGENT_STATUS` keep the last, `SESSION_UPDATE` keeps the
/// highest timestamp, `STATISTICS` shallow-merges, and `CONTEXT_CARD`
/// folds adds into one batch (a removal closes the current batch).
/// Heartbeats and errors never survive.
pub fn collapse(batch: Vec<InboundUpdate>) -> Vec<Update> {
    let mut order: Vec<UpdateKind> = Vec::new();
    let mut groups: HashMap<UpdateKind, Vec<InboundUpdate>> = HashMap::new();
    for update in batch {
        let kind = update.kind();
        if matches!(kind, UpdateKind::Heartbeat | UpdateKind::Error) {
            continue;
        }
        if !groups.contains_key(&kind) {
            order.push(kind);
        }
        groups.entry(kind).or_default().push(update);
    }

    let mut out = Vec::new();
    for kind in order {
        let Some(group) = groups.remove(&kind) else {
            continue;
        };
        match kind {
            UpdateKind::Message => {
                if let Some(UpdatePayload::Message(msg)) = group.into_iter().last().map(|u| u.payload) {
                    out.push(Update::Message(msg));
                }
            }
            UpdateKind::SessionUpdate => {
                let newest = group
                    .into_iter()
                    .max_by_key(|u| u.timestamp)
                    .map(|u| u.payload);
                if let Some(UpdatePayload::SessionUpdate(patch)) = newest {
                    out.push(Update::Session(patch));
                }
            }
            UpdateKind::AgentStatus => {
                if let Some(UpdatePayload::AgentStatus(status)) =
                    group.into_iter().last().map(|u| u.payload)
                {
                    out.push(Update::AgentStatus(status));
                }
            }
            UpdateKind::Statistics => {
                let mut merged = StatisticsPatch::default();
                for update in group {
                    if let UpdatePayload::Statistics(patch) = update.payload {
                        merged.merge(patch);
                    }
                }
                out.push(Update::Statistics(merged));
            }
            UpdateKind::ContextCard => out.extend(fold_cards(group)),
            UpdateKind::Heartbeat | UpdateKind::Error => {}
        }
    }
    out
}

fn fold_cards(group: Vec<InboundUpdate>) -> Vec<Update> {
    let mut out = Vec::new();
    let mut pending: Vec<ContextCard> = Vec::new();
    for update in group {
        let UpdatePayload::ContextCard(change) = update.payload else {
            continue;
        };
        match change {
            CardChange::Add { card } => pending.push(card),
            CardChange::Batch { cards } => pending.extend(cards),
            CardChange::Remove { card_id } => {
                if !pending.is_empty() {
                    out.push(Update::ContextCard(CardChange::Batch {
                        cards: std::mem::take(&mut pending),
                    }));
                }
                out.push(Update::ContextCard(CardChange::Remove { card_id }));
            }
        }
    }
    if !pending.is_empty() {
        out.push(Update::ContextCard(CardChange::Batch { cards: pending }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use issuedesk_common::{AgentState, CardSource, MessageRole, MessageStatus, Timestamp};

    fn at(ts: i64, payload: UpdatePayload) -> InboundUpdate {
        InboundUpdate {
            timestamp: Timestamp(ts),
            payload,
        }
    }

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            session_id: "s1".to_string(),
            role: MessageRole::Assistant,
            content: format!("content {}", id),
            is_code: false,
            token_count: 1,
            timestamp: Utc::now(),
            status: MessageStatus::Sent,
            client_id: None,
        }
    }

    fn card(id: &str) -> ContextCard {
        ContextCard {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            content: "x".to_string(),
            token_count: 1,
            source: CardSource::Manual,
        }
    }

    #[test]
    fn test_three_messages_collapse_to_last() {
        let batch = vec![
            at(1, UpdatePayload::Message(message("A"))),
            at(2, UpdatePayload::Message(message("B"))),
            at(3, UpdatePayload::Message(message("C"))),
        ];
        let out = collapse(batch);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Update::Message(msg) => assert_eq!(msg.id, "C"),
            other => panic!("Expected Message, got {:?}", other),
        }
    }

    #[test]
    fn test_session_update_keeps_highest_timestamp() {
        let newest = SessionPatch {
            title: Some("newest".into()),
            ..Default::default()
        };
        let batch = vec![
            at(10, UpdatePayload::SessionUpdate(SessionPatch {
                title: Some("middle".into()),
                ..Default::default()
            })),
            at(30, UpdatePayload::SessionUpdate(newest.clone())),
            at(30, UpdatePayload::AgentStatus(AgentStatusPatch::default())),
        ];
        let out = collapse(batch);
        assert_eq!(out[0], Update::Session(newest));
    }

    #[test]
    fn test_statistics_are_shallow_merged() {
        let batch = vec![
            at(1, UpdatePayload::Statistics(StatisticsPatch {
                message_count: Some(3),
                token_count: Some(10),
                ..Default::default()
            })),
            at(2, UpdatePayload::Statistics(StatisticsPatch {
                token_count: Some(20),
                ..Default::default()
            })),
        ];
        assert_eq!(
            collapse(batch),
            vec![Update::Statistics(StatisticsPatch {
                message_count: Some(3),
                token_count: Some(20),
                ..Default::default()
            })]
        );
    }

    #[test]
    fn test_cards_merge_into_single_batch() {
        let batch = vec![
            at(1, UpdatePayload::ContextCard(CardChange::Add { card: card("c1") })),
            at(2, UpdatePayload::ContextCard(CardChange::Batch {
                cards: vec![card("c2"), card("c3")],
            })),
        ];
        let out = collapse(batch);
        assert_eq!(out.len(), 1);
        match &out[0] {
            Update::ContextCard(CardChange::Batch { cards }) => {
                let ids: Vec<_> = cards.iter().map(|c| c.id.as_str()).collect();
                assert_eq!(ids, vec!["c1", "c2", "c3"]);
            }
            other => panic!("Expected card batch, got {:?}", other),
        }
    }

    #[test]
    fn test_card_removal_splits_batch_in_order() {
        let batch = vec![
            at(1, UpdatePayload::ContextCard(CardChange::Add { card: card("c1") })),
            at(2, UpdatePayload::ContextCard(CardChange::Remove {
                card_id: "c1".into(),
            })),
            at(3, UpdatePayload::ContextCard(CardChange::Add { card: card("c2") })),
        ];
        let kinds: Vec<_> = collapse(batch)
            .into_iter()
            .map(|u| match u {
                Update::ContextCard(CardChange::Batch { cards }) => format!("batch:{}", cards[0].id),
                Update::ContextCard(CardChange::Remove { card_id }) => format!("remove:{}", card_id),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(kinds, vec!["batch:c1", "remove:c1", "batch:c2"]);
    }

    #[test]
    fn test_heartbeat_and_error_are_not_forwarded() {
        let batch = vec![
            at(1, UpdatePayload::Heartbeat),
            at(2, UpdatePayload::Error(issuedesk_common::ServerError {
                message: "x".into(),
                code: None,
            })),
            at(3, UpdatePayload::AgentStatus(AgentStatusPatch {
                state: Some(AgentState::Thinking),
                ..Default::default()
            })),
        ];
        let out = collapse(batch);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), UpdateKind::AgentStatus);
    }

    #[test]
    fn test_kinds_keep_first_appearance_order() {
        let batch = vec![
            at(1, UpdatePayload::Statistics(StatisticsPatch::default())),
            at(2, UpdatePayload::Message(message("A"))),
            at(3, UpdatePayload::Statistics(StatisticsPatch::default())),
        ];
        let kinds: Vec<_> = collapse(batch).iter().map(Update::kind).collect();
        assert_eq!(kinds, vec![UpdateKind::Statistics, UpdateKind::Message]);
    }
}
