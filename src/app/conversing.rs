use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::concept::{ActionError, ActionResult, Concept};
use crate::record;
use crate::value::{Record, Value};

/// Concept name.
pub const CONVERSING: &str = "Conversing";

#[derive(Debug, Clone)]
struct Message {
    id: Value,
    sender: Value,
    content: String,
}

#[derive(Debug, Clone)]
struct Conversation {
    title: String,
    participants: Vec<Value>,
    messages: Vec<Message>,
}

/// Conversations, their participants and their messages.
#[derive(Debug, Default)]
pub struct Conversing {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl Conversing {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages posted to `conversation`.
    #[must_use]
    pub fn message_count(&self, conversation: &str) -> usize {
        self.conversations
            .read()
            .ok()
            .and_then(|g| g.get(conversation).map(|c| c.messages.len()))
            .unwrap_or(0)
    }

    fn create(&self, input: &Record) -> ActionResult {
        let title = input
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::new("create requires a title"))?;
        let participants = input
            .get("participants")
            .and_then(Value::as_array)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ActionError::new("create requires at least one participant"))?;

        let conversation = Value::new_id();
        let key = conversation.as_str().unwrap_or_default().to_string();
        self.conversations
            .write()
            .map_err(|_| ActionError::poisoned("conversations"))?
            .insert(
                key,
                Conversation {
                    title: title.to_string(),
                    participants: participants.to_vec(),
                    messages: Vec::new(),
                },
            );
        Ok(record! { "conversation" => conversation })
    }

    fn send(&self, input: &Record) -> ActionResult {
        let conversation = input
            .get("conversation")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::new("send requires a conversation"))?;
        let sender = input
            .get("sender")
            .ok_or_else(|| ActionError::new("send requires a sender"))?;
        let content = input
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ActionError::new("send requires text content"))?;

        let mut guard = self
            .conversations
            .write()
            .map_err(|_| ActionError::poisoned("conversations"))?;
        let Some(target) = guard.get_mut(conversation) else {
            return Err(ActionError::new(format!("unknown conversation {conversation}")));
        };
        if !target.participants.iter().any(|p| same_user(p, sender)) {
            return Err(ActionError::new(format!(
                "{sender} is not a participant of {conversation}"
            )));
        }

        let message = Value::new_id();
        target.messages.push(Message {
            id: message.clone(),
            sender: sender.clone(),
            content: content.to_string(),
        });
        Ok(record! { "message" => message })
    }

    fn messages(&self, conversation: &str) -> Vec<Record> {
        let Ok(guard) = self.conversations.read() else {
            return Vec::new();
        };
        guard
            .get(conversation)
            .map(|c| {
                c.messages
                    .iter()
                    .map(|m| {
                        record! {
                            "message" => m.id.clone(),
                            "sender" => m.sender.clone(),
                            "content" => m.content.as_str(),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn participants(&self, conversation: &str) -> Vec<Record> {
        let Ok(guard) = self.conversations.read() else {
            return Vec::new();
        };
        guard
            .get(conversation)
            .map(|c| {
                c.participants
                    .iter()
                    .map(|p| record! { "participant" => p.clone(), "title" => c.title.as_str() })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// Users arrive as plain strings from request bodies and as ids from concepts.
fn same_user(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[async_trait]
impl Concept for Conversing {
    fn name(&self) -> &str {
        CONVERSING
    }

    fn actions(&self) -> &[&'static str] {
        &["create", "send"]
    }

    fn queries(&self) -> &[&'static str] {
        &["_getMessages", "_getParticipants"]
    }

    async fn perform(&self, action: &str, input: &Record) -> ActionResult {
        match action {
            "create" => self.create(input),
            "send" => self.send(input),
            other => Err(ActionError::new(format!("Conversing has no action {other}"))),
        }
    }

    async fn query(&self, query: &str, input: &Record) -> Vec<Record> {
        let Some(conversation) = input.get("conversation").and_then(Value::as_str) else {
            return Vec::new();
        };
        match query {
            "_getMessages" => self.messages(conversation),
            "_getParticipants" => self.participants(conversation),
            _ => Vec::new(),
        }
    }
}
