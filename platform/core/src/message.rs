use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for MessagePriority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Broadcast,
    Event,
}

/// A unit of A2A communication. `from`/`to` are validated non-empty at
/// construction; a `Response` carries `parent_id` pointing at the request it
/// answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub from: String,
    pub to: String,
    pub content: Value,
    pub kind: MessageKind,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default)]
    pub requires_response: bool,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message `from` must not be empty")]
    EmptyFrom,
    #[error("message `to` must not be empty")]
    EmptyTo,
    #[error("a response must carry a parent_id")]
    ResponseMissingParent,
}

impl Message {
    /// Builds a request. `from`/`to` non-empty is enforced here rather than
    /// deferred to the bus, so a malformed message can never be constructed.
    pub fn request(
        from: impl Into<String>,
        to: impl Into<String>,
        content: Value,
    ) -> Result<Self, MessageError> {
        Self::new(from, to, content, MessageKind::Request, None)
    }

    pub fn response(
        from: impl Into<String>,
        to: impl Into<String>,
        content: Value,
        parent_id: Uuid,
    ) -> Result<Self, MessageError> {
        Self::new(from, to, content, MessageKind::Response, Some(parent_id))
    }

    pub fn broadcast(from: impl Into<String>, content: Value) -> Result<Self, MessageError> {
        Self::new(from, "*", content, MessageKind::Broadcast, None)
    }

    pub fn event(
        from: impl Into<String>,
        to: impl Into<String>,
        content: Value,
    ) -> Result<Self, MessageError> {
        Self::new(from, to, content, MessageKind::Event, None)
    }

    fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        content: Value,
        kind: MessageKind,
        parent_id: Option<Uuid>,
    ) -> Result<Self, MessageError> {
        let from = from.into();
        let to = to.into();
        if from.is_empty() {
            return Err(MessageError::EmptyFrom);
        }
        if to.is_empty() {
            return Err(MessageError::EmptyTo);
        }
        if matches!(kind, MessageKind::Response) && parent_id.is_none() {
            return Err(MessageError::ResponseMissingParent);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            ts: chrono::Utc::now(),
            from,
            to,
            content,
            kind,
            priority: MessagePriority::default(),
            requires_response: matches!(kind, MessageKind::Request),
            parent_id,
            metadata: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_endpoints() {
        assert!(Message::request("", "b", Value::Null).is_err());
        assert!(Message::request("a", "", Value::Null).is_err());
    }

    #[test]
    fn response_requires_parent() {
        let req = Message::request("a", "b", Value::Null).unwrap();
        let resp = Message::response("b", "a", Value::Null, req.id).unwrap();
        assert_eq!(resp.parent_id, Some(req.id));
    }
}
