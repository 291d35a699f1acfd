//! Events pushed from the server to connections.

use crate::fact::{AnswerChoice, Question};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Process usage reported with the liveness echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub pid: u32,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub connections: usize,
}

/// An outbound protocol event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Conversational response to something the user sent.
    Reply { message: String },
    /// Unprompted message from the session.
    Message { message: String },
    /// A pending question to answer.
    Question {
        id: String,
        question: String,
        answers: Vec<AnswerChoice>,
    },
    /// Liveness echo.
    Status {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

impl OutboundEvent {
    pub fn reply(message: impl Into<String>) -> Self {
        Self::Reply {
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn question(question: &Question) -> Self {
        Self::Question {
            id: question.id.clone(),
            question: question.prompt.clone(),
            answers: question.answers.clone(),
        }
    }

    pub fn online(usage: Option<Usage>) -> Self {
        Self::Status {
            message: "online".to_string(),
            usage,
        }
    }

    /// The wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reply { .. } => "reply",
            Self::Message { .. } => "message",
            Self::Question { .. } => "question",
            Self::Status { .. } => "status",
        }
    }

    /// The event body without the `event` tag.
    pub fn payload(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("event");
        }
        value
    }
}

/// Who an outbound event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// A single connection.
    Connection(String),
    /// Every live connection of a user.
    User(String),
    /// Every live connection, across users.
    Everyone,
}

/// An outbound event together with its audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub audience: Audience,
    pub event: OutboundEvent,
}

impl Delivery {
    pub fn new(audience: Audience, event: OutboundEvent) -> Self {
        Self { audience, event }
    }

    pub fn to_user(user_id: impl Into<String>, event: OutboundEvent) -> Self {
        Self::new(Audience::User(user_id.into()), event)
    }
}
