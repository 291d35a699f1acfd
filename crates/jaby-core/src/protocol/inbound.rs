//! Events received on a live connection.

use crate::error::{JabyError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// An inbound protocol event, parsed from its wire name and JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Start,
    Message {
        message: String,
    },
    Answer {
        question: String,
        answer: String,
    },
    Status {
        ttl: Option<DateTime<Utc>>,
        context: Map<String, Value>,
    },
    Disconnect,
}

#[derive(Deserialize)]
struct MessagePayload {
    message: String,
}

#[derive(Deserialize)]
struct AnswerPayload {
    question: Value,
    answer: String,
}

impl InboundEvent {
    /// Parses a socket-style `(event name, payload)` pair.
    ///
    /// # Errors
    ///
    /// Returns `JabyError::Protocol` for unknown event names, missing required
    /// fields, or fields of the wrong type.
    pub fn from_wire(name: &str, payload: Value) -> Result<Self> {
        match name {
            "start" => Ok(Self::Start),
            "disconnect" => Ok(Self::Disconnect),
            "message" => {
                let MessagePayload { message } = parse_payload(name, payload)?;
                if message.trim().is_empty() {
                    return Err(JabyError::protocol("message: empty message"));
                }
                Ok(Self::Message { message })
            }
            "answer" => {
                let AnswerPayload { question, answer } = parse_payload(name, payload)?;
                let question = match question {
                    Value::String(id) if !id.is_empty() => id,
                    Value::Number(id) => id.to_string(),
                    other => {
                        return Err(JabyError::protocol(format!(
                            "answer: invalid question reference {}",
                            other
                        )));
                    }
                };
                Ok(Self::Answer { question, answer })
            }
            "status" => {
                let mut context = match payload {
                    Value::Object(map) => map,
                    Value::Null => Map::new(),
                    other => {
                        return Err(JabyError::protocol(format!(
                            "status: expected an object, got {}",
                            other
                        )));
                    }
                };
                let ttl = match context.remove("ttl") {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(parse_timestamp(&value)?),
                };
                Ok(Self::Status { ttl, context })
            }
            other => Err(JabyError::protocol(format!("unknown event '{}'", other))),
        }
    }

    /// The wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Message { .. } => "message",
            Self::Answer { .. } => "answer",
            Self::Status { .. } => "status",
            Self::Disconnect => "disconnect",
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(name: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| JabyError::protocol(format!("{}: {}", name, e)))
}

/// Accepts RFC 3339 strings or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| JabyError::protocol(format!("status: invalid ttl '{}': {}", text, e))),
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| JabyError::protocol(format!("status: invalid ttl {}", number))),
        other => Err(JabyError::protocol(format!("status: invalid ttl {}", other))),
    }
}
