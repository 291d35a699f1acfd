//! Storage form of persistable facts.

use super::model::{Answer, Fact, FactKind, Knowledge, Question};
use crate::error::{JabyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A serialized fact as kept in the per-user fact document: `{type, fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    #[serde(rename = "type")]
    pub fact_type: FactKind,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl FactRecord {
    /// Rebuilds the engine fact from the stored fields.
    ///
    /// Ephemeral kinds are rejected; only the Knowledge family is ever stored.
    pub fn into_fact(self) -> Result<Fact> {
        let fields = Value::Object(self.fields);
        let fact = match self.fact_type {
            FactKind::Knowledge => Fact::Knowledge(serde_json::from_value::<Knowledge>(fields)?),
            FactKind::Question => Fact::Question(serde_json::from_value::<Question>(fields)?),
            FactKind::Answer => Fact::Answer(serde_json::from_value::<Answer>(fields)?),
            FactKind::User | FactKind::Flags | FactKind::Message => {
                return Err(JabyError::Serialization {
                    format: "fact record".to_string(),
                    message: format!("{} facts are not persistable", self.fact_type),
                });
            }
        };
        Ok(fact)
    }
}

impl Fact {
    /// Converts the fact to its storage record, or `None` for ephemeral kinds.
    pub fn to_record(&self) -> Result<Option<FactRecord>> {
        let fields = match self {
            Fact::Knowledge(knowledge) => serde_json::to_value(knowledge)?,
            Fact::Question(question) => serde_json::to_value(question)?,
            Fact::Answer(answer) => serde_json::to_value(answer)?,
            Fact::User(_) | Fact::Flags(_) | Fact::Message(_) => return Ok(None),
        };

        match fields {
            Value::Object(fields) => Ok(Some(FactRecord {
                fact_type: self.kind(),
                fields,
            })),
            other => Err(JabyError::internal(format!(
                "fact {} serialized to non-object {}",
                self.summary(),
                other
            ))),
        }
    }
}
