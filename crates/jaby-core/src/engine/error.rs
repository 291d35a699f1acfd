use super::memory::FactHandle;
use crate::fact::FactKind;
use thiserror::Error;

/// Failures raised by the rule engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The rule set could not be compiled into a flow.
    #[error("{0}")]
    Compilation(String),

    /// Retract/modify referenced a fact that is not in working memory.
    #[error("unknown fact {0}")]
    UnknownFact(FactHandle),

    /// The fact's type was not registered when the flow was compiled.
    #[error("fact type {0} is not registered with this flow")]
    UnregisteredType(FactKind),

    /// Modify tried to change the type of a fact.
    #[error("cannot modify {handle} from {from} to {to}")]
    KindMismatch {
        handle: FactHandle,
        from: FactKind,
        to: FactKind,
    },

    /// A rule action reported a failure.
    #[error("rule '{rule}' failed: {message}")]
    RuleFailed { rule: String, message: String },

    /// A match cycle fired more activations than allowed.
    #[error("match cycle exceeded {limit} firings")]
    CycleLimit { limit: usize },
}

impl EngineError {
    pub fn rule_failed(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuleFailed {
            rule: rule.into(),
            message: message.into(),
        }
    }
}
