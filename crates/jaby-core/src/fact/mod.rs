//! Fact domain module.
//!
//! - `model`: the `Fact` tagged union and its variants
//! - `record`: the `{type, fields}` storage form of persistable facts

mod model;
mod record;

pub use model::{
    Answer, AnswerChoice, Fact, FactKind, Flags, Knowledge, Message, Question, UserFact,
};
pub use record::FactRecord;
