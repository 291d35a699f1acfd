//! Fact variants held in an inference session's working memory.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

/// Discriminant of a [`Fact`], used for fact-type registration and filtering.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
pub enum FactKind {
    User,
    Flags,
    Message,
    Question,
    Answer,
    Knowledge,
}

impl FactKind {
    /// Whether facts of this kind belong to the Knowledge family and are
    /// written to the per-user fact store.
    pub fn is_persistable(self) -> bool {
        matches!(self, Self::Question | Self::Answer | Self::Knowledge)
    }
}

/// Identity fact for the session owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFact {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl UserFact {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// Display name, falling back to the user id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A set of named booleans.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Flags {
    #[serde(default)]
    flags: BTreeMap<String, bool>,
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds flags from a list of names, each set to `true`. Empty names are ignored.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let flags = names
            .into_iter()
            .filter(|name| !name.as_ref().is_empty())
            .map(|name| (name.as_ref().to_string(), true))
            .collect();
        Self { flags }
    }

    /// Builds flags from the keys of a JSON object; every key is set to `true`.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        Self::from_names(object.keys())
    }

    pub fn set(&mut self, name: impl Into<String>) {
        self.flags.insert(name.into(), true);
    }

    pub fn clear(&mut self, name: &str) {
        self.flags.insert(name.to_string(), false);
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// A conversational message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
}

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// One candidate answer of a [`Question`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerChoice {
    pub id: u64,
    pub text: String,
}

impl AnswerChoice {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// A question waiting for an answer from the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub answers: Vec<AnswerChoice>,
}

impl Question {
    /// Creates a question with a fresh `question_<uuid>` id.
    ///
    /// Returns `None` when the prompt is blank or there are no candidate answers.
    pub fn new(prompt: impl Into<String>, answers: Vec<AnswerChoice>) -> Option<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() || answers.is_empty() {
            return None;
        }
        Some(Self {
            id: format!("question_{}", Uuid::new_v4().simple()),
            prompt,
            answers,
        })
    }

    /// Finds the candidate whose text matches `text` (case-insensitive).
    pub fn choice_by_text(&self, text: &str) -> Option<&AnswerChoice> {
        self.answers
            .iter()
            .find(|choice| choice.text.eq_ignore_ascii_case(text.trim()))
    }
}

/// The user's answer to a [`Question`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_ref: String,
    pub chosen_text: String,
}

impl Answer {
    pub fn new(question_ref: impl Into<String>, chosen_text: impl Into<String>) -> Self {
        Self {
            question_ref: question_ref.into(),
            chosen_text: chosen_text.into(),
        }
    }
}

/// A generic knowledge item: a kind tag plus arbitrary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    pub kind: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl Knowledge {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

/// A typed unit of knowledge in working memory.
#[derive(Debug, Clone, PartialEq)]
pub enum Fact {
    User(UserFact),
    Flags(Flags),
    Message(Message),
    Question(Question),
    Answer(Answer),
    Knowledge(Knowledge),
}

impl Fact {
    pub fn kind(&self) -> FactKind {
        match self {
            Fact::User(_) => FactKind::User,
            Fact::Flags(_) => FactKind::Flags,
            Fact::Message(_) => FactKind::Message,
            Fact::Question(_) => FactKind::Question,
            Fact::Answer(_) => FactKind::Answer,
            Fact::Knowledge(_) => FactKind::Knowledge,
        }
    }

    pub fn is_persistable(&self) -> bool {
        self.kind().is_persistable()
    }

    /// Short, log-safe description of the fact.
    pub fn summary(&self) -> String {
        match self {
            Fact::User(user) => format!("User({})", user.id),
            Fact::Flags(flags) => {
                let set: Vec<&str> = flags
                    .iter()
                    .filter(|(_, value)| *value)
                    .map(|(name, _)| name)
                    .collect();
                format!("Flags[{}]", set.join(","))
            }
            Fact::Message(message) => format!("Message({:?})", truncate(&message.text, 40)),
            Fact::Question(question) => {
                format!("Question({}, {} answers)", question.id, question.answers.len())
            }
            Fact::Answer(answer) => format!(
                "Answer({} -> {:?})",
                answer.question_ref,
                truncate(&answer.chosen_text, 40)
            ),
            Fact::Knowledge(knowledge) => format!("Knowledge({})", knowledge.kind),
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Fact::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_flags(&self) -> Option<&Flags> {
        match self {
            Fact::Flags(flags) => Some(flags),
            _ => None,
        }
    }

    pub fn as_question(&self) -> Option<&Question> {
        match self {
            Fact::Question(question) => Some(question),
            _ => None,
        }
    }

    pub fn as_answer(&self) -> Option<&Answer> {
        match self {
            Fact::Answer(answer) => Some(answer),
            _ => None,
        }
    }

    pub fn as_knowledge(&self) -> Option<&Knowledge> {
        match self {
            Fact::Knowledge(knowledge) => Some(knowledge),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&UserFact> {
        match self {
            Fact::User(user) => Some(user),
            _ => None,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}…", &text[..index]),
        None => text.to_string(),
    }
}
