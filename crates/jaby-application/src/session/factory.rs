use crate::rules::RuleBook;
use chrono::{DateTime, Utc};
use jaby_core::engine::{
    DEFAULT_MAX_FIRINGS, EngineError, EngineSession, Scope, SessionListener, TracingListener,
    compile,
};
use jaby_core::fact::{Fact, Flags};
use jaby_core::user::UserProfile;
use std::sync::Arc;
use uuid::Uuid;

/// One compiled engine session owned by a user.
pub(crate) struct LiveSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub engine: EngineSession,
}

/// Compiles the rule book into per-user engine sessions.
///
/// Every new session starts with the owner's identity fact and an empty
/// `Flags` fact.
#[derive(Clone)]
pub struct SessionFactory {
    book: RuleBook,
    max_firings: usize,
    listener: Arc<dyn SessionListener>,
}

impl SessionFactory {
    pub fn new(book: RuleBook) -> Self {
        Self {
            book,
            max_firings: DEFAULT_MAX_FIRINGS,
            listener: Arc::new(TracingListener),
        }
    }

    pub fn with_max_firings(mut self, max_firings: usize) -> Self {
        self.max_firings = max_firings;
        self
    }

    /// Replaces the default `TracingListener`.
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn book(&self) -> &RuleBook {
        &self.book
    }

    pub(crate) fn create(&self, user: &UserProfile) -> Result<LiveSession, EngineError> {
        let scope = Scope::new(user.id.clone(), user.display_name());
        let flow = compile(&self.book.rules, &self.book.fact_types, scope)?
            .with_max_firings(self.max_firings)
            .with_listener(Arc::clone(&self.listener));

        let mut engine = flow.new_session();
        engine.assert(user.identity_fact())?;
        engine.assert(Fact::Flags(Flags::new()))?;

        Ok(LiveSession {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            engine,
        })
    }
}

impl Default for SessionFactory {
    fn default() -> Self {
        Self::new(RuleBook::core())
    }
}
