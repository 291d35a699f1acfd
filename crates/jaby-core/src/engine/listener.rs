//! Session lifecycle hooks, used for observability only.

use super::flow::Scope;
use super::memory::FactHandle;
use crate::fact::Fact;

/// Observes what happens inside an engine session.
///
/// Every method has a no-op default; listeners must not fail.
pub trait SessionListener: Send + Sync {
    fn on_fire(&self, _scope: &Scope, _rule: &str, _facts: &[&Fact]) {}

    fn on_assert(&self, _scope: &Scope, _handle: FactHandle, _fact: &Fact) {}

    fn on_retract(&self, _scope: &Scope, _handle: FactHandle, _fact: &Fact) {}

    fn on_modify(&self, _scope: &Scope, _handle: FactHandle, _fact: &Fact) {}
}

/// Writes every lifecycle event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl SessionListener for TracingListener {
    fn on_fire(&self, scope: &Scope, rule: &str, facts: &[&Fact]) {
        let facts: Vec<String> = facts.iter().map(|fact| fact.summary()).collect();
        tracing::debug!(user_id = %scope.user_id, rule, facts = ?facts, "rule fired");
    }

    fn on_assert(&self, scope: &Scope, handle: FactHandle, fact: &Fact) {
        tracing::trace!(user_id = %scope.user_id, %handle, fact = %fact.summary(), "fact asserted");
    }

    fn on_retract(&self, scope: &Scope, handle: FactHandle, fact: &Fact) {
        tracing::trace!(user_id = %scope.user_id, %handle, fact = %fact.summary(), "fact retracted");
    }

    fn on_modify(&self, scope: &Scope, handle: FactHandle, fact: &Fact) {
        tracing::trace!(user_id = %scope.user_id, %handle, fact = %fact.summary(), "fact modified");
    }
}
