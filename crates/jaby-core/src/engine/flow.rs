//! Rule-set compilation.

use super::error::EngineError;
use super::listener::SessionListener;
use super::rule::Rule;
use super::session::EngineSession;
use crate::fact::FactKind;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Default cap on activations fired in a single match cycle.
pub const DEFAULT_MAX_FIRINGS: usize = 1000;

/// The set of fact types a flow accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactTypes(BTreeSet<FactKind>);

impl FactTypes {
    pub fn new<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = FactKind>,
    {
        Self(kinds.into_iter().collect())
    }

    /// Every known fact kind.
    pub fn all() -> Self {
        Self(FactKind::iter().collect())
    }

    pub fn contains(&self, kind: FactKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = FactKind> + '_ {
        self.0.iter().copied()
    }
}

impl Default for FactTypes {
    fn default() -> Self {
        Self::all()
    }
}

/// Values bound into a flow at compile time and visible to every rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub user_id: String,
    pub display_name: String,
}

impl Scope {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// A validated rule set bound to a scope; the factory for engine sessions.
#[derive(Clone)]
pub struct CompiledFlow {
    rules: Arc<[Rule]>,
    fact_types: FactTypes,
    scope: Scope,
    max_firings: usize,
    listeners: Vec<Arc<dyn SessionListener>>,
}

impl std::fmt::Debug for CompiledFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFlow")
            .field("rules", &self.rules.len())
            .field("fact_types", &self.fact_types)
            .field("scope", &self.scope)
            .field("max_firings", &self.max_firings)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Compiles `rules` against the registered `fact_types` for one `scope`.
///
/// # Errors
///
/// Returns `EngineError::Compilation` if a rule has an empty or duplicate
/// name, has no condition, or references a fact kind that is not registered.
pub fn compile(
    rules: &[Rule],
    fact_types: &FactTypes,
    scope: Scope,
) -> Result<CompiledFlow, EngineError> {
    let mut names = HashSet::new();

    for rule in rules {
        if rule.name().trim().is_empty() {
            return Err(EngineError::Compilation(
                "rule with an empty name".to_string(),
            ));
        }
        if !names.insert(rule.name()) {
            return Err(EngineError::Compilation(format!(
                "duplicate rule name '{}'",
                rule.name()
            )));
        }
        if !rule.has_condition() {
            return Err(EngineError::Compilation(format!(
                "rule '{}' has no condition",
                rule.name()
            )));
        }
        if let Some(kind) = rule.kinds().iter().find(|kind| !fact_types.contains(**kind)) {
            return Err(EngineError::Compilation(format!(
                "rule '{}' references undefined fact type {}",
                rule.name(),
                kind
            )));
        }
    }

    Ok(CompiledFlow {
        rules: rules.to_vec().into(),
        fact_types: fact_types.clone(),
        scope,
        max_firings: DEFAULT_MAX_FIRINGS,
        listeners: Vec::new(),
    })
}

impl CompiledFlow {
    /// Caps the activations fired per match cycle. Zero is treated as one.
    pub fn with_max_firings(mut self, max_firings: usize) -> Self {
        self.max_firings = max_firings.max(1);
        self
    }

    /// Attaches a lifecycle listener to every session created from this flow.
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn name(&self) -> &str {
        &self.scope.user_id
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn fact_types(&self) -> &FactTypes {
        &self.fact_types
    }

    pub fn max_firings(&self) -> usize {
        self.max_firings
    }

    pub(crate) fn shared_rules(&self) -> Arc<[Rule]> {
        Arc::clone(&self.rules)
    }

    pub(crate) fn listeners(&self) -> &[Arc<dyn SessionListener>] {
        &self.listeners
    }

    /// Creates a session with an empty working memory.
    pub fn new_session(&self) -> EngineSession {
        EngineSession::new(self.clone())
    }
}
