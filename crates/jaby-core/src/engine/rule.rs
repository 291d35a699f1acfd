//! Production rules: a condition over working memory plus an action.

use super::error::EngineError;
use super::flow::Scope;
use super::memory::{FactHandle, WorkingMemory};
use crate::fact::{Fact, FactKind};
use crate::protocol::{Audience, Delivery, OutboundEvent};
use std::fmt;
use std::sync::Arc;

/// A tuple of facts satisfying a rule's condition.
pub type Binding = Vec<FactHandle>;

/// Enumerates every binding that currently satisfies a rule.
pub type Condition = Arc<dyn Fn(&WorkingMemory) -> Vec<Binding> + Send + Sync>;

/// Runs when a binding is fired.
pub type Action = Arc<dyn Fn(&mut Firing<'_>) -> Result<(), EngineError> + Send + Sync>;

/// A named condition/action pair.
#[derive(Clone)]
pub struct Rule {
    name: String,
    salience: i32,
    kinds: Vec<FactKind>,
    condition: Option<Condition>,
    action: Action,
}

impl Rule {
    /// Starts building a rule with the given name and salience 0.
    pub fn builder(name: impl Into<String>) -> RuleBuilder {
        RuleBuilder {
            name: name.into(),
            salience: 0,
            kinds: Vec::new(),
            condition: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn salience(&self) -> i32 {
        self.salience
    }

    /// Fact kinds the rule's condition and action refer to.
    pub fn kinds(&self) -> &[FactKind] {
        &self.kinds
    }

    pub(crate) fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    pub(crate) fn bindings(&self, memory: &WorkingMemory) -> Vec<Binding> {
        match &self.condition {
            Some(condition) => condition(memory),
            None => Vec::new(),
        }
    }

    pub(crate) fn fire(&self, firing: &mut Firing<'_>) -> Result<(), EngineError> {
        (self.action)(firing)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("salience", &self.salience)
            .field("kinds", &self.kinds)
            .finish()
    }
}

/// Builder for [`Rule`].
pub struct RuleBuilder {
    name: String,
    salience: i32,
    kinds: Vec<FactKind>,
    condition: Option<Condition>,
}

impl RuleBuilder {
    /// Higher salience fires first.
    pub fn salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }

    /// Single-fact pattern: every fact of `kind` for which `predicate` holds.
    pub fn when<P>(mut self, kind: FactKind, predicate: P) -> Self
    where
        P: Fn(&Fact) -> bool + Send + Sync + 'static,
    {
        self.kinds = vec![kind];
        self.condition = Some(Arc::new(move |memory: &WorkingMemory| {
            memory
                .of_kind(kind)
                .filter(|(_, fact)| predicate(fact))
                .map(|(handle, _)| vec![handle])
                .collect()
        }));
        self
    }

    /// Arbitrary pattern over working memory, e.g. joins and negations.
    pub fn matching<I, C>(mut self, kinds: I, condition: C) -> Self
    where
        I: IntoIterator<Item = FactKind>,
        C: Fn(&WorkingMemory) -> Vec<Binding> + Send + Sync + 'static,
    {
        self.kinds = kinds.into_iter().collect();
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Declares additional fact kinds the action asserts.
    pub fn produces<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = FactKind>,
    {
        for kind in kinds {
            if !self.kinds.contains(&kind) {
                self.kinds.push(kind);
            }
        }
        self
    }

    pub fn then<A>(self, action: A) -> Rule
    where
        A: Fn(&mut Firing<'_>) -> Result<(), EngineError> + Send + Sync + 'static,
    {
        Rule {
            name: self.name,
            salience: self.salience,
            kinds: self.kinds,
            condition: self.condition,
            action: Arc::new(action),
        }
    }
}

/// A working-memory change staged by a rule action.
#[derive(Debug, Clone)]
pub(crate) enum Change {
    Assert(Fact),
    Retract(FactHandle),
    Modify(FactHandle, Fact),
}

/// Context handed to a rule action while it fires.
///
/// Reads see working memory as it was when the activation was selected;
/// writes are staged and applied once the action returns successfully.
pub struct Firing<'a> {
    rule: &'a str,
    binding: &'a [FactHandle],
    memory: &'a WorkingMemory,
    scope: &'a Scope,
    pub(crate) changes: Vec<Change>,
    pub(crate) deliveries: Vec<Delivery>,
}

impl<'a> Firing<'a> {
    pub(crate) fn new(
        rule: &'a str,
        binding: &'a [FactHandle],
        memory: &'a WorkingMemory,
        scope: &'a Scope,
    ) -> Self {
        Self {
            rule,
            binding,
            memory,
            scope,
            changes: Vec::new(),
            deliveries: Vec::new(),
        }
    }

    pub fn rule(&self) -> &str {
        self.rule
    }

    pub fn scope(&self) -> &'a Scope {
        self.scope
    }

    pub fn memory(&self) -> &'a WorkingMemory {
        self.memory
    }

    /// Handle of the `index`-th bound fact.
    pub fn handle(&self, index: usize) -> Result<FactHandle, EngineError> {
        self.binding.get(index).copied().ok_or_else(|| {
            EngineError::rule_failed(self.rule, format!("no bound fact at position {}", index))
        })
    }

    /// The `index`-th bound fact.
    pub fn fact(&self, index: usize) -> Result<&'a Fact, EngineError> {
        let handle = self.handle(index)?;
        self.memory
            .get(handle)
            .ok_or(EngineError::UnknownFact(handle))
    }

    pub fn assert(&mut self, fact: Fact) {
        self.changes.push(Change::Assert(fact));
    }

    pub fn retract(&mut self, handle: FactHandle) {
        self.changes.push(Change::Retract(handle));
    }

    pub fn modify(&mut self, handle: FactHandle, fact: Fact) {
        self.changes.push(Change::Modify(handle, fact));
    }

    /// Sends an event to every connection of the session's user.
    pub fn emit(&mut self, event: OutboundEvent) {
        let audience = Audience::User(self.scope.user_id.clone());
        self.deliveries.push(Delivery::new(audience, event));
    }

    pub fn emit_to(&mut self, audience: Audience, event: OutboundEvent) {
        self.deliveries.push(Delivery::new(audience, event));
    }
}
