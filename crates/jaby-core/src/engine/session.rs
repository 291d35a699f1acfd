//! A live instance of a compiled flow plus its working memory.

use super::error::EngineError;
use super::flow::{CompiledFlow, Scope};
use super::memory::{FactHandle, WorkingMemory};
use super::rule::{Binding, Change, Firing, Rule};
use crate::fact::{Fact, FactKind};
use crate::protocol::Delivery;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;

/// Identifies one activation: a rule bound to specific fact versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ActivationKey {
    rule: usize,
    facts: Vec<(FactHandle, u64)>,
}

/// What one match cycle did.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Number of activations fired.
    pub fired: usize,
    /// Outbound events requested by the fired rules, in firing order.
    pub deliveries: Vec<Delivery>,
    /// Why the cycle stopped early. Firings completed before the failure
    /// keep their changes and deliveries.
    pub error: Option<EngineError>,
}

impl MatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Turns an aborted cycle into its error, dropping partial deliveries.
    pub fn into_result(self) -> Result<Self, EngineError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// Working memory plus the agenda state of one compiled flow.
///
/// Not shareable across tasks without external synchronization; the owner is
/// expected to serialize every call.
pub struct EngineSession {
    flow: CompiledFlow,
    memory: WorkingMemory,
    fired: HashSet<ActivationKey>,
}

impl EngineSession {
    pub(crate) fn new(flow: CompiledFlow) -> Self {
        Self {
            flow,
            memory: WorkingMemory::new(),
            fired: HashSet::new(),
        }
    }

    pub fn scope(&self) -> &Scope {
        self.flow.scope()
    }

    pub fn flow(&self) -> &CompiledFlow {
        &self.flow
    }

    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    /// Adds a fact to working memory.
    ///
    /// A fact equal to one already present is not added twice; the existing
    /// handle is returned instead.
    pub fn assert(&mut self, fact: Fact) -> Result<FactHandle, EngineError> {
        self.ensure_registered(fact.kind())?;

        if let Some(existing) = self.memory.find(&fact) {
            tracing::debug!(
                user_id = %self.scope().user_id,
                handle = %existing,
                fact = %fact.summary(),
                "duplicate assert ignored"
            );
            return Ok(existing);
        }

        let handle = self.memory.insert(fact);
        if let Some(fact) = self.memory.get(handle) {
            for listener in self.flow.listeners() {
                listener.on_assert(self.flow.scope(), handle, fact);
            }
        }
        Ok(handle)
    }

    /// Removes a fact from working memory.
    pub fn retract(&mut self, handle: FactHandle) -> Result<Fact, EngineError> {
        let fact = self
            .memory
            .remove(handle)
            .ok_or(EngineError::UnknownFact(handle))?;
        self.fired
            .retain(|key| !key.facts.iter().any(|(bound, _)| *bound == handle));
        for listener in self.flow.listeners() {
            listener.on_retract(self.flow.scope(), handle, &fact);
        }
        Ok(fact)
    }

    /// Replaces a fact in place. The fact keeps its handle but counts as new
    /// for every rule that matches it.
    pub fn modify(&mut self, handle: FactHandle, fact: Fact) -> Result<(), EngineError> {
        let current = self
            .memory
            .get(handle)
            .ok_or(EngineError::UnknownFact(handle))?;
        if current.kind() != fact.kind() {
            return Err(EngineError::KindMismatch {
                handle,
                from: current.kind(),
                to: fact.kind(),
            });
        }

        self.memory.replace(handle, fact);
        let stamp = self.memory.stamp(handle);
        self.fired.retain(|key| {
            key.facts
                .iter()
                .all(|(bound, seen)| *bound != handle || Some(*seen) == stamp)
        });
        if let Some(fact) = self.memory.get(handle) {
            for listener in self.flow.listeners() {
                listener.on_modify(self.flow.scope(), handle, fact);
            }
        }
        Ok(())
    }

    /// Facts in working memory, optionally restricted to one kind.
    pub fn get_facts(&self, kind: Option<FactKind>) -> Vec<(FactHandle, &Fact)> {
        match kind {
            Some(kind) => self.memory.of_kind(kind).collect(),
            None => self.memory.iter().collect(),
        }
    }

    /// Fires activations until none are left.
    ///
    /// Each activation (rule + bound fact versions) fires at most once; a
    /// modified fact produces fresh activations. Ties on salience go to the
    /// most recently changed facts.
    ///
    /// The cycle stops at the first failing action or staged change, or
    /// when the flow's firing limit is reached; the cause is left in
    /// [`MatchOutcome::error`]. A failing firing contributes no deliveries,
    /// but everything fired before it is kept, changes and deliveries alike.
    pub fn match_cycle(&mut self) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();
        if let Err(e) = self.run_cycle(&mut outcome) {
            outcome.error = Some(e);
        }
        outcome
    }

    fn run_cycle(&mut self, outcome: &mut MatchOutcome) -> Result<(), EngineError> {
        let rules: Arc<[Rule]> = self.flow.shared_rules();

        while let Some((binding, key)) = self.next_activation(&rules) {
            if outcome.fired >= self.flow.max_firings() {
                return Err(EngineError::CycleLimit {
                    limit: self.flow.max_firings(),
                });
            }

            let rule = &rules[key.rule];
            self.fired.insert(key);
            outcome.fired += 1;

            let bound: Vec<&Fact> = binding
                .iter()
                .filter_map(|handle| self.memory.get(*handle))
                .collect();
            for listener in self.flow.listeners() {
                listener.on_fire(self.flow.scope(), rule.name(), &bound);
            }

            let mut firing = Firing::new(rule.name(), &binding, &self.memory, self.flow.scope());
            rule.fire(&mut firing)?;
            let changes = std::mem::take(&mut firing.changes);
            let deliveries = std::mem::take(&mut firing.deliveries);
            drop(firing);

            for change in changes {
                self.apply(change).map_err(|e| EngineError::rule_failed(rule.name(), e.to_string()))?;
            }
            outcome.deliveries.extend(deliveries);
        }

        Ok(())
    }

    fn apply(&mut self, change: Change) -> Result<(), EngineError> {
        match change {
            Change::Assert(fact) => self.assert(fact).map(|_| ()),
            Change::Retract(handle) => self.retract(handle).map(|_| ()),
            Change::Modify(handle, fact) => self.modify(handle, fact),
        }
    }

    fn next_activation(&self, rules: &[Rule]) -> Option<(Binding, ActivationKey)> {
        let mut best: Option<((i32, u64, Reverse<usize>), Binding, ActivationKey)> = None;

        for (index, rule) in rules.iter().enumerate() {
            for binding in rule.bindings(&self.memory) {
                let Some(facts) = binding
                    .iter()
                    .map(|handle| self.memory.stamp(*handle).map(|stamp| (*handle, stamp)))
                    .collect::<Option<Vec<_>>>()
                else {
                    continue;
                };

                let key = ActivationKey { rule: index, facts };
                if self.fired.contains(&key) {
                    continue;
                }

                let recency = key.facts.iter().map(|(_, stamp)| *stamp).max().unwrap_or(0);
                let rank = (rule.salience(), recency, Reverse(index));
                if best.as_ref().is_none_or(|(current, _, _)| rank > *current) {
                    best = Some((rank, binding, key));
                }
            }
        }

        best.map(|(_, binding, key)| (binding, key))
    }

    fn ensure_registered(&self, kind: FactKind) -> Result<(), EngineError> {
        if self.flow.fact_types().contains(kind) {
            Ok(())
        } else {
            Err(EngineError::UnregisteredType(kind))
        }
    }
}
