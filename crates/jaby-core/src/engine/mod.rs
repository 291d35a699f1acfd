//! Minimal forward-chaining production-rule engine.
//!
//! Rules are `(condition over working memory, action)` pairs. A match cycle
//! re-evaluates every condition after each firing, which is plenty for the
//! small per-user fact sets this engine hosts.
//!
//! - `flow`: fact-type registry, scope bindings, `compile`
//! - `session`: `EngineSession` with assert/retract/modify/match
//! - `rule`: `Rule`, its builder and the `Firing` context
//! - `memory`: `WorkingMemory` and `FactHandle`
//! - `listener`: lifecycle hooks for observability

mod error;
mod flow;
mod listener;
mod memory;
mod rule;
mod session;

pub use error::EngineError;
pub use flow::{CompiledFlow, DEFAULT_MAX_FIRINGS, FactTypes, Scope, compile};
pub use listener::{SessionListener, TracingListener};
pub use memory::{FactHandle, WorkingMemory};
pub use rule::{Action, Binding, Condition, Firing, Rule, RuleBuilder};
pub use session::{EngineSession, MatchOutcome};
