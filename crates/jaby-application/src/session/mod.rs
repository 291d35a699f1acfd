//! Per-user inference sessions.
//!
//! This module owns the user → session map, the session lifecycle state
//! machine and the factory that compiles the rule book for each user.

mod factory;
mod manager;
mod state;

pub use factory::SessionFactory;
pub use manager::SessionManager;
pub use state::{AttachOutcome, DetachOutcome, SessionPhase};
