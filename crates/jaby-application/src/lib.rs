//! Application layer for Jaby.
//!
//! This crate coordinates live connections with per-user inference
//! sessions: the connection registry, the session manager, the event
//! router and outbound fan-out, plus the core rule book every session runs.

pub mod connection_registry;
pub mod dispatch;
pub mod router;
pub mod rules;
pub mod runtime;
pub mod session;
pub mod transport;

pub use connection_registry::ConnectionRegistry;
pub use dispatch::{Fanout, OutboundSink};
pub use router::EventRouter;
pub use rules::RuleBook;
pub use runtime::Runtime;
pub use session::{AttachOutcome, DetachOutcome, SessionFactory, SessionManager, SessionPhase};
pub use transport::{ChannelTransport, ConnectionTransport, TransportError};
