//! Wire protocol between connections and the session host.

mod inbound;
mod outbound;

pub use inbound::InboundEvent;
pub use outbound::{Audience, Delivery, OutboundEvent, Usage};
