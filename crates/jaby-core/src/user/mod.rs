//! User domain module.
//!
//! Holds the durable, authenticated user profile. Live connection and
//! session bookkeeping for a user is kept in memory by the application
//! layer, keyed by the profile's id, and is never persisted with it.
//!
//! # Usage
//!
//! ```ignore
//! use jaby_core::user::UserProfile;
//! ```

mod model;

pub use model::UserProfile;
