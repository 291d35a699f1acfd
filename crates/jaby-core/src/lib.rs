pub mod config;
pub mod engine;
pub mod error;
pub mod fact;
pub mod protocol;
pub mod repository;
pub mod user;

// Re-export common error type
pub use error::JabyError;
