//! File storage primitives shared by the directory repositories.

pub mod atomic_json;

pub use atomic_json::AtomicJsonFile;
