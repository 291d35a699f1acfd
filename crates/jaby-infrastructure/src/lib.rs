pub mod config_service;
pub mod context_repository;
pub mod fact_repository;
pub mod paths;
pub mod storage;

pub use config_service::ConfigService;
pub use context_repository::DirContextRepository;
pub use fact_repository::{DirFactRepository, FactDocument};
pub use paths::JabyPaths;
