pub mod config;
pub mod facts;
pub mod run;
