pub mod aggregate;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod init;
pub mod orchestrator;
pub mod reconcile;
pub mod router;
