//! Library crate for bfssh-rs: SSH credential audits run as tracked background scans.
pub mod config;
pub mod credentials;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod runner;
pub mod server;
pub mod ssh;
pub mod trial;
pub mod types;
