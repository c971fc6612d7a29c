pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod parser;
pub mod rate_limiter;
pub mod robots;
pub mod server;
pub mod storage;
pub mod types;

// Ports and their adapters
pub mod app;
pub mod infra;
