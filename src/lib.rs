//! search-fusion library
//!
//! Multi-engine web search with priority failover, per-engine cooldowns,
//! bounded concurrency and a paginated fetch-and-read path.

pub mod cli;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod search;
pub mod service;
pub mod tool;
pub mod transport;

pub use service::SearchService;
