pub mod auth;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod orchestrator;
pub mod pool;
pub mod stats;
pub mod transport;
pub mod workload;
