// Numan Thabit 2025
//! solana-exporter: scrape-time Prometheus exporter for a Solana node and its validators.

pub mod collector;
pub mod config;
pub mod descriptors;
pub mod exposition;
pub mod http;
pub mod metrics;
pub mod rpc;
pub mod slots;
