pub mod analysis;
pub mod anomaly;
pub mod commands;
pub mod config;
pub mod context;
pub mod decomposition;
pub mod error;
pub mod forecast;
pub mod fundamentals;
pub mod http_client;
pub mod market_data;
pub mod models;
pub mod normalizer;
pub mod numeric;
pub mod probability;
pub mod progress;
pub mod reasons;
pub mod retry;
pub mod screening;
