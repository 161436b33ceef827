pub mod bids;
pub mod client;
pub mod config;
pub mod domain;
pub mod execution;
pub mod logging;
pub mod monitor;
pub mod registry;
pub mod scoring;
pub mod store;
pub mod wallet;
