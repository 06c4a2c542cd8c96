pub mod aggregate;
pub mod campaigns;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod indexer;
pub mod output;
pub mod pools;
pub mod rewards;
pub mod server;
pub mod store;
pub mod types;
