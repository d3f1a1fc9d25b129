pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod http_client;
pub mod model;
pub mod pacing;
pub mod pipeline;
pub mod resolve;
pub mod round;
pub mod sink;
pub mod store;
pub mod summary;
