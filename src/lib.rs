// velvet-gateway - Session-scoped image generation gateway
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod orchestrator;
pub mod server;
pub mod session;
pub mod storage;
pub mod upstream;
pub mod utils;
