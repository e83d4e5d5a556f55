pub mod config;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod refresh;
pub mod scripts;
pub mod server;
