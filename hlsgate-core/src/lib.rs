pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod models;
pub mod net;
pub mod resilience;

pub use config::Config;
pub use models::StreamStatus;
