// Quiver Core - Domain Logic & Ports
// No network code: brokers plug in through `port::BrokerClient`

pub mod application;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
