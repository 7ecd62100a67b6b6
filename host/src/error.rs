use rawlink::{ChannelError, ConfigError};
use thiserror::Error;

/// Errors surfaced by the host-side simulation
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Radio channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("Payload of {0} bytes cannot be framed")]
    InvalidPayload(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Node has shut down")]
    Disconnected,
}
