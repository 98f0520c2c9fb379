//! Top-level error type for node operations

use crate::config::ConfigError;
use crate::transfer::TransferError;
use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ConnectionState;

    #[test]
    fn transport_errors_convert_and_display() {
        let err: NodeError = TransportError::NotConnected {
            state: ConnectionState::Connecting,
        }
        .into();
        assert!(err.to_string().contains("Transport error"));
        assert!(err.to_string().contains("Connecting"));
    }

    #[test]
    fn transfer_errors_carry_the_block_index() {
        let err: NodeError = TransferError::Block {
            index: 4,
            source: TransportError::NotConnected {
                state: ConnectionState::Disconnected,
            },
        }
        .into();
        assert!(err.to_string().contains("block 4"));
    }
}
