//! Per-connection error taxonomy.
//!
//! A `ConnectionError` closes its own connection; the listener and every
//! other connection keep running. Failed decodes are never retried.

use mc_protocol::BufferError;
use thiserror::Error;

use crate::protocol::ConnectionState;

/// Unexpected bytes, values or structure in an otherwise readable stream.
#[derive(Error, Debug)]
pub enum ProtocolViolation {
    #[error("unexpected packet id {id:#04x} in state {state}")]
    UnexpectedPacket { state: ConnectionState, id: i32 },
    #[error("packet id {id:#04x} in state {state} is not implemented")]
    UnsupportedPacket { state: ConnectionState, id: i32 },
    #[error("invalid next state: {0}")]
    InvalidNextState(i32),
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
    #[error("compressed frame of {length} bytes is below the {threshold} byte threshold")]
    CompressedBelowThreshold { length: usize, threshold: i32 },
    #[error("bundle of {0} packets exceeds the 4096 entry limit")]
    BundleTooLarge(usize),
    #[error("bundle delimiters are only legal in the play state")]
    BundleOutsidePlay,
    #[error("expected finish-configuration acknowledgement, got packet {0:#04x}")]
    MissingConfigurationAck(i32),
}

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("verify token mismatch")]
    VerifyTokenMismatch,
    #[error(transparent)]
    Crypto(#[from] mc_crypto::CryptoError),
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolViolation),
    /// A structurally well-formed frame whose typed decode failed.
    #[error("corrupted packet data: {0}")]
    Corrupted(#[from] BufferError),
    #[error("encryption failure: {0}")]
    Encryption(#[from] EncryptionError),
    #[error("connection closed by peer")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

impl From<mc_crypto::CryptoError> for ConnectionError {
    fn from(err: mc_crypto::CryptoError) -> Self {
        Self::Encryption(EncryptionError::Crypto(err))
    }
}
