//! # Error Types
//!
//! Error handling for the RPC framework.
//!
//! This module defines all error variants that can occur during RPC operations,
//! from low-level I/O failures to codec mismatches and application errors
//! reported by remote handlers.
//!
//! ## Error Categories
//! - **Transport errors**: connection refused, read/write failure; fatal to the
//!   current call, the connection is discarded rather than pooled again
//! - **Protocol errors**: malformed frames, length mismatches; fatal to the connection
//! - **Codec errors**: unsupported serializer/compressor codes, encode/decode failures;
//!   the connection remains usable
//! - **Application errors**: the invoked handler returned an error; carried verbatim
//!   as a string in the response's error field
//! - **Cancellation**: context cancelled or deadline exceeded
//!
//! All errors implement `std::error::Error` for interoperability.

use std::io;
use thiserror::Error;

/// Error message constants shared between client and server.
/// Dispatch failures travel on the wire as plain strings, so both sides
/// must agree on the exact text.
pub mod constants {
    /// Dispatch errors written into the response error field
    pub const ERR_SERVICE_NOT_FOUND: &str = "micro: service not found";
    pub const ERR_METHOD_NOT_FOUND: &str = "micro: method not found";
    pub const ERR_DEADLINE_EXCEEDED: &str = "micro: context deadline exceeded";

    /// Framing errors
    pub const ERR_SHORT_PREFIX: &str = "could not read full length prefix";
    pub const ERR_FRAME_UNDERSIZED: &str = "frame shorter than fixed header";
}

/// RpcError is the primary error type for all framework operations
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Unsupported serializer code: {0}")]
    UnsupportedSerializer(u8),

    #[error("Unsupported compressor code: {0}")]
    UnsupportedCompressor(u8),

    #[error("Serialize error ({format}): {source_msg}")]
    SerializeError { format: &'static str, source_msg: String },

    #[error("Deserialize error ({format}): {source_msg}")]
    DeserializeError { format: &'static str, source_msg: String },

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    /// Error reported by the remote side, carried verbatim in the response
    /// error field. Dispatch failures and handler errors share this channel;
    /// callers can only tell them apart by string content, so the message is
    /// displayed without decoration.
    #[error("{0}")]
    Server(String),

    #[error("Call cancelled")]
    Cancelled,

    #[error("Context deadline exceeded")]
    DeadlineExceeded,

    #[error("Timed out waiting for a pooled connection")]
    PoolTimeout,

    #[error("Invalid metadata value for {key:?}: {value:?}")]
    InvalidMetadata { key: String, value: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl RpcError {
    /// Whether the connection that produced this error must be discarded
    /// instead of returned to the pool. Transport and protocol errors poison
    /// the connection; everything else leaves it usable.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::Io(_)
                | RpcError::ConnectionClosed
                | RpcError::MalformedMessage(_)
                | RpcError::FrameTooLarge(_)
        )
    }
}

/// Type alias for Results using RpcError
pub type Result<T> = std::result::Result<T, RpcError>;
