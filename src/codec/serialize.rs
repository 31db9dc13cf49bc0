//! # Payload Serialization
//!
//! Serialization formats for request and response payloads, negotiated per
//! message via a one-byte code in the frame header.
//!
//! ## Formats
//! - **JSON** (code 0, default): human-readable, general-purpose
//! - **Bincode** (code 1): compact binary; rejects values its data model
//!   cannot express with a distinct error instead of silently falling back
//!
//! Both sides of a connection resolve the code through a [`SerializerRegistry`];
//! a code with no registered format is a hard error, never a default.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, RpcError};

/// Supported payload serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    /// Human-readable JSON format (default)
    #[default]
    Json,
    /// Compact binary format
    Bincode,
}

impl PayloadFormat {
    /// The wire code identifying this format
    pub fn code(self) -> u8 {
        match self {
            PayloadFormat::Json => 0,
            PayloadFormat::Bincode => 1,
        }
    }

    /// Resolve a format from its wire code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PayloadFormat::Json),
            1 => Some(PayloadFormat::Bincode),
            _ => None,
        }
    }

    /// Human-readable name, used in error messages
    pub fn name(self) -> &'static str {
        match self {
            PayloadFormat::Json => "JSON",
            PayloadFormat::Bincode => "Bincode",
        }
    }

    /// Serialize a value to payload bytes
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            PayloadFormat::Json => serde_json::to_vec(value).map_err(|e| {
                RpcError::SerializeError {
                    format: self.name(),
                    source_msg: e.to_string(),
                }
            }),
            PayloadFormat::Bincode => bincode::serialize(value).map_err(|e| {
                RpcError::SerializeError {
                    format: self.name(),
                    source_msg: e.to_string(),
                }
            }),
        }
    }

    /// Deserialize payload bytes into a value
    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            PayloadFormat::Json => serde_json::from_slice(data).map_err(|e| {
                RpcError::DeserializeError {
                    format: self.name(),
                    source_msg: e.to_string(),
                }
            }),
            PayloadFormat::Bincode => bincode::deserialize(data).map_err(|e| {
                RpcError::DeserializeError {
                    format: self.name(),
                    source_msg: e.to_string(),
                }
            }),
        }
    }
}

/// Maps one-byte wire codes to serialization formats.
///
/// Registering a format under a code that is already taken silently replaces
/// the previous entry (last writer wins). Lookup of an unregistered code is an
/// `UnsupportedSerializer` error.
pub struct SerializerRegistry {
    slots: [Option<PayloadFormat>; 256],
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializerRegistry {
    /// An empty registry with JSON pre-registered under its fixed code.
    pub fn new() -> Self {
        let mut registry = Self { slots: [None; 256] };
        registry.register(PayloadFormat::Json);
        registry
    }

    /// Register a format under its own code. Last writer wins.
    pub fn register(&mut self, format: PayloadFormat) {
        self.slots[format.code() as usize] = Some(format);
    }

    /// Resolve a wire code to its registered format.
    pub fn lookup(&self, code: u8) -> Result<PayloadFormat> {
        self.slots[code as usize].ok_or(RpcError::UnsupportedSerializer(code))
    }
}
