//! # Payload Compression
//!
//! Pluggable compressors, negotiated per message via a one-byte code.
//!
//! ## Implementations
//! - [`Identity`] (code 0): no-op passthrough, the pre-registered default
//! - [`Zstd`] (code 1): streaming compression with a bounded-output
//!   decompression loop
//! - [`Lz4`] (code 2): size-prepended block format with claimed-size
//!   validation before allocation
//!
//! Decompression of untrusted payloads enforces [`MAX_DECOMPRESSION_SIZE`] so
//! a hostile frame cannot claim a multi-gigabyte output and exhaust memory.

use std::sync::Arc;

use crate::error::{Result, RpcError};
use crate::protocol::frame::MAX_FRAME_SIZE;

/// Maximum output size for decompression, aligned with the frame size limit.
pub const MAX_DECOMPRESSION_SIZE: usize = MAX_FRAME_SIZE;

/// A payload transform identified by a one-byte wire code.
pub trait Compressor: Send + Sync {
    /// The wire code identifying this compressor
    fn code(&self) -> u8;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// No-op compressor: payload bytes pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Compressor for Identity {
    fn code(&self) -> u8 {
        0
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Streaming zstd compressor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zstd;

impl Compressor for Zstd {
    fn code(&self) -> u8 {
        1
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        zstd::stream::copy_encode(data, &mut out, 1).map_err(|_| RpcError::CompressionFailure)?;
        Ok(out)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut reader =
            zstd::stream::Decoder::new(data).map_err(|_| RpcError::DecompressionFailure)?;

        // Read in chunks so the size limit is enforced as output grows.
        use std::io::Read;
        let mut out = Vec::new();
        let mut buffer = [0u8; 8192];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    out.extend_from_slice(&buffer[..n]);
                    if out.len() > MAX_DECOMPRESSION_SIZE {
                        return Err(RpcError::DecompressionFailure);
                    }
                }
                Err(_) => return Err(RpcError::DecompressionFailure),
            }
        }
        Ok(out)
    }
}

/// LZ4 block compressor using the size-prepended format.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4;

impl Compressor for Lz4 {
    fn code(&self) -> u8 {
        2
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        // Validate the claimed output size before lz4_flex attempts the
        // allocation (4-byte little-endian prefix).
        if data.len() < 4 {
            return Err(RpcError::DecompressionFailure);
        }
        let claimed_size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if claimed_size > MAX_DECOMPRESSION_SIZE {
            return Err(RpcError::DecompressionFailure);
        }

        let decompressed = lz4_flex::decompress_size_prepended(data)
            .map_err(|_| RpcError::DecompressionFailure)?;
        if decompressed.len() > MAX_DECOMPRESSION_SIZE {
            return Err(RpcError::DecompressionFailure);
        }
        Ok(decompressed)
    }
}

/// Maps one-byte wire codes to compressor implementations.
///
/// Registering under a taken code silently replaces the previous entry (last
/// writer wins). Lookup of an unregistered code is an `UnsupportedCompressor`
/// error.
pub struct CompressorRegistry {
    slots: Vec<Option<Arc<dyn Compressor>>>,
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressorRegistry {
    /// An empty registry with the identity compressor pre-registered at code 0.
    pub fn new() -> Self {
        let mut registry = Self {
            slots: vec![None; 256],
        };
        registry.register(Arc::new(Identity));
        registry
    }

    /// Register a compressor under its own code. Last writer wins.
    pub fn register(&mut self, compressor: Arc<dyn Compressor>) {
        let code = compressor.code() as usize;
        self.slots[code] = Some(compressor);
    }

    /// Resolve a wire code to its registered compressor.
    pub fn lookup(&self, code: u8) -> Result<Arc<dyn Compressor>> {
        self.slots[code as usize]
            .clone()
            .ok_or(RpcError::UnsupportedCompressor(code))
    }
}
