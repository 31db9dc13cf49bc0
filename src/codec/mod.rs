//! Pluggable payload codecs: serialization formats and compressors, each
//! identified by a one-byte wire code.

pub mod compress;
pub mod serialize;

pub use compress::{Compressor, CompressorRegistry, Identity, Lz4, Zstd};
pub use serialize::{PayloadFormat, SerializerRegistry};
