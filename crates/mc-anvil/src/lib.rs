//! Reader for Minecraft's region ("anvil", `.mca`) world files.
//!
//! A region file covers 32×32 chunks. The first 4096 bytes hold 1024
//! location entries (3-byte sector offset + 1-byte sector count), the next
//! 4096 the per-chunk timestamps. Each chunk blob is a big-endian payload
//! length, one compression-scheme byte, and the compressed chunk NBT.

use thiserror::Error;

mod chunk;
mod region;

pub use chunk::{Chunk, CompressionScheme, Ticket, TicketType, UNLOADED_LEVEL};
pub use region::{Region, RegionPos, World};

/// Size in bytes of one region-file sector; offsets and counts use it as
/// their unit.
pub const SECTOR_SIZE: usize = 4096;

/// The location and timestamp tables together.
pub const HEADER_SIZE: usize = 2 * SECTOR_SIZE;

/// Chunk slots per region (32 × 32).
pub const CHUNKS_PER_REGION: usize = 1024;

#[derive(Error, Debug)]
pub enum AnvilError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("NBT error: {0}")]
    Nbt(#[from] mc_nbt::NbtError),
    #[error(transparent)]
    Buffer(#[from] mc_protocol::BufferError),
    #[error("unsupported chunk compression scheme: {0}")]
    UnsupportedCompression(u8),
    #[error("chunk blob truncated: declared {declared} bytes, {actual} present")]
    TruncatedChunk { declared: usize, actual: usize },
    #[error("invalid load level {0}, maximum is 34")]
    InvalidLoadLevel(u32),
}

pub type Result<T> = std::result::Result<T, AnvilError>;
