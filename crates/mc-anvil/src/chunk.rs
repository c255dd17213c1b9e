use std::time::Duration;

use flate2::read::{GzDecoder, ZlibDecoder};
use mc_nbt::NamedTag;
use mc_protocol::ByteBuffer;
use std::io::Read;

use crate::{AnvilError, Result};

/// Load level meaning "not loaded"; lower levels are closer to fully ticking.
pub const UNLOADED_LEVEL: u32 = 34;

/// Compression scheme byte at the head of a chunk blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionScheme {
    Gzip,
    Zlib,
    None,
}

impl CompressionScheme {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Zlib),
            3 => Ok(Self::None),
            other => Err(AnvilError::UnsupportedCompression(other)),
        }
    }
}

/// Ticket types the loader recognizes. Enforcement of the resulting load
/// level is the gameplay core's business, not ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketType {
    Player,
    Forced,
    Start,
    Portal,
    Dragon,
    PostTeleport,
    Unknown,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub load_level: u32,
    pub ticket_type: TicketType,
    pub time_to_live: Option<Duration>,
}

#[derive(Debug, Clone)]
enum ChunkData {
    /// The sectored blob exactly as read from the region file.
    Raw(Vec<u8>),
    Parsed(NamedTag),
}

/// One 16×16 chunk column, addressed by world chunk coordinates.
#[derive(Debug, Clone)]
pub struct Chunk {
    x: i32,
    z: i32,
    timestamp: u32,
    load_level: u32,
    ticket: Option<Ticket>,
    data: ChunkData,
}

impl Chunk {
    pub(crate) fn new(x: i32, z: i32, timestamp: u32, blob: Vec<u8>) -> Self {
        Self {
            x,
            z,
            timestamp,
            load_level: UNLOADED_LEVEL,
            ticket: None,
            data: ChunkData::Raw(blob),
        }
    }

    #[must_use]
    pub fn x(&self) -> i32 {
        self.x
    }

    #[must_use]
    pub fn z(&self) -> i32 {
        self.z
    }

    /// Last-modified epoch seconds from the region header table.
    #[must_use]
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    #[must_use]
    pub fn load_level(&self) -> u32 {
        self.load_level
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.data, ChunkData::Parsed(_))
    }

    /// The parsed chunk root, once [`load`](Self::load) has run.
    #[must_use]
    pub fn nbt(&self) -> Option<&NamedTag> {
        match &self.data {
            ChunkData::Parsed(tag) => Some(tag),
            ChunkData::Raw(_) => None,
        }
    }

    /// Decompresses the raw blob and parses the chunk NBT root.
    ///
    /// This is the expensive half of chunk loading and should only run for
    /// chunks actually in range of someone. A second call is a no-op.
    pub fn load(&mut self) -> Result<()> {
        let ChunkData::Raw(blob) = &self.data else {
            return Ok(());
        };
        let mut buffer = ByteBuffer::wrap(blob.clone());
        let declared = buffer.read_i32()?;
        if declared < 1 {
            return Err(AnvilError::TruncatedChunk {
                declared: declared.max(0) as usize,
                actual: buffer.remaining(),
            });
        }
        let declared = declared as usize;
        let scheme = CompressionScheme::from_byte(buffer.read_u8()?)?;
        if declared - 1 > buffer.remaining() {
            return Err(AnvilError::TruncatedChunk {
                declared: declared - 1,
                actual: buffer.remaining(),
            });
        }
        let payload = buffer.read(declared - 1)?;
        let plain = match scheme {
            CompressionScheme::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(payload).read_to_end(&mut out)?;
                out
            }
            CompressionScheme::Zlib => {
                let mut out = Vec::new();
                ZlibDecoder::new(payload).read_to_end(&mut out)?;
                out
            }
            CompressionScheme::None => payload.to_vec(),
        };
        let mut nbt_buffer = ByteBuffer::wrap(plain);
        let root = mc_nbt::read_nbt(&mut nbt_buffer, false)?;
        self.data = ChunkData::Parsed(root);
        Ok(())
    }

    /// Registers a load-level ticket for this chunk.
    ///
    /// Only bookkeeping happens here: the level is validated and recorded
    /// together with the most recent ticket. Scheduling against tickets is
    /// out of scope for the loader.
    pub fn ticket(
        &mut self,
        load_level: u32,
        ticket_type: TicketType,
        time_to_live: Option<Duration>,
    ) -> Result<()> {
        if load_level > UNLOADED_LEVEL {
            return Err(AnvilError::InvalidLoadLevel(load_level));
        }
        self.load_level = load_level;
        self.ticket = Some(Ticket {
            load_level,
            ticket_type,
            time_to_live,
        });
        Ok(())
    }

    #[must_use]
    pub fn last_ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }
}
