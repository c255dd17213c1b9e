use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};
use tracing::debug;

use crate::chunk::Chunk;
use crate::{CHUNKS_PER_REGION, Result, SECTOR_SIZE};

/// A region coordinate; each region spans 32×32 chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    #[must_use]
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// The region containing the given world chunk coordinates.
    #[must_use]
    pub fn from_chunk(chunk_x: i32, chunk_z: i32) -> Self {
        Self {
            x: chunk_x >> 5,
            z: chunk_z >> 5,
        }
    }

    /// `r.<X>.<Z>.mca` under `<world_root>/region/`.
    #[must_use]
    pub fn file_path(&self, world_root: &Path) -> PathBuf {
        world_root
            .join("region")
            .join(format!("r.{}.{}.mca", self.x, self.z))
    }
}

/// One loaded region: the non-vacant chunk slots of a single `.mca` file,
/// each holding its raw blob until `Chunk::load` is called.
#[derive(Debug)]
pub struct Region {
    pos: RegionPos,
    chunks: HashMap<(i32, i32), Chunk>,
}

impl Region {
    /// Reads the region file for `pos`, mapping every occupied slot into a
    /// [`Chunk`] holding its raw blob. Cheap relative to `Chunk::load`,
    /// which does the decompression.
    pub fn load(world_root: &Path, pos: RegionPos) -> Result<Self> {
        let mut file = File::open(pos.file_path(world_root))?;

        let mut locations = [0u8; SECTOR_SIZE];
        file.read_exact(&mut locations)?;
        let mut timestamps = [0u32; CHUNKS_PER_REGION];
        for ts in &mut timestamps {
            *ts = file.read_u32::<BigEndian>()?;
        }

        let mut chunks = HashMap::new();
        for i in 0..CHUNKS_PER_REGION {
            let entry = &locations[i * 4..i * 4 + 4];
            let sector_offset =
                ((entry[0] as u64) << 16) | ((entry[1] as u64) << 8) | entry[2] as u64;
            let sector_count = entry[3] as u64;
            if sector_offset == 0 {
                continue; // vacant slot
            }
            file.seek(SeekFrom::Start(sector_offset * SECTOR_SIZE as u64))?;
            let mut blob = vec![0u8; sector_count as usize * SECTOR_SIZE];
            file.read_exact(&mut blob)?;

            let chunk_x = pos.x * 32 + (i as i32 % 32);
            let chunk_z = pos.z * 32 + (i as i32 / 32);
            chunks.insert(
                (chunk_x, chunk_z),
                Chunk::new(chunk_x, chunk_z, timestamps[i], blob),
            );
        }
        debug!(
            region_x = pos.x,
            region_z = pos.z,
            chunks = chunks.len(),
            "region loaded"
        );
        Ok(Self { pos, chunks })
    }

    #[must_use]
    pub fn pos(&self) -> RegionPos {
        self.pos
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Looks up a chunk by world chunk coordinates.
    #[must_use]
    pub fn chunk(&self, x: i32, z: i32) -> Option<&Chunk> {
        self.chunks.get(&(x, z))
    }

    pub fn chunk_mut(&mut self, x: i32, z: i32) -> Option<&mut Chunk> {
        self.chunks.get_mut(&(x, z))
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }
}

/// The set of loaded regions for one world directory.
///
/// Chunk lookups derive the owning region from `(x >> 5, z >> 5)`. Regions
/// are loaded explicitly; this type deliberately has no global instance.
#[derive(Debug)]
pub struct World {
    root: PathBuf,
    regions: HashMap<RegionPos, Region>,
}

impl World {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            regions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads (or returns the already-loaded) region at `pos`.
    pub fn load_region(&mut self, pos: RegionPos) -> Result<&mut Region> {
        if !self.regions.contains_key(&pos) {
            let region = Region::load(&self.root, pos)?;
            self.regions.insert(pos, region);
        }
        Ok(self.regions.get_mut(&pos).expect("region just inserted"))
    }

    /// Loads the region containing the given world chunk coordinates.
    pub fn load_region_for_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<&mut Region> {
        self.load_region(RegionPos::from_chunk(chunk_x, chunk_z))
    }

    /// The chunk at world coordinates, if its region has been loaded and the
    /// slot is occupied.
    #[must_use]
    pub fn chunk(&self, x: i32, z: i32) -> Option<&Chunk> {
        self.regions
            .get(&RegionPos::from_chunk(x, z))
            .and_then(|region| region.chunk(x, z))
    }

    pub fn chunk_mut(&mut self, x: i32, z: i32) -> Option<&mut Chunk> {
        self.regions
            .get_mut(&RegionPos::from_chunk(x, z))
            .and_then(|region| region.chunk_mut(x, z))
    }
}
