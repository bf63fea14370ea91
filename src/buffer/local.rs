use crate::buffer::{PreoccupyFlag, RegionSlot, ShuffleBuffer};
use crate::codec::block::{read_u32_le, take};
use crate::compression::{Compression, compress_into, decompress_into};
use crate::config::LocalBufferOptions;
use crate::{Error, Result};

/// Spill frame header: `[payload_len:u32][raw_len:u32]`.
const FRAME_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RegionState {
    owner: Option<u32>,
    /// Bytes of finished blocks at the start of the region.
    committed: u32,
    /// Bytes promised to the owner but not yet claimed by a block.
    preoccupied: u32,
}

/// In-memory [`ShuffleBuffer`]: a fixed arena cut into equal regions that
/// partitions claim one at a time. Flushing moves every finished block into a
/// per-partition spill stream of frames, compressing each frame when
/// configured.
#[derive(Debug, Clone)]
pub struct LocalShuffleBuffer {
    region_size: u32,
    arena: Vec<u8>,
    regions: Vec<RegionState>,
    current: Vec<Option<usize>>,
    next_free: usize,
    compression: Compression,
    spills: Vec<Vec<u8>>,
    scratch: Vec<u8>,
    flush_count: u64,
    buffer_count: u64,
}

impl LocalShuffleBuffer {
    pub fn new(partition_num: u32, options: &LocalBufferOptions) -> Result<Self> {
        options.validate()?;
        if partition_num == 0 {
            return Err(Error::Other("partition_num must be positive".to_string()));
        }
        let region_count = options.region_count as usize;
        let arena_len = (options.region_size as usize) * region_count;
        let mut arena = Vec::new();
        arena.try_reserve_exact(arena_len).map_err(|e| {
            Error::AllocationFailure(format!("shuffle buffer of {arena_len} bytes: {e}"))
        })?;
        arena.resize(arena_len, 0u8);

        Ok(Self {
            region_size: options.region_size,
            arena,
            regions: vec![RegionState::default(); region_count],
            current: vec![None; partition_num as usize],
            next_free: 0,
            compression: options.compression,
            spills: vec![Vec::new(); partition_num as usize],
            scratch: Vec::new(),
            flush_count: 0,
            buffer_count: 1,
        })
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn partition_num(&self) -> usize {
        self.current.len()
    }

    /// Number of flushes that produced output.
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    /// Number of buffers handed out, the initial one included.
    pub fn buffer_count(&self) -> u64 {
        self.buffer_count
    }

    /// Physical spill stream of a partition, frames included.
    pub fn partition_bytes(&self, partition_id: u32) -> Result<&[u8]> {
        self.spills
            .get(partition_id as usize)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Other(format!("no partition {partition_id}")))
    }

    /// Decodes a partition's spill frames back into its block stream.
    pub fn partition_blocks(&self, partition_id: u32) -> Result<Vec<u8>> {
        let bytes = self.partition_bytes(partition_id)?;
        let mut out = Vec::new();
        let mut pos = 0usize;
        while pos < bytes.len() {
            let payload_len = read_u32_le(bytes, &mut pos)? as usize;
            let raw_len = read_u32_le(bytes, &mut pos)? as usize;
            let payload = take(bytes, &mut pos, payload_len)?;
            let before = out.len();
            decompress_into(&mut out, payload, self.compression, raw_len)?;
            if out.len() - before != raw_len {
                return Err(Error::Compression(format!(
                    "spill frame expands to {} bytes, header says {raw_len}",
                    out.len() - before
                )));
            }
        }
        Ok(out)
    }

    fn region_start(&self, region: usize) -> usize {
        region * self.region_size as usize
    }

    fn claim_free_region(&mut self, partition_id: u32) -> Option<usize> {
        if self.next_free >= self.regions.len() {
            return None;
        }
        let region = self.next_free;
        self.next_free += 1;
        self.regions[region] = RegionState {
            owner: Some(partition_id),
            committed: 0,
            preoccupied: 0,
        };
        self.current[partition_id as usize] = Some(region);
        Some(region)
    }

    fn append_frame(&mut self, partition_id: u32, start: usize, len: usize) -> Result<u32> {
        self.scratch.clear();
        compress_into(
            &mut self.scratch,
            &self.arena[start..start + len],
            self.compression,
        )?;
        let payload_len: u32 = self
            .scratch
            .len()
            .try_into()
            .map_err(|_| Error::Other("spill frame too large".to_string()))?;
        let spill = &mut self.spills[partition_id as usize];
        spill.extend_from_slice(&payload_len.to_le_bytes());
        spill.extend_from_slice(&(len as u32).to_le_bytes());
        spill.extend_from_slice(&self.scratch);
        Ok(payload_len + FRAME_HEADER_LEN as u32)
    }
}

/// Adds one spill frame to the byte count a flush reports.
pub(crate) fn add_flushed_bytes(written: u32, frame: u32) -> Result<u32> {
    written.checked_add(frame).ok_or_else(|| {
        Error::Other(format!(
            "flushed bytes overflow u32: {written} + {frame}"
        ))
    })
}

impl ShuffleBuffer for LocalShuffleBuffer {
    fn preoccupied_data_space(
        &mut self,
        partition_id: u32,
        length: u32,
        new_region: bool,
    ) -> PreoccupyFlag {
        let pid = partition_id as usize;
        if pid >= self.current.len() {
            log::error!("preoccupy for unknown partition {partition_id}");
            return PreoccupyFlag::Lack;
        }
        if new_region {
            self.current[pid] = None;
        }

        let region = match self.current[pid] {
            Some(region) => region,
            None => match self.claim_free_region(partition_id) {
                Some(region) => region,
                None => return PreoccupyFlag::Lack,
            },
        };

        let state = &mut self.regions[region];
        let used = state.committed as u64 + state.preoccupied as u64;
        if used + length as u64 > self.region_size as u64 {
            return PreoccupyFlag::NewRegion;
        }
        state.preoccupied += length;
        PreoccupyFlag::Enough
    }

    fn get_end_address_of_region(
        &mut self,
        partition_id: u32,
        length: u32,
    ) -> Result<RegionSlot> {
        let region = self
            .current
            .get(partition_id as usize)
            .copied()
            .flatten()
            .ok_or_else(|| {
                Error::BufferProtocolViolation(format!(
                    "partition {partition_id} has no current region"
                ))
            })?;
        let start = self.region_start(region);
        let state = &mut self.regions[region];
        if length > state.preoccupied {
            return Err(Error::BufferProtocolViolation(format!(
                "partition {partition_id} claims {length} bytes but preoccupied {}",
                state.preoccupied
            )));
        }
        let offset = start + state.committed as usize;
        state.committed += length;
        state.preoccupied -= length;
        Ok(RegionSlot {
            region_id: region as u32,
            offset,
        })
    }

    fn arena_mut(&mut self) -> &mut [u8] {
        &mut self.arena
    }

    fn flush(&mut self, force: bool) -> Result<u32> {
        let pending: u64 = self.regions.iter().map(|r| r.preoccupied as u64).sum();
        if pending != 0 {
            return Err(Error::BufferProtocolViolation(format!(
                "flush with {pending} preoccupied bytes not yet written"
            )));
        }
        let has_data = self.regions[..self.next_free]
            .iter()
            .any(|r| r.committed > 0);
        if !has_data {
            if force {
                log::debug!("forced flush of an empty shuffle buffer");
            }
            return Ok(0);
        }

        let mut written: u32 = 0;
        for region in 0..self.next_free {
            let state = self.regions[region];
            let Some(owner) = state.owner else {
                continue;
            };
            if state.committed == 0 {
                continue;
            }
            let start = self.region_start(region);
            let frame = self.append_frame(owner, start, state.committed as usize)?;
            written = add_flushed_bytes(written, frame)?;
            self.regions[region].committed = 0;
        }
        self.flush_count += 1;
        Ok(written)
    }

    fn get_new_buffer(&mut self) -> Result<()> {
        if self.regions.iter().any(|r| r.committed > 0) {
            return Err(Error::BufferProtocolViolation(
                "new buffer requested before flushing written blocks".to_string(),
            ));
        }
        self.regions.fill(RegionState::default());
        self.current.fill(None);
        self.next_free = 0;
        self.buffer_count += 1;
        Ok(())
    }

    fn is_compress(&self) -> bool {
        self.compression.is_enabled()
    }

    fn region_size(&self) -> u32 {
        self.region_size
    }
}
