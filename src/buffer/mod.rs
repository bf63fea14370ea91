pub mod local;

use crate::Result;

/// Outcome of asking the buffer for space on behalf of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreoccupyFlag {
    /// Space reserved in the partition's current region.
    Enough,
    /// The partition's current region is full; drain it and ask again with a
    /// forced new region.
    NewRegion,
    /// The whole buffer is full; drain everything, flush, take a new buffer.
    Lack,
}

/// Where a drained block is written: arena offset of the reserved span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSlot {
    pub region_id: u32,
    pub offset: usize,
}

/// Shared, region-partitioned memory a row packer writes blocks into.
///
/// The packer reserves bytes row by row through `preoccupied_data_space` and
/// later claims exactly the reserved total for one block with
/// `get_end_address_of_region`, writing it through `arena_mut`.
pub trait ShuffleBuffer {
    fn preoccupied_data_space(
        &mut self,
        partition_id: u32,
        length: u32,
        new_region: bool,
    ) -> PreoccupyFlag;

    fn get_end_address_of_region(&mut self, partition_id: u32, length: u32)
    -> Result<RegionSlot>;

    fn arena_mut(&mut self) -> &mut [u8];

    /// Persists every written block; returns the physical (possibly
    /// compressed) bytes produced. `force` flushes even a nearly empty buffer.
    fn flush(&mut self, force: bool) -> Result<u32>;

    fn get_new_buffer(&mut self) -> Result<()>;

    fn is_compress(&self) -> bool;

    fn region_size(&self) -> u32;
}

impl<B: ShuffleBuffer + ?Sized> ShuffleBuffer for &mut B {
    fn preoccupied_data_space(
        &mut self,
        partition_id: u32,
        length: u32,
        new_region: bool,
    ) -> PreoccupyFlag {
        (**self).preoccupied_data_space(partition_id, length, new_region)
    }

    fn get_end_address_of_region(
        &mut self,
        partition_id: u32,
        length: u32,
    ) -> Result<RegionSlot> {
        (**self).get_end_address_of_region(partition_id, length)
    }

    fn arena_mut(&mut self) -> &mut [u8] {
        (**self).arena_mut()
    }

    fn flush(&mut self, force: bool) -> Result<u32> {
        (**self).flush(force)
    }

    fn get_new_buffer(&mut self) -> Result<()> {
        (**self).get_new_buffer()
    }

    fn is_compress(&self) -> bool {
        (**self).is_compress()
    }

    fn region_size(&self) -> u32 {
        (**self).region_size()
    }
}
