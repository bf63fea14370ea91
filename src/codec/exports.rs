use crate::Result;
use crate::batch::VectorBatch;
use crate::buffer::local::LocalShuffleBuffer;
use crate::config::{LocalBufferOptions, SplitterOptions};
use crate::shuffle::merge_reader::BatchMerger;
use crate::shuffle::splitter::RowPacker;

/// Splits every batch into a fresh in-memory buffer and stops the packer.
pub fn split_into_local_buffer<I>(
    options: &SplitterOptions,
    buffer_options: &LocalBufferOptions,
    batches: I,
) -> Result<RowPacker<LocalShuffleBuffer>>
where
    I: IntoIterator<Item = VectorBatch>,
{
    let buffer = LocalShuffleBuffer::new(options.partition_num, buffer_options)?;
    let mut packer = RowPacker::new(options, buffer)?;
    for batch in batches {
        packer.split(batch)?;
    }
    packer.stop()?;
    Ok(packer)
}

/// Merges a whole partition block stream into batches bounded by
/// `max_row_num` rows and `max_size` block bytes each.
pub fn merge_blocks(
    type_ids: &[i32],
    blocks: &[u8],
    max_row_num: u32,
    max_size: u32,
) -> Result<Vec<VectorBatch>> {
    let mut merger = BatchMerger::new(type_ids)?;
    let mut out = Vec::new();
    loop {
        let status = merger.get_merge_vector_batch(blocks, max_row_num, max_size)?;
        if merger.merged_block_count() > 0 {
            out.push(merger.take_vector_batch()?);
        }
        if status.exhausted {
            break;
        }
    }
    Ok(out)
}

/// Decodes and merges one partition of a flushed local buffer.
pub fn merge_local_partition(
    buffer: &LocalShuffleBuffer,
    partition_id: u32,
    type_ids: &[i32],
    max_row_num: u32,
    max_size: u32,
) -> Result<Vec<VectorBatch>> {
    let blocks = buffer.partition_blocks(partition_id)?;
    merge_blocks(type_ids, &blocks, max_row_num, max_size)
}
