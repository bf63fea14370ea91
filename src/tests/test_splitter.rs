use crate::Error;
use crate::Result;
use crate::batch::{ColumnVector, VectorBatch, VectorValues};
use crate::buffer::{PreoccupyFlag, RegionSlot, ShuffleBuffer};
use crate::config::SplitterOptions;
use crate::shuffle::merge_reader::BatchMerger;
use crate::shuffle::splitter::RowPacker;
use crate::tests::support::{block_headers, local_buffer, partitioned_batch};

fn int_batch(values: &[i32]) -> VectorBatch {
    VectorBatch::new(vec![ColumnVector::plain(VectorValues::from_i32s(values))]).unwrap()
}

fn merged_ints(blocks: &[u8]) -> Vec<i32> {
    let mut merger = BatchMerger::new(&[1]).unwrap();
    merger
        .get_merge_vector_batch(blocks, u32::MAX, u32::MAX)
        .unwrap();
    let batch = merger.take_vector_batch().unwrap();
    (0..batch.row_count)
        .map(|row| match &batch.vectors[0] {
            ColumnVector::Plain { values, .. } => values.i32_at(row).unwrap(),
            ColumnVector::Dictionary { .. } => panic!("merged output is plain"),
        })
        .collect()
}

#[test]
fn region_rollover_closes_the_block_at_the_boundary() {
    // header 8 + four int rows of 5 bytes fill a region exactly
    let options = SplitterOptions::new("single", 1, vec![1]).unwrap();
    let mut packer = RowPacker::new(&options, local_buffer(1, 28, 4)).unwrap();

    packer.split(int_batch(&[1, 2, 3, 4, 5, 6])).unwrap();
    packer.stop().unwrap();

    assert_eq!(packer.metrics().region_rollovers, 1);
    assert_eq!(packer.metrics().blocks_written, 2);
    assert_eq!(packer.partition_lengths(), &[28 + 18]);
    assert_eq!(packer.total_write_bytes(), 46);

    let blocks = packer.buffer().partition_blocks(0).unwrap();
    let headers: Vec<(u32, u32)> = block_headers(&blocks)
        .iter()
        .map(|h| (h.length, h.row_count))
        .collect();
    assert_eq!(headers, vec![(28, 4), (18, 2)]);
    assert_eq!(merged_ints(&blocks), vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn buffer_exhaustion_drains_every_partition_first() {
    let options = SplitterOptions::new("hash", 2, vec![1]).unwrap();
    let mut packer = RowPacker::new(&options, local_buffer(2, 28, 2)).unwrap();

    let pids: Vec<i32> = (0..12).map(|row| row % 2).collect();
    let values: Vec<i32> = (0..12).map(|row| row * 10).collect();
    let batch = partitioned_batch(
        &pids,
        vec![ColumnVector::plain(VectorValues::from_i32s(&values))],
    );
    packer.split(batch).unwrap();
    packer.stop().unwrap();

    assert_eq!(packer.metrics().region_rollovers, 1);
    assert_eq!(packer.metrics().buffer_replacements, 1);
    assert_eq!(packer.metrics().blocks_written, 4);
    assert_eq!(packer.buffer().buffer_count(), 2);
    assert_eq!(packer.buffer().flush_count(), 2);

    for partition in 0..2u32 {
        let blocks = packer.buffer().partition_blocks(partition).unwrap();
        let rows: Vec<u32> = block_headers(&blocks).iter().map(|h| h.row_count).collect();
        assert_eq!(rows, vec![4, 2]);
        let expected: Vec<i32> = (0..12)
            .filter(|row| row % 2 == partition as i32)
            .map(|row| row * 10)
            .collect();
        assert_eq!(merged_ints(&blocks), expected);
    }
    assert_eq!(packer.partition_lengths(), &[46, 46]);
}

#[test]
fn row_larger_than_a_region_is_fatal() {
    let options = SplitterOptions::new("single", 1, vec![15]).unwrap();
    let mut packer = RowPacker::new(&options, local_buffer(1, 32, 2)).unwrap();

    let long = "x".repeat(30);
    let batch = VectorBatch::new(vec![ColumnVector::plain(
        VectorValues::from_bytes(&["ab", long.as_str()]).unwrap(),
    )])
    .unwrap();
    let err = packer.split(batch).unwrap_err();
    assert_eq!(
        err,
        Error::RowTooLarge {
            row: 1,
            length: 5 + 30 + 12,
            region_size: 32,
        }
    );
}

#[test]
fn partition_id_must_be_in_range() {
    let options = SplitterOptions::new("range", 2, vec![1]).unwrap();
    let mut packer = RowPacker::new(&options, local_buffer(2, 256, 4)).unwrap();
    let batch = partitioned_batch(
        &[1, 5],
        vec![ColumnVector::plain(VectorValues::from_i32s(&[0, 0]))],
    );
    let err = packer.split(batch).unwrap_err();
    assert_eq!(
        err,
        Error::Other("partition id 5 of row 1 out of range 0..2".to_string())
    );
}

#[test]
fn batch_must_carry_partition_column_when_partitioned() {
    let options = SplitterOptions::new("hash", 2, vec![1]).unwrap();
    let mut packer = RowPacker::new(&options, local_buffer(2, 256, 4)).unwrap();
    let err = packer.split(int_batch(&[1, 2])).unwrap_err();
    assert_eq!(
        err,
        Error::Other("vector batch has 1 vectors, expected 2".to_string())
    );
}

#[test]
fn row_length_counts_values_and_fixed_overhead() {
    let options = SplitterOptions::new("single", 1, vec![1, 15, 7]).unwrap();
    let packer = RowPacker::new(&options, local_buffer(1, 256, 4)).unwrap();
    let batch = VectorBatch::new(vec![
        ColumnVector::plain(VectorValues::from_i32s(&[1, 2])),
        ColumnVector::plain(VectorValues::from_bytes(&["", "hello"]).unwrap()),
        ColumnVector::plain(VectorValues::from_i128s(&[3, 4])),
    ])
    .unwrap();
    assert_eq!(packer.row_length_in_bytes(&batch, 0).unwrap(), 27);
    assert_eq!(packer.row_length_in_bytes(&batch, 1).unwrap(), 32);
}

/// Answers every reservation with a fixed flag and counts calls.
#[derive(Debug, Default)]
struct ScriptedBuffer {
    flag: Option<PreoccupyFlag>,
    arena: Vec<u8>,
    preoccupy_calls: u32,
    flushes: u32,
    new_buffers: u32,
}

impl ShuffleBuffer for ScriptedBuffer {
    fn preoccupied_data_space(&mut self, _: u32, _: u32, _: bool) -> PreoccupyFlag {
        self.preoccupy_calls += 1;
        self.flag.unwrap_or(PreoccupyFlag::Enough)
    }

    fn get_end_address_of_region(&mut self, _: u32, _: u32) -> Result<RegionSlot> {
        Ok(RegionSlot {
            region_id: 0,
            offset: 0,
        })
    }

    fn arena_mut(&mut self) -> &mut [u8] {
        &mut self.arena
    }

    fn flush(&mut self, _: bool) -> Result<u32> {
        self.flushes += 1;
        Ok(0)
    }

    fn get_new_buffer(&mut self) -> Result<()> {
        self.new_buffers += 1;
        Ok(())
    }

    fn is_compress(&self) -> bool {
        false
    }

    fn region_size(&self) -> u32 {
        1024
    }
}

#[test]
fn repeated_new_region_for_one_row_is_a_protocol_violation() {
    let options = SplitterOptions::new("single", 1, vec![1]).unwrap();
    let mut buffer = ScriptedBuffer {
        flag: Some(PreoccupyFlag::NewRegion),
        ..ScriptedBuffer::default()
    };
    let mut packer = RowPacker::new(&options, &mut buffer).unwrap();
    let err = packer.split(int_batch(&[1])).unwrap_err();
    assert_eq!(
        err,
        Error::BufferProtocolViolation(
            "partition 0 asked for a new region twice for row 0".to_string()
        )
    );
    drop(packer);
    assert_eq!(buffer.preoccupy_calls, 2);
}

#[test]
fn lack_after_a_fresh_buffer_is_a_protocol_violation() {
    let options = SplitterOptions::new("single", 1, vec![1]).unwrap();
    let mut buffer = ScriptedBuffer {
        flag: Some(PreoccupyFlag::Lack),
        ..ScriptedBuffer::default()
    };
    let mut packer = RowPacker::new(&options, &mut buffer).unwrap();
    let err = packer.split(int_batch(&[1])).unwrap_err();
    assert_eq!(
        err,
        Error::BufferProtocolViolation(
            "a fresh buffer has no space for row 0 of partition 0".to_string()
        )
    );
    drop(packer);
    assert_eq!(buffer.flushes, 1);
    assert_eq!(buffer.new_buffers, 1);
}

#[test]
fn slot_outside_the_arena_is_a_protocol_violation() {
    let options = SplitterOptions::new("single", 1, vec![1]).unwrap();
    let mut packer = RowPacker::new(&options, ScriptedBuffer::default()).unwrap();
    let err = packer.split(int_batch(&[1])).unwrap_err();
    assert_eq!(
        err,
        Error::BufferProtocolViolation("region 0 slot 0..13 outside the buffer".to_string())
    );
}

#[test]
fn blocks_are_written_into_a_borrowed_buffer() {
    let options = SplitterOptions::new("single", 1, vec![1]).unwrap();
    let mut buffer = ScriptedBuffer {
        arena: vec![0u8; 64],
        ..ScriptedBuffer::default()
    };
    let mut packer = RowPacker::new(&options, &mut buffer).unwrap();
    packer.split(int_batch(&[-3, 9])).unwrap();
    packer.stop().unwrap();
    assert_eq!(packer.total_write_bytes(), 18);
    drop(packer);

    assert_eq!(buffer.flushes, 1);
    assert_eq!(merged_ints(&buffer.arena[..18]), vec![-3, 9]);
}
