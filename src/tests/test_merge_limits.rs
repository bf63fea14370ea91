use crate::Error;
use crate::batch::{ColumnVector, NOT_NULL, VectorBatch, VectorValues};
use crate::codec::block::{ColumnSlice, PayloadSlice, take};
use crate::codec::exports::split_into_local_buffer;
use crate::config::{LocalBufferOptions, SplitterOptions};
use crate::schema::ShuffleType;
use crate::shuffle::merge_reader::{BatchMerger, MergeStatus, MergedColumn, MergedValues};
use crate::tests::support::block_headers;

/// 1000 int rows split as ten batches, one 508 byte block each.
fn thousand_rows() -> Vec<u8> {
    let options = SplitterOptions::new("single", 1, vec![1]).unwrap();
    let batches = (0..10).map(|b| {
        let values: Vec<i32> = (b * 100..(b + 1) * 100).collect();
        VectorBatch::new(vec![ColumnVector::plain(VectorValues::from_i32s(&values))]).unwrap()
    });
    let packer =
        split_into_local_buffer(&options, &LocalBufferOptions::default(), batches).unwrap();
    packer.buffer().partition_blocks(0).unwrap()
}

fn ints(batch: &VectorBatch) -> Vec<i32> {
    let ColumnVector::Plain { values, .. } = &batch.vectors[0] else {
        panic!("merged output is plain");
    };
    (0..batch.row_count).map(|row| values.i32_at(row).unwrap()).collect()
}

#[test]
fn row_limit_stops_before_the_overflowing_block_and_resumes() {
    let blocks = thousand_rows();
    assert_eq!(block_headers(&blocks).len(), 10);

    let mut merger = BatchMerger::new(&[1]).unwrap();
    let status = merger.get_merge_vector_batch(&blocks, 400, u32::MAX).unwrap();
    assert_eq!(
        status,
        MergeStatus {
            row_count: 400,
            length: 4 * 508,
            exhausted: false,
        }
    );
    assert_eq!(merger.merged_block_count(), 4);
    assert_eq!(merger.row_num_after_merge(), 400);
    assert_eq!(merger.vector_batch_length(), 4 * 508);
    assert_eq!(merger.cursor(), 4 * 508);

    // nothing more fits until the output is taken
    let again = merger.get_merge_vector_batch(&blocks, 400, u32::MAX).unwrap();
    assert_eq!(again, status);

    let first = merger.take_vector_batch().unwrap();
    assert_eq!(ints(&first), (0..400).collect::<Vec<_>>());
    assert_eq!(merger.row_num_after_merge(), 0);

    let status = merger.get_merge_vector_batch(&blocks, 400, u32::MAX).unwrap();
    assert_eq!(status.row_count, 400);
    assert_eq!(ints(&merger.take_vector_batch().unwrap()), (400..800).collect::<Vec<_>>());

    let status = merger.get_merge_vector_batch(&blocks, 400, u32::MAX).unwrap();
    assert_eq!(status.row_count, 200);
    assert!(status.exhausted);
    assert!(merger.is_exhausted(&blocks));
    assert_eq!(ints(&merger.take_vector_batch().unwrap()), (800..1000).collect::<Vec<_>>());
}

#[test]
fn byte_limit_counts_whole_blocks() {
    let blocks = thousand_rows();
    let mut merger = BatchMerger::new(&[1]).unwrap();
    let status = merger
        .get_merge_vector_batch(&blocks, u32::MAX, 2 * 508 + 100)
        .unwrap();
    assert_eq!(status.row_count, 200);
    assert_eq!(status.length, 2 * 508);
    assert_eq!(merger.current_header().map(|h| h.row_count), Some(100));
}

#[test]
fn oversized_first_block_is_still_taken() {
    let blocks = thousand_rows();
    let mut merger = BatchMerger::new(&[1]).unwrap();
    let status = merger.get_merge_vector_batch(&blocks, 50, 64).unwrap();
    assert_eq!(status.row_count, 100);
    assert_eq!(merger.merged_block_count(), 1);
    assert_eq!(ints(&merger.take_vector_batch().unwrap()), (0..100).collect::<Vec<_>>());
}

#[test]
fn empty_input_is_exhausted_immediately() {
    let mut merger = BatchMerger::new(&[1, 15]).unwrap();
    let status = merger.get_merge_vector_batch(&[], 10, 10).unwrap();
    assert_eq!(
        status,
        MergeStatus {
            row_count: 0,
            length: 0,
            exhausted: true,
        }
    );
    let batch = merger.take_vector_batch().unwrap();
    assert_eq!(batch.row_count, 0);
    assert_eq!(batch.vector_count(), 2);
}

#[test]
fn variable_width_value_length_is_the_last_offset() {
    let options = SplitterOptions::new("single", 1, vec![15]).unwrap();
    let batch = VectorBatch::new(vec![ColumnVector::plain(
        VectorValues::from_bytes(&["", "hello", "abc", ""]).unwrap(),
    )])
    .unwrap();
    let packer =
        split_into_local_buffer(&options, &LocalBufferOptions::default(), [batch]).unwrap();
    let blocks = packer.buffer().partition_blocks(0).unwrap();
    // 4 rows of (null flag + offset) + 8 value bytes + header + trailing offset
    assert_eq!(blocks.len(), 4 * 5 + 8 + 12);

    let mut pos = 8 + 4;
    let offsets: Vec<i32> = take(&blocks, &mut pos, 20)
        .unwrap()
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(offsets, vec![0, 0, 5, 8, 8]);

    let mut merger = BatchMerger::new(&[15]).unwrap();
    merger
        .get_merge_vector_batch(&blocks, u32::MAX, u32::MAX)
        .unwrap();
    assert_eq!(merger.cal_vector_value_length(0).unwrap(), 8);

    // a second merged block adds its own value bytes
    let mut twice = blocks.clone();
    twice.extend_from_slice(&blocks);
    let mut merger = BatchMerger::new(&[15]).unwrap();
    merger
        .get_merge_vector_batch(&twice, u32::MAX, u32::MAX)
        .unwrap();
    assert_eq!(merger.cal_vector_value_length(0).unwrap(), 16);
    let column = merger.copy_data_to_vector(0).unwrap();
    assert_eq!(
        column,
        ColumnVector::plain(
            VectorValues::from_bytes(&["", "hello", "abc", "", "", "hello", "abc", ""]).unwrap()
        )
    );
}

#[test]
fn value_length_needs_a_variable_width_column() {
    let merger = BatchMerger::new(&[1, 15]).unwrap();
    assert_eq!(merger.cal_vector_value_length(1).unwrap(), 0);
    assert_eq!(
        merger.cal_vector_value_length(0).unwrap_err(),
        Error::Other("column 0 is not variable width".to_string())
    );
    assert_eq!(
        merger.copy_data_to_vector(2).unwrap_err(),
        Error::Other("no column 2".to_string())
    );
}

#[test]
fn rejected_slice_leaves_merged_column_untouched() {
    let nulls = [NOT_NULL, NOT_NULL];
    let mismatched = ColumnSlice {
        nulls: &nulls,
        payload: PayloadSlice::Fixed {
            width: 4,
            bytes: &[0u8; 8],
        },
    };

    let mut column = MergedColumn::new(ShuffleType::Binary);
    let err = column.prepare_append(&mismatched).unwrap_err();
    assert_eq!(
        err,
        Error::CopyFailure("block payload does not match the column type".to_string())
    );

    // one offset entry short of rows + 1
    let offsets: Vec<u8> = [0i32, 3].iter().flat_map(|o| o.to_le_bytes()).collect();
    let short = ColumnSlice {
        nulls: &nulls,
        payload: PayloadSlice::Binary {
            offsets: &offsets,
            data: b"abc",
        },
    };
    let err = column.prepare_append(&short).unwrap_err();
    assert_eq!(
        err,
        Error::CopyFailure("8 offset bytes for 2 rows".to_string())
    );
    assert_eq!(column.row_count(), 0);
    assert_eq!(
        column.values(),
        &MergedValues::Binary {
            offsets: vec![0],
            data: Vec::new()
        }
    );

    let mut column = MergedColumn::new(ShuffleType::Byte8);
    assert!(column.prepare_append(&mismatched).is_err());
    assert!(column.nulls().is_empty());
    assert_eq!(
        column.values(),
        &MergedValues::Fixed {
            width: 8,
            bytes: Vec::new()
        }
    );
}
