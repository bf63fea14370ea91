use crate::batch::{ColumnVector, VectorBatch, VectorValues};
use crate::buffer::local::LocalShuffleBuffer;
use crate::codec::block::{BlockHeader, peek_header};
use crate::compression::Compression;
use crate::config::LocalBufferOptions;

/// boolean, short, int, long, double, decimal128, varchar, date32, decimal64, char
pub const SAMPLE_TYPE_IDS: [i32; 10] = [4, 5, 1, 2, 3, 7, 15, 8, 6, 16];

pub fn sample_columns(rows: usize, seed: u64) -> Vec<ColumnVector> {
    let s = seed as i64;
    let bools: Vec<bool> = (0..rows).map(|i| (i as u64 + seed) % 3 == 0).collect();
    let shorts: Vec<i16> = (0..rows).map(|i| i as i16 * 7 - 100).collect();
    let ints: Vec<i32> = (0..rows).map(|i| i as i32 * 31 - 500).collect();
    let longs: Vec<i64> = (0..rows).map(|i| i as i64 * 1_000_003 - s).collect();
    let doubles: Vec<f64> = (0..rows).map(|i| i as f64 * 0.5 - 3.25).collect();
    let decimals: Vec<i128> = (0..rows)
        .map(|i| (i as i128 - 50) * 10i128.pow(20) + seed as i128)
        .collect();
    let strings: Vec<String> = (0..rows)
        .map(|i| {
            if i % 6 == 0 {
                String::new()
            } else {
                format!("v{i}-{}", "x".repeat(i % 5))
            }
        })
        .collect();
    let dates: Vec<i32> = (0..rows).map(|i| 19_000 + i as i32).collect();
    let decimal64s: Vec<i64> = (0..rows).map(|i| -(i as i64) * 1_234 + s).collect();
    let char_ids: Vec<i32> = (0..rows).map(|i| ((i as u64 * 3 + seed) % 4) as i32).collect();

    let nulls_every = |every: usize, at: usize| -> Vec<usize> {
        (0..rows).filter(|i| i % every == at).collect()
    };

    vec![
        ColumnVector::plain(VectorValues::from_bools(&bools))
            .with_nulls(&nulls_every(11, 3))
            .unwrap(),
        ColumnVector::plain(VectorValues::from_i16s(&shorts)),
        ColumnVector::plain(VectorValues::from_i32s(&ints))
            .with_nulls(&nulls_every(7, 0))
            .unwrap(),
        ColumnVector::plain(VectorValues::from_i64s(&longs)),
        ColumnVector::plain(VectorValues::from_f64s(&doubles)),
        ColumnVector::plain(VectorValues::from_i128s(&decimals))
            .with_nulls(&nulls_every(9, 4))
            .unwrap(),
        ColumnVector::plain(VectorValues::from_bytes(&strings).unwrap())
            .with_nulls(&nulls_every(13, 5))
            .unwrap(),
        ColumnVector::plain(VectorValues::from_i32s(&dates)),
        ColumnVector::plain(VectorValues::from_i64s(&decimal64s)),
        ColumnVector::dictionary(
            char_ids,
            VectorValues::from_bytes(&["red", "green", "", "blue"]).unwrap(),
        )
        .with_nulls(&nulls_every(10, 9))
        .unwrap(),
    ]
}

pub fn partitioned_batch(pids: &[i32], columns: Vec<ColumnVector>) -> VectorBatch {
    let mut vectors = vec![ColumnVector::plain(VectorValues::from_i32s(pids))];
    vectors.extend(columns);
    VectorBatch::new(vectors).unwrap()
}

/// Plain copy of the given rows, dictionary references resolved.
pub fn select_rows(vector: &ColumnVector, rows: &[usize]) -> ColumnVector {
    let (nulls, values, ids) = match vector {
        ColumnVector::Plain { nulls, values } => (nulls, values, None),
        ColumnVector::Dictionary {
            nulls,
            ids,
            dictionary,
        } => (nulls, dictionary, Some(ids)),
    };
    let index = |row: usize| ids.map_or(row, |ids| ids[row] as usize);

    let selected = match values {
        VectorValues::Bits8(v) => VectorValues::Bits8(rows.iter().map(|&r| v[index(r)]).collect()),
        VectorValues::Bits16(v) => {
            VectorValues::Bits16(rows.iter().map(|&r| v[index(r)]).collect())
        }
        VectorValues::Bits32(v) => {
            VectorValues::Bits32(rows.iter().map(|&r| v[index(r)]).collect())
        }
        VectorValues::Bits64(v) => {
            VectorValues::Bits64(rows.iter().map(|&r| v[index(r)]).collect())
        }
        VectorValues::Decimal128(words) => VectorValues::Decimal128(
            rows.iter()
                .flat_map(|&r| {
                    let i = index(r);
                    [words[2 * i], words[2 * i + 1]]
                })
                .collect(),
        ),
        VectorValues::Binary { .. } => {
            let picked: Vec<&[u8]> = rows
                .iter()
                .map(|&r| values.binary_value(index(r)).unwrap())
                .collect();
            VectorValues::from_bytes(&picked).unwrap()
        }
    };

    ColumnVector::Plain {
        nulls: rows.iter().map(|&r| nulls[r]).collect(),
        values: selected,
    }
}

pub fn rows_of_partition(pids: &[i32], partition: i32) -> Vec<usize> {
    pids.iter()
        .enumerate()
        .filter(|&(_, &p)| p == partition)
        .map(|(row, _)| row)
        .collect()
}

pub fn expected_partition(columns: &[ColumnVector], pids: &[i32], partition: i32) -> VectorBatch {
    let rows = rows_of_partition(pids, partition);
    VectorBatch::new(columns.iter().map(|c| select_rows(c, &rows)).collect()).unwrap()
}

pub fn local_buffer(partitions: u32, region_size: u32, region_count: u32) -> LocalShuffleBuffer {
    LocalShuffleBuffer::new(
        partitions,
        &LocalBufferOptions {
            region_size,
            region_count,
            compression: Compression::None,
        },
    )
    .unwrap()
}

/// Headers of every block in a partition stream.
pub fn block_headers(blocks: &[u8]) -> Vec<BlockHeader> {
    let mut headers = Vec::new();
    let mut pos = 0usize;
    while pos < blocks.len() {
        let header = peek_header(blocks, pos).unwrap();
        pos += header.length as usize;
        headers.push(header);
    }
    headers
}
