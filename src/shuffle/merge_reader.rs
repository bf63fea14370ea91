use crate::batch::{ColumnVector, VectorBatch, VectorValues};
use crate::codec::block::{BlockHeader, ColumnSlice, PayloadSlice, peek_header, scan_block};
use crate::schema::{ShuffleSchema, ShuffleType};
use crate::{Error, Result};

/// Values of one merged output column, still in wire byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedValues {
    Fixed { width: u32, bytes: Vec<u8> },
    Decimal128(Vec<u8>),
    Binary { offsets: Vec<i32>, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedColumn {
    nulls: Vec<u8>,
    values: MergedValues,
}

fn grow<T>(v: &mut Vec<T>, additional: usize) -> Result<()> {
    v.try_reserve(additional).map_err(|e| {
        Error::AllocationFailure(format!("merge output of {additional} more elements: {e}"))
    })
}

impl MergedColumn {
    pub(crate) fn new(ty: ShuffleType) -> Self {
        let values = match ty {
            ShuffleType::Binary => MergedValues::Binary {
                offsets: vec![0],
                data: Vec::new(),
            },
            ShuffleType::Decimal128 => MergedValues::Decimal128(Vec::new()),
            fixed => MergedValues::Fixed {
                width: fixed.fixed_width().unwrap_or(0),
                bytes: Vec::new(),
            },
        };
        Self {
            nulls: Vec::new(),
            values,
        }
    }

    pub fn nulls(&self) -> &[u8] {
        &self.nulls
    }

    pub fn values(&self) -> &MergedValues {
        &self.values
    }

    pub fn row_count(&self) -> usize {
        self.nulls.len()
    }

    /// Checks that `slice` matches this column and reserves room for all of
    /// it, so the following `append` cannot fail halfway.
    pub(crate) fn prepare_append(&mut self, slice: &ColumnSlice<'_>) -> Result<()> {
        let rows = slice.nulls.len();
        match (&mut self.values, &slice.payload) {
            (MergedValues::Fixed { width, bytes }, PayloadSlice::Fixed { width: w, bytes: src })
                if *width == *w =>
            {
                grow(bytes, src.len())?;
            }
            (MergedValues::Decimal128(bytes), PayloadSlice::Decimal128(src)) => {
                grow(bytes, src.len())?;
            }
            (
                MergedValues::Binary { offsets, data },
                PayloadSlice::Binary {
                    offsets: src_offsets,
                    data: src,
                },
            ) => {
                if src_offsets.len() != (rows + 1) * 4 {
                    return Err(Error::CopyFailure(format!(
                        "{} offset bytes for {rows} rows",
                        src_offsets.len()
                    )));
                }
                let total = data.len() as u64 + src.len() as u64;
                if total > i32::MAX as u64 {
                    return Err(Error::CopyFailure(
                        "merged variable column exceeds i32 offsets".to_string(),
                    ));
                }
                grow(offsets, rows)?;
                grow(data, src.len())?;
            }
            _ => {
                return Err(Error::CopyFailure(
                    "block payload does not match the column type".to_string(),
                ));
            }
        }
        grow(&mut self.nulls, rows)
    }

    /// Appends a slice accepted by `prepare_append`.
    fn append(&mut self, slice: &ColumnSlice<'_>) {
        match (&mut self.values, &slice.payload) {
            (MergedValues::Fixed { bytes, .. }, PayloadSlice::Fixed { bytes: src, .. })
            | (MergedValues::Decimal128(bytes), PayloadSlice::Decimal128(src)) => {
                bytes.extend_from_slice(src);
            }
            (
                MergedValues::Binary { offsets, data },
                PayloadSlice::Binary {
                    offsets: src_offsets,
                    data: src,
                },
            ) => {
                let base = data.len() as i32;
                offsets.extend(
                    src_offsets
                        .chunks_exact(4)
                        .skip(1)
                        .map(|b| base + i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
                );
                data.extend_from_slice(src);
            }
            _ => return,
        }
        self.nulls.extend_from_slice(slice.nulls);
    }

    fn clear(&mut self) {
        self.nulls.clear();
        match &mut self.values {
            MergedValues::Fixed { bytes, .. } => bytes.clear(),
            MergedValues::Decimal128(bytes) => bytes.clear(),
            MergedValues::Binary { offsets, data } => {
                offsets.clear();
                offsets.push(0);
                data.clear();
            }
        }
    }

    /// Materializes the merged rows as a plain column vector.
    pub fn to_vector(&self) -> Result<ColumnVector> {
        let values = match &self.values {
            MergedValues::Fixed { width: 1, bytes } => VectorValues::Bits8(bytes.clone()),
            MergedValues::Fixed { width: 2, bytes } => VectorValues::Bits16(
                bytes
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect(),
            ),
            MergedValues::Fixed { width: 4, bytes } => VectorValues::Bits32(
                bytes
                    .chunks_exact(4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            ),
            MergedValues::Fixed { width: 8, bytes } => {
                VectorValues::Bits64(bytes.chunks_exact(8).map(read_u64).collect())
            }
            MergedValues::Fixed { width, .. } => {
                return Err(Error::Other(format!("unexpected fixed width {width}")));
            }
            MergedValues::Decimal128(bytes) => {
                VectorValues::Decimal128(bytes.chunks_exact(8).map(read_u64).collect())
            }
            MergedValues::Binary { offsets, data } => VectorValues::Binary {
                offsets: offsets.clone(),
                data: data.clone(),
            },
        };
        Ok(ColumnVector::Plain {
            nulls: self.nulls.clone(),
            values,
        })
    }
}

#[inline]
fn read_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Result of one `get_merge_vector_batch` call, counted over everything
/// merged since the output was last taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStatus {
    pub row_count: u32,
    pub length: u32,
    /// The input cursor reached the end of the block stream.
    pub exhausted: bool,
}

/// Read side of the shuffle: walks a stream of blocks and appends them to
/// per-column output vectors until a row or byte ceiling is reached.
#[derive(Debug, Clone)]
pub struct BatchMerger {
    schema: ShuffleSchema,
    cursor: usize,
    current_header: Option<BlockHeader>,
    merged_rows: u32,
    merged_length: u32,
    merge_count: u32,
    columns: Vec<MergedColumn>,
}

impl BatchMerger {
    pub fn new(type_ids: &[i32]) -> Result<Self> {
        let schema = ShuffleSchema::from_type_ids(type_ids).map_err(|e| {
            log::error!("Failed to initialize merge reader: {e}");
            e
        })?;
        let columns = schema.types().iter().map(|&ty| MergedColumn::new(ty)).collect();
        Ok(Self {
            schema,
            cursor: 0,
            current_header: None,
            merged_rows: 0,
            merged_length: 0,
            merge_count: 0,
            columns,
        })
    }

    pub fn schema(&self) -> &ShuffleSchema {
        &self.schema
    }

    /// Byte offset of the next unread block in the input stream.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_exhausted(&self, input: &[u8]) -> bool {
        self.cursor >= input.len()
    }

    pub fn current_header(&self) -> Option<BlockHeader> {
        self.current_header
    }

    pub fn vector_batch_length(&self) -> u32 {
        self.merged_length
    }

    pub fn row_num_after_merge(&self) -> u32 {
        self.merged_rows
    }

    pub fn merged_block_count(&self) -> u32 {
        self.merge_count
    }

    pub fn columns(&self) -> &[MergedColumn] {
        &self.columns
    }

    /// Starts over on a new input stream; merged output is kept.
    pub fn reset_input(&mut self) {
        self.cursor = 0;
        self.current_header = None;
    }

    /// Merges whole blocks from `input` starting at the cursor, stopping
    /// before a block that would lift the merged rows above `max_row_num` or
    /// the merged bytes above `max_size`. The first block of an empty output
    /// is always taken so every call makes progress.
    pub fn get_merge_vector_batch(
        &mut self,
        input: &[u8],
        max_row_num: u32,
        max_size: u32,
    ) -> Result<MergeStatus> {
        loop {
            if self.cursor >= input.len() {
                break;
            }
            let header = peek_header(input, self.cursor)?;
            let rows = self.merged_rows as u64 + header.row_count as u64;
            let length = self.merged_length as u64 + header.length as u64;
            if rows > max_row_num as u64 || length > max_size as u64 {
                if self.merge_count > 0 {
                    break;
                }
                log::debug!(
                    "block of {} rows / {} bytes exceeds merge limits, taken alone",
                    header.row_count,
                    header.length
                );
            }
            if rows > u32::MAX as u64 || length > u32::MAX as u64 {
                return Err(Error::Other("merged batch too large".to_string()));
            }

            let mut pos = self.cursor;
            let view = scan_block(input, &mut pos, self.schema.types())?;
            for (column, slice) in self.columns.iter_mut().zip(&view.columns) {
                column.prepare_append(slice)?;
            }
            for (column, slice) in self.columns.iter_mut().zip(&view.columns) {
                column.append(slice);
            }

            self.cursor = pos;
            self.current_header = Some(view.header);
            self.merged_rows = rows as u32;
            self.merged_length = length as u32;
            self.merge_count += 1;
        }

        Ok(MergeStatus {
            row_count: self.merged_rows,
            length: self.merged_length,
            exhausted: self.is_exhausted(input),
        })
    }

    /// Total value bytes merged so far into variable-width column `col_index`
    /// (the last entry of its offsets array).
    pub fn cal_vector_value_length(&self, col_index: usize) -> Result<u32> {
        let column = self
            .columns
            .get(col_index)
            .ok_or_else(|| Error::Other(format!("no column {col_index}")))?;
        match &column.values {
            MergedValues::Binary { offsets, .. } => Ok(offsets.last().copied().unwrap_or(0) as u32),
            _ => Err(Error::Other(format!(
                "column {col_index} is not variable width"
            ))),
        }
    }

    pub fn copy_data_to_vector(&self, col_index: usize) -> Result<ColumnVector> {
        self.columns
            .get(col_index)
            .ok_or_else(|| Error::Other(format!("no column {col_index}")))?
            .to_vector()
    }

    /// Hands out everything merged so far and resets the output.
    pub fn take_vector_batch(&mut self) -> Result<VectorBatch> {
        let vectors = self
            .columns
            .iter()
            .map(MergedColumn::to_vector)
            .collect::<Result<Vec<_>>>()?;
        for column in &mut self.columns {
            column.clear();
        }
        self.merged_rows = 0;
        self.merged_length = 0;
        self.merge_count = 0;
        VectorBatch::new(vectors)
    }
}
