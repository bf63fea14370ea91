use std::time::{Duration, Instant};

use crate::batch::VectorBatch;
use crate::buffer::{PreoccupyFlag, ShuffleBuffer};
use crate::codec::block::BlockHeader;
use crate::codec::writers::write_one_vector;
use crate::column_reader::{ColumnReader, ValueSource};
use crate::config::SplitterOptions;
use crate::schema::{ShuffleSchema, ShuffleType};
use crate::shuffle::region::CacheRegion;
use crate::{Error, Result};

/// Upper bound on row slots pre-reserved per partition region.
const MAX_PRESIZED_ROWS: u64 = 1 << 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitMetrics {
    pub batches: u64,
    pub rows: u64,
    pub blocks_written: u64,
    pub region_rollovers: u64,
    pub buffer_replacements: u64,
    pub preoccupy_time: Duration,
    pub write_time: Duration,
    pub release_time: Duration,
}

/// Write side of the shuffle: routes the rows of each input batch to their
/// partition, reserves buffer space row by row and serializes every
/// partition's accumulated rows into one block whenever its region has to be
/// given up.
#[derive(Debug)]
pub struct RowPacker<B: ShuffleBuffer> {
    schema: ShuffleSchema,
    partition_num: u32,
    single_partition: bool,
    thread_id: u64,
    buffer: B,
    regions: Vec<CacheRegion>,
    partition_lengths: Vec<u64>,
    total_write_bytes: u64,
    metrics: SplitMetrics,
}

impl<B: ShuffleBuffer> RowPacker<B> {
    pub fn new(options: &SplitterOptions, buffer: B) -> Result<Self> {
        options.validate()?;
        log::debug!(
            "Input schema columns number: {} (thread {})",
            options.type_ids.len(),
            options.thread_id
        );

        let schema = ShuffleSchema::from_type_ids(&options.type_ids).map_err(|e| {
            log::error!("Failed to initialize row packer: {e}");
            e
        })?;

        let region_size = buffer.region_size() as u64;
        let rows_per_region = (region_size * 2).saturating_sub(schema.min_block_len() as u64)
            / schema.min_row_len().max(1) as u64;
        log::info!("Each region can cache row number is {rows_per_region}");
        let presized = rows_per_region.min(MAX_PRESIZED_ROWS) as usize;

        let partition_num = options.partition_num;
        Ok(Self {
            schema,
            partition_num,
            single_partition: options.partition_method.is_single_partition(),
            thread_id: options.thread_id,
            buffer,
            regions: (0..partition_num)
                .map(|_| CacheRegion::with_capacity(presized))
                .collect(),
            partition_lengths: vec![0u64; partition_num as usize],
            total_write_bytes: 0,
            metrics: SplitMetrics::default(),
        })
    }

    /// Builds a packer from the host's partition method name.
    pub fn make(
        partition_method: &str,
        partition_num: u32,
        type_ids: &[i32],
        thread_id: u64,
        buffer: B,
    ) -> Result<Self> {
        let options = SplitterOptions::new(partition_method, partition_num, type_ids.to_vec())
            .map_err(|e| {
                log::error!("Unsupported partition method {partition_method}: {e}");
                e
            })?
            .with_thread_id(thread_id);
        Self::new(&options, buffer)
    }

    pub fn schema(&self) -> &ShuffleSchema {
        &self.schema
    }

    pub fn partition_num(&self) -> u32 {
        self.partition_num
    }

    pub fn is_single_partition(&self) -> bool {
        self.single_partition
    }

    /// Block bytes written per partition. With a compressing buffer these are
    /// still the uncompressed block lengths.
    pub fn partition_lengths(&self) -> &[u64] {
        &self.partition_lengths
    }

    /// Uncompressed block bytes, or the compressed bytes reported by the
    /// buffer's flushes when it compresses.
    pub fn total_write_bytes(&self) -> u64 {
        self.total_write_bytes
    }

    pub fn metrics(&self) -> &SplitMetrics {
        &self.metrics
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    pub fn into_buffer(self) -> B {
        self.buffer
    }

    /// Exact serialized size of one row of `batch`, block overhead excluded.
    pub fn row_length_in_bytes(&self, batch: &VectorBatch, row: usize) -> Result<u32> {
        let readers = self.column_readers(batch)?;
        self.row_length(&readers, row)
    }

    pub fn split(&mut self, batch: VectorBatch) -> Result<()> {
        log::trace!(
            "Split vb row number: {} (thread {})",
            batch.row_count,
            self.thread_id
        );
        let started = Instant::now();

        let row_count: u32 = batch
            .row_count
            .try_into()
            .map_err(|_| Error::Other("row_count too large".to_string()))?;
        for region in &mut self.regions {
            region.reset();
        }

        let readers = self.column_readers(&batch)?;
        let partition_view = if self.single_partition {
            None
        } else {
            Some(ColumnReader::new(batch.vector(0)?, ShuffleType::Byte4)?)
        };
        let region_size = self.buffer.region_size();

        for row in 0..row_count {
            let partition_id = match &partition_view {
                Some(view) => self.partition_id_of_row(view, row as usize)?,
                None => 0,
            };
            let row_length = self.row_length(&readers, row as usize)?;
            let worst_case = row_length as u64 + self.schema.min_block_len() as u64;
            if worst_case > region_size as u64 {
                log::error!(
                    "Row {row} needs {worst_case} bytes, region size is {region_size}"
                );
                return Err(Error::RowTooLarge {
                    row: row as usize,
                    length: worst_case.min(u32::MAX as u64) as u32,
                    region_size,
                });
            }
            self.preoccupy_buffer_space(&readers, partition_id, row, row_length)
                .map_err(|e| {
                    log::error!("Failed to preoccupied local buffer space for row index {row}: {e}");
                    e
                })?;
        }
        let preoccupied_at = Instant::now();
        self.metrics.preoccupy_time += preoccupied_at - started;

        for partition_id in 0..self.partition_num {
            if self.regions[partition_id as usize].is_empty() {
                continue;
            }
            self.write_part_vector_batch(&readers, partition_id)
                .map_err(|e| {
                    log::error!(
                        "Failed to write rows in partitionId {partition_id} in the vector batch: {e}"
                    );
                    e
                })?;
        }
        let written_at = Instant::now();
        self.metrics.write_time += written_at - preoccupied_at;

        // every row has been copied out; the input batch is released here
        drop(partition_view);
        drop(readers);
        drop(batch);
        self.metrics.release_time += written_at.elapsed();

        self.metrics.batches += 1;
        self.metrics.rows += row_count as u64;
        Ok(())
    }

    /// Flushes whatever the buffer still holds. Call once after the last
    /// `split`.
    pub fn stop(&mut self) -> Result<()> {
        let data_size = self.buffer.flush(true).map_err(|e| {
            log::error!("Failed to flush local blob when stop: {e}");
            e
        })?;
        if self.buffer.is_compress() {
            self.total_write_bytes += data_size as u64;
        }
        log::info!(
            "Time cost preoccupied: {:?} write_data: {:?} release_resource: {:?} (thread {})",
            self.metrics.preoccupy_time,
            self.metrics.write_time,
            self.metrics.release_time,
            self.thread_id
        );
        Ok(())
    }

    fn column_readers<'a>(&self, batch: &'a VectorBatch) -> Result<Vec<ColumnReader<'a>>> {
        let first = if self.single_partition { 0 } else { 1 };
        let expected = self.schema.len() + first;
        if batch.vector_count() != expected {
            return Err(Error::Other(format!(
                "vector batch has {} vectors, expected {expected}",
                batch.vector_count()
            )));
        }
        self.schema
            .types()
            .iter()
            .enumerate()
            .map(|(col, &ty)| ColumnReader::new(batch.vector(col + first)?, ty))
            .collect()
    }

    fn partition_id_of_row(&self, view: &ColumnReader<'_>, row: usize) -> Result<u32> {
        let ValueSource::Fixed4(values) = view.source() else {
            return Err(Error::Other("partition id column must be int32".to_string()));
        };
        let index = view.lookup().index(row)?;
        let raw = *values
            .get(index)
            .ok_or_else(|| Error::CopyFailure(format!("no partition id for row {row}")))?
            as i32;
        if raw < 0 || raw as u32 >= self.partition_num {
            return Err(Error::Other(format!(
                "partition id {raw} of row {row} out of range 0..{}",
                self.partition_num
            )));
        }
        Ok(raw as u32)
    }

    fn row_length(&self, readers: &[ColumnReader<'_>], row: usize) -> Result<u32> {
        let mut length = self.schema.min_row_len();
        for &col in self.schema.var_columns() {
            length = length
                .checked_add(readers[col].binary_len(row)?)
                .ok_or_else(|| Error::Other(format!("row {row} length overflow")))?;
        }
        Ok(length)
    }

    /// Reserves space for one row, draining regions or replacing the buffer
    /// as the buffer demands. Each non-`Enough` outcome may occur at most once
    /// per row.
    fn preoccupy_buffer_space(
        &mut self,
        readers: &[ColumnReader<'_>],
        partition_id: u32,
        row: u32,
        row_length: u32,
    ) -> Result<()> {
        let pid = partition_id as usize;
        let mut new_region = false;
        let mut rolled_over = false;
        let mut replaced_buffer = false;

        loop {
            let mut size = row_length;
            if self.regions[pid].is_empty() {
                // the row opens a block, so it also pays for the block overhead
                size += self.schema.min_block_len();
            }

            match self
                .buffer
                .preoccupied_data_space(partition_id, size, new_region)
            {
                PreoccupyFlag::Enough => {
                    self.regions[pid].push(row, size);
                    return Ok(());
                }
                PreoccupyFlag::NewRegion => {
                    if rolled_over {
                        return Err(Error::BufferProtocolViolation(format!(
                            "partition {partition_id} asked for a new region twice for row {row}"
                        )));
                    }
                    self.write_part_vector_batch(readers, partition_id)?;
                    rolled_over = true;
                    new_region = true;
                    self.metrics.region_rollovers += 1;
                }
                PreoccupyFlag::Lack => {
                    if replaced_buffer {
                        return Err(Error::BufferProtocolViolation(format!(
                            "a fresh buffer has no space for row {row} of partition {partition_id}"
                        )));
                    }
                    self.flush_all_regions_and_get_new_buffer(readers)?;
                    replaced_buffer = true;
                    new_region = false;
                }
            }
        }
    }

    fn flush_all_regions_and_get_new_buffer(&mut self, readers: &[ColumnReader<'_>]) -> Result<()> {
        for partition_id in 0..self.partition_num {
            if self.regions[partition_id as usize].is_empty() {
                continue;
            }
            self.write_part_vector_batch(readers, partition_id)?;
        }

        let data_size = self.buffer.flush(false).map_err(|e| {
            log::error!("Failed to flush local blob: {e}");
            e
        })?;
        if self.buffer.is_compress() {
            self.total_write_bytes += data_size as u64;
        }

        self.buffer.get_new_buffer().map_err(|e| {
            log::error!("Failed to get new local blob: {e}");
            e
        })?;
        self.metrics.buffer_replacements += 1;
        Ok(())
    }

    /// Serializes the rows accumulated for `partition_id` into one block.
    fn write_part_vector_batch(
        &mut self,
        readers: &[ColumnReader<'_>],
        partition_id: u32,
    ) -> Result<()> {
        let region = &self.regions[partition_id as usize];
        if region.is_empty() {
            return Ok(());
        }
        let header = BlockHeader {
            length: region.length(),
            row_count: region.row_num(),
        };

        let slot = self
            .buffer
            .get_end_address_of_region(partition_id, header.length)?;
        let end = slot
            .offset
            .checked_add(header.length as usize)
            .ok_or_else(|| Error::CopyFailure("block end overflow".to_string()))?;
        let block = self.buffer.arena_mut().get_mut(slot.offset..end).ok_or_else(|| {
            Error::BufferProtocolViolation(format!(
                "region {} slot {}..{end} outside the buffer",
                slot.region_id, slot.offset
            ))
        })?;

        let rows = region.row_indexes();
        let mut pos = header.write_at(block, 0)?;
        for (col, reader) in readers.iter().enumerate() {
            pos = write_one_vector(block, pos, reader, rows).map_err(|e| {
                log::error!("Failed to write vector with index {col} in current vector batch: {e}");
                e
            })?;
        }
        if pos != header.length as usize {
            return Err(Error::CopyFailure(format!(
                "partition {partition_id} reserved {} bytes but wrote {pos}",
                header.length
            )));
        }

        if !self.buffer.is_compress() {
            self.total_write_bytes += header.length as u64;
        }
        self.partition_lengths[partition_id as usize] += header.length as u64;
        self.metrics.blocks_written += 1;
        self.regions[partition_id as usize].reset();
        Ok(())
    }
}
