use crate::compression::Compression;
use crate::schema::BLOCK_HEADER_LEN;
use crate::{Error, Result};

#[cfg(feature = "tools-json")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "tools-json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "tools-json", serde(rename_all = "lowercase"))]
pub enum PartitionMethod {
    Hash,
    #[cfg_attr(feature = "tools-json", serde(rename = "rr"))]
    RoundRobin,
    Range,
    Single,
}

impl PartitionMethod {
    pub fn parse(method: &str) -> Result<Self> {
        match method {
            "hash" => Ok(PartitionMethod::Hash),
            "rr" => Ok(PartitionMethod::RoundRobin),
            "range" => Ok(PartitionMethod::Range),
            "single" => Ok(PartitionMethod::Single),
            other => Err(Error::UnsupportedPartitionMethod(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartitionMethod::Hash => "hash",
            PartitionMethod::RoundRobin => "rr",
            PartitionMethod::Range => "range",
            PartitionMethod::Single => "single",
        }
    }

    /// Single partition batches carry no partition-id column and every row
    /// goes to partition 0, whatever `partition_num` is.
    pub fn is_single_partition(self) -> bool {
        self == PartitionMethod::Single
    }
}

/// Construction parameters of a row packer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "tools-json", derive(Serialize, Deserialize))]
pub struct SplitterOptions {
    pub partition_method: PartitionMethod,
    pub partition_num: u32,
    /// Host type ids of the user schema, partition-id column excluded.
    pub type_ids: Vec<i32>,
    /// Opaque worker id, only used to tag log lines.
    #[cfg_attr(feature = "tools-json", serde(default))]
    pub thread_id: u64,
}

impl SplitterOptions {
    pub fn new(method: &str, partition_num: u32, type_ids: Vec<i32>) -> Result<Self> {
        let options = Self {
            partition_method: PartitionMethod::parse(method)?,
            partition_num,
            type_ids,
            thread_id: 0,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_thread_id(mut self, thread_id: u64) -> Self {
        self.thread_id = thread_id;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.partition_num == 0 {
            return Err(Error::Other("partition_num must be positive".to_string()));
        }
        if self.type_ids.is_empty() {
            return Err(Error::Other(
                "shuffle schema must have at least one column".to_string(),
            ));
        }
        Ok(())
    }
}

/// Geometry of the in-memory shuffle buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "tools-json", derive(Serialize, Deserialize))]
pub struct LocalBufferOptions {
    pub region_size: u32,
    pub region_count: u32,
    #[cfg_attr(feature = "tools-json", serde(default))]
    pub compression: Compression,
}

impl Default for LocalBufferOptions {
    fn default() -> Self {
        Self {
            region_size: 64 * 1024,
            region_count: 64,
            compression: Compression::None,
        }
    }
}

impl LocalBufferOptions {
    pub fn validate(&self) -> Result<()> {
        if self.region_size <= BLOCK_HEADER_LEN {
            return Err(Error::Other(format!(
                "region_size must exceed the {BLOCK_HEADER_LEN} byte block header"
            )));
        }
        if self.region_count == 0 {
            return Err(Error::Other("region_count must be positive".to_string()));
        }
        (self.region_size as usize)
            .checked_mul(self.region_count as usize)
            .ok_or_else(|| Error::Other("buffer size overflow".to_string()))?;
        Ok(())
    }
}
