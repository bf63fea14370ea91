use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unsupported data type id {0}")]
    UnsupportedType(i32),

    #[error("unsupported partition method {0}")]
    UnsupportedPartitionMethod(String),

    /// Scratch space (dictionary ids, output columns) could not be obtained.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// A value copy overran its destination or the source data was malformed.
    #[error("copy failure: {0}")]
    CopyFailure(String),

    /// The buffer collaborator broke the preoccupy/write/flush contract.
    #[error("buffer protocol violation: {0}")]
    BufferProtocolViolation(String),

    #[error("row {row} needs {length} bytes but a region holds only {region_size}")]
    RowTooLarge {
        row: usize,
        length: u32,
        region_size: u32,
    },

    #[error("compression: {0}")]
    Compression(String),

    #[error("{0}")]
    Other(String),
}
