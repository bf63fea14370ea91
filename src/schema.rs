use crate::{Error, Result};

/// Size of the per-block header: `[byte_length:u32][row_count:u32]`.
pub const BLOCK_HEADER_LEN: u32 = 8;
pub const NULL_FLAG_LEN: u32 = 1;
pub const OFFSET_LEN: u32 = 4;
pub const DECIMAL128_LEN: u32 = 16;

/// Logical column types as numbered by the host engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogicalType {
    Int,
    Long,
    Double,
    Boolean,
    Short,
    Decimal64,
    Decimal128,
    Date32,
    Date64,
    Varchar,
    Char,
}

impl LogicalType {
    pub fn from_type_id(id: i32) -> Result<Self> {
        match id {
            1 => Ok(LogicalType::Int),
            2 => Ok(LogicalType::Long),
            3 => Ok(LogicalType::Double),
            4 => Ok(LogicalType::Boolean),
            5 => Ok(LogicalType::Short),
            6 => Ok(LogicalType::Decimal64),
            7 => Ok(LogicalType::Decimal128),
            8 => Ok(LogicalType::Date32),
            9 => Ok(LogicalType::Date64),
            15 => Ok(LogicalType::Varchar),
            16 => Ok(LogicalType::Char),
            _ => Err(Error::UnsupportedType(id)),
        }
    }

    pub fn type_id(self) -> i32 {
        match self {
            LogicalType::Int => 1,
            LogicalType::Long => 2,
            LogicalType::Double => 3,
            LogicalType::Boolean => 4,
            LogicalType::Short => 5,
            LogicalType::Decimal64 => 6,
            LogicalType::Decimal128 => 7,
            LogicalType::Date32 => 8,
            LogicalType::Date64 => 9,
            LogicalType::Varchar => 15,
            LogicalType::Char => 16,
        }
    }

    pub fn shuffle_type(self) -> ShuffleType {
        match self {
            LogicalType::Boolean => ShuffleType::Byte1,
            LogicalType::Short => ShuffleType::Byte2,
            LogicalType::Int | LogicalType::Date32 => ShuffleType::Byte4,
            LogicalType::Long
            | LogicalType::Double
            | LogicalType::Date64
            | LogicalType::Decimal64 => ShuffleType::Byte8,
            LogicalType::Decimal128 => ShuffleType::Decimal128,
            LogicalType::Char | LogicalType::Varchar => ShuffleType::Binary,
        }
    }
}

/// Physical layout class of a column inside a serialized block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShuffleType {
    Byte1,
    Byte2,
    Byte4,
    Byte8,
    Decimal128,
    Binary,
}

impl ShuffleType {
    /// Bytes per row for fixed-width layouts, `None` for variable width.
    pub fn fixed_width(self) -> Option<u32> {
        match self {
            ShuffleType::Byte1 => Some(1),
            ShuffleType::Byte2 => Some(2),
            ShuffleType::Byte4 => Some(4),
            ShuffleType::Byte8 => Some(8),
            ShuffleType::Decimal128 => Some(DECIMAL128_LEN),
            ShuffleType::Binary => None,
        }
    }

    pub fn is_variable(self) -> bool {
        self == ShuffleType::Binary
    }
}

/// Column layout derived once from the host type ids.
///
/// `min_row_len` is what every row costs regardless of its values: one null
/// flag per column, the fixed width of fixed columns and one offset slot per
/// variable column. `min_block_len` is the extra cost of opening a block: the
/// header plus the trailing offset entry of each variable column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleSchema {
    types: Vec<ShuffleType>,
    var_columns: Vec<usize>,
    min_row_len: u32,
    min_block_len: u32,
}

impl ShuffleSchema {
    pub fn from_type_ids(type_ids: &[i32]) -> Result<Self> {
        if type_ids.is_empty() {
            return Err(Error::Other(
                "shuffle schema must have at least one column".to_string(),
            ));
        }

        let mut types = Vec::with_capacity(type_ids.len());
        let mut var_columns = Vec::new();
        let mut min_row_len: u32 = 0;

        for (col, &id) in type_ids.iter().enumerate() {
            let ty = LogicalType::from_type_id(id)?.shuffle_type();
            let value_len = match ty.fixed_width() {
                Some(width) => width,
                None => {
                    var_columns.push(col);
                    OFFSET_LEN
                }
            };
            min_row_len = min_row_len
                .checked_add(NULL_FLAG_LEN + value_len)
                .ok_or_else(|| Error::Other("row length overflow".to_string()))?;
            types.push(ty);
        }

        let var_count: u32 = var_columns
            .len()
            .try_into()
            .map_err(|_| Error::Other("too many variable columns".to_string()))?;
        let min_block_len = BLOCK_HEADER_LEN + OFFSET_LEN * var_count;

        Ok(Self {
            types,
            var_columns,
            min_row_len,
            min_block_len,
        })
    }

    pub fn types(&self) -> &[ShuffleType] {
        &self.types
    }

    pub fn var_columns(&self) -> &[usize] {
        &self.var_columns
    }

    pub fn min_row_len(&self) -> u32 {
        self.min_row_len
    }

    pub fn min_block_len(&self) -> u32 {
        self.min_block_len
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
