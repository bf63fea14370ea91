use crate::schema::ShuffleType;
use crate::{Error, Result};

/// Null flag bytes: one byte per row, non-zero means null.
pub const NOT_NULL: u8 = 0;
pub const NULL: u8 = 1;

/// Value storage of a column. Fixed-width values are kept as raw bits so that
/// e.g. `double` and `long` share `Bits64`; decimal128 values are stored as
/// consecutive `(low, high)` 64-bit word pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorValues {
    Bits8(Vec<u8>),
    Bits16(Vec<u16>),
    Bits32(Vec<u32>),
    Bits64(Vec<u64>),
    Decimal128(Vec<u64>),
    Binary { offsets: Vec<i32>, data: Vec<u8> },
}

impl VectorValues {
    pub fn from_bools(values: &[bool]) -> Self {
        VectorValues::Bits8(values.iter().map(|&v| v as u8).collect())
    }

    pub fn from_i16s(values: &[i16]) -> Self {
        VectorValues::Bits16(values.iter().map(|&v| v as u16).collect())
    }

    pub fn from_i32s(values: &[i32]) -> Self {
        VectorValues::Bits32(values.iter().map(|&v| v as u32).collect())
    }

    pub fn from_i64s(values: &[i64]) -> Self {
        VectorValues::Bits64(values.iter().map(|&v| v as u64).collect())
    }

    pub fn from_f64s(values: &[f64]) -> Self {
        VectorValues::Bits64(values.iter().map(|v| v.to_bits()).collect())
    }

    pub fn from_i128s(values: &[i128]) -> Self {
        let mut words = Vec::with_capacity(values.len() * 2);
        for &v in values {
            words.push(v as u64);
            words.push((v >> 64) as u64);
        }
        VectorValues::Decimal128(words)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(values: &[T]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(values.len() + 1);
        let mut data = Vec::new();
        offsets.push(0i32);
        for v in values {
            data.extend_from_slice(v.as_ref());
            let end: i32 = data
                .len()
                .try_into()
                .map_err(|_| Error::Other("binary data too large".to_string()))?;
            offsets.push(end);
        }
        Ok(VectorValues::Binary { offsets, data })
    }

    /// Number of logical values held.
    pub fn len(&self) -> usize {
        match self {
            VectorValues::Bits8(v) => v.len(),
            VectorValues::Bits16(v) => v.len(),
            VectorValues::Bits32(v) => v.len(),
            VectorValues::Bits64(v) => v.len(),
            VectorValues::Decimal128(words) => words.len() / 2,
            VectorValues::Binary { offsets, .. } => offsets.len().saturating_sub(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shuffle_type(&self) -> ShuffleType {
        match self {
            VectorValues::Bits8(_) => ShuffleType::Byte1,
            VectorValues::Bits16(_) => ShuffleType::Byte2,
            VectorValues::Bits32(_) => ShuffleType::Byte4,
            VectorValues::Bits64(_) => ShuffleType::Byte8,
            VectorValues::Decimal128(_) => ShuffleType::Decimal128,
            VectorValues::Binary { .. } => ShuffleType::Binary,
        }
    }

    pub fn binary_value(&self, index: usize) -> Result<&[u8]> {
        match self {
            VectorValues::Binary { offsets, data } => {
                if index + 1 >= offsets.len() {
                    return Err(Error::CopyFailure(format!(
                        "binary index {index} out of bounds"
                    )));
                }
                let start = offsets[index];
                let end = offsets[index + 1];
                if start < 0 || end < start || end as usize > data.len() {
                    return Err(Error::CopyFailure(format!(
                        "binary offsets out of bounds at index {index}"
                    )));
                }
                Ok(&data[start as usize..end as usize])
            }
            _ => Err(Error::Other("not a binary vector".to_string())),
        }
    }

    pub fn i32_at(&self, index: usize) -> Result<i32> {
        match self {
            VectorValues::Bits32(v) => v
                .get(index)
                .map(|&bits| bits as i32)
                .ok_or_else(|| Error::CopyFailure(format!("int index {index} out of bounds"))),
            _ => Err(Error::Other("not a 4-byte vector".to_string())),
        }
    }

    pub fn i128_at(&self, index: usize) -> Result<i128> {
        match self {
            VectorValues::Decimal128(words) => {
                let lo = *words.get(index * 2).ok_or_else(|| {
                    Error::CopyFailure(format!("decimal index {index} out of bounds"))
                })?;
                let hi = *words.get(index * 2 + 1).ok_or_else(|| {
                    Error::CopyFailure(format!("decimal index {index} out of bounds"))
                })?;
                Ok(((hi as u128) << 64 | lo as u128) as i128)
            }
            _ => Err(Error::Other("not a decimal128 vector".to_string())),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            VectorValues::Decimal128(words) => {
                if words.len() % 2 != 0 {
                    return Err(Error::Other(
                        "decimal128 words must come in pairs".to_string(),
                    ));
                }
            }
            VectorValues::Binary { offsets, data } => {
                if offsets.first().copied().unwrap_or(1) != 0 {
                    return Err(Error::Other("offsets[0] must be 0".to_string()));
                }
                let mut prev = 0i32;
                for &o in offsets {
                    if o < prev {
                        return Err(Error::Other("offsets must be non-decreasing".to_string()));
                    }
                    prev = o;
                }
                if prev as usize != data.len() {
                    return Err(Error::Other("final offset mismatch".to_string()));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VectorEncoding {
    Plain,
    Dictionary,
}

/// One column of an input batch, either holding its values directly or as
/// per-row ids into a dictionary of distinct values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnVector {
    Plain {
        nulls: Vec<u8>,
        values: VectorValues,
    },
    Dictionary {
        nulls: Vec<u8>,
        ids: Vec<i32>,
        dictionary: VectorValues,
    },
}

impl ColumnVector {
    pub fn plain(values: VectorValues) -> Self {
        let nulls = vec![NOT_NULL; values.len()];
        ColumnVector::Plain { nulls, values }
    }

    pub fn dictionary(ids: Vec<i32>, dictionary: VectorValues) -> Self {
        let nulls = vec![NOT_NULL; ids.len()];
        ColumnVector::Dictionary {
            nulls,
            ids,
            dictionary,
        }
    }

    pub fn with_nulls(mut self, null_rows: &[usize]) -> Result<Self> {
        let nulls = match &mut self {
            ColumnVector::Plain { nulls, .. } => nulls,
            ColumnVector::Dictionary { nulls, .. } => nulls,
        };
        for &row in null_rows {
            let slot = nulls
                .get_mut(row)
                .ok_or_else(|| Error::Other(format!("null row {row} out of bounds")))?;
            *slot = NULL;
        }
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.nulls().len()
    }

    pub fn encoding(&self) -> VectorEncoding {
        match self {
            ColumnVector::Plain { .. } => VectorEncoding::Plain,
            ColumnVector::Dictionary { .. } => VectorEncoding::Dictionary,
        }
    }

    pub fn nulls(&self) -> &[u8] {
        match self {
            ColumnVector::Plain { nulls, .. } => nulls,
            ColumnVector::Dictionary { nulls, .. } => nulls,
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.nulls().get(row).is_some_and(|&flag| flag != NOT_NULL)
    }

    pub fn shuffle_type(&self) -> ShuffleType {
        match self {
            ColumnVector::Plain { values, .. } => values.shuffle_type(),
            ColumnVector::Dictionary { dictionary, .. } => dictionary.shuffle_type(),
        }
    }

    /// Copies the dictionary ids of rows `offset..offset + count` into `out_ids`
    /// and returns the dictionary they index into.
    pub fn extract_dictionary_and_ids(
        &self,
        offset: usize,
        count: usize,
        out_ids: &mut Vec<i32>,
    ) -> Result<&VectorValues> {
        match self {
            ColumnVector::Dictionary {
                ids, dictionary, ..
            } => {
                let end = offset
                    .checked_add(count)
                    .ok_or_else(|| Error::Other("dictionary range overflow".to_string()))?;
                if end > ids.len() {
                    return Err(Error::CopyFailure(
                        "dictionary id range out of bounds".to_string(),
                    ));
                }
                out_ids.clear();
                out_ids.try_reserve_exact(count).map_err(|e| {
                    Error::AllocationFailure(format!("dictionary ids for {count} rows: {e}"))
                })?;
                out_ids.extend_from_slice(&ids[offset..end]);
                Ok(dictionary)
            }
            ColumnVector::Plain { .. } => Err(Error::Other(
                "vector is not dictionary encoded".to_string(),
            )),
        }
    }

    /// Bytes of a variable-width value, resolved through the dictionary when
    /// the vector is dictionary encoded.
    pub fn get_value(&self, row: usize) -> Result<&[u8]> {
        match self {
            ColumnVector::Plain { values, .. } => values.binary_value(row),
            ColumnVector::Dictionary {
                ids, dictionary, ..
            } => {
                let id = *ids
                    .get(row)
                    .ok_or_else(|| Error::CopyFailure(format!("row {row} out of bounds")))?;
                let id: usize = id
                    .try_into()
                    .map_err(|_| Error::CopyFailure(format!("negative dictionary id {id}")))?;
                dictionary.binary_value(id)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ColumnVector::Plain { nulls, values } => {
                if values.len() != nulls.len() {
                    return Err(Error::Other("values length mismatch".to_string()));
                }
                values.validate()
            }
            ColumnVector::Dictionary {
                nulls,
                ids,
                dictionary,
            } => {
                if ids.len() != nulls.len() {
                    return Err(Error::Other("ids length mismatch".to_string()));
                }
                let dict_len = dictionary.len();
                for &id in ids {
                    if id < 0 || id as usize >= dict_len {
                        return Err(Error::Other(format!("dictionary id {id} out of bounds")));
                    }
                }
                dictionary.validate()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorBatch {
    pub row_count: usize,
    pub vectors: Vec<ColumnVector>,
}

impl VectorBatch {
    pub fn new(vectors: Vec<ColumnVector>) -> Result<Self> {
        let row_count = vectors
            .first()
            .map(|v| v.row_count())
            .ok_or_else(|| Error::Other("vector batch must have at least one vector".to_string()))?;
        let batch = Self { row_count, vectors };
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vectors.is_empty() {
            return Err(Error::Other(
                "vector batch must have at least one vector".to_string(),
            ));
        }
        for vector in &self.vectors {
            if vector.row_count() != self.row_count {
                return Err(Error::Other("row count mismatch".to_string()));
            }
            vector.validate()?;
        }
        Ok(())
    }

    pub fn vector(&self, index: usize) -> Result<&ColumnVector> {
        self.vectors
            .get(index)
            .ok_or_else(|| Error::Other(format!("no vector at index {index}")))
    }

    pub fn vector_count(&self) -> usize {
        self.vectors.len()
    }
}
