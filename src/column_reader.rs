use crate::batch::{ColumnVector, VectorValues};
use crate::schema::ShuffleType;
use crate::{Error, Result};

/// Typed view over the value storage a column reads from. For dictionary
/// encoded columns this is the dictionary, not the per-row data.
#[derive(Debug, Clone, Copy)]
pub enum ValueSource<'a> {
    Fixed1(&'a [u8]),
    Fixed2(&'a [u16]),
    Fixed4(&'a [u32]),
    Fixed8(&'a [u64]),
    Decimal128(&'a [u64]),
    Binary { offsets: &'a [i32], data: &'a [u8] },
}

impl<'a> ValueSource<'a> {
    fn from_values(values: &'a VectorValues) -> Self {
        match values {
            VectorValues::Bits8(v) => ValueSource::Fixed1(v),
            VectorValues::Bits16(v) => ValueSource::Fixed2(v),
            VectorValues::Bits32(v) => ValueSource::Fixed4(v),
            VectorValues::Bits64(v) => ValueSource::Fixed8(v),
            VectorValues::Decimal128(words) => ValueSource::Decimal128(words),
            VectorValues::Binary { offsets, data } => ValueSource::Binary { offsets, data },
        }
    }

    #[inline]
    pub fn binary_at(&self, index: usize) -> Result<&'a [u8]> {
        match *self {
            ValueSource::Binary { offsets, data } => {
                let (start, end) = match (offsets.get(index), offsets.get(index + 1)) {
                    (Some(&s), Some(&e)) if s >= 0 && e >= s => (s as usize, e as usize),
                    _ => {
                        return Err(Error::CopyFailure(format!(
                            "binary offsets out of bounds at index {index}"
                        )));
                    }
                };
                data.get(start..end).ok_or_else(|| {
                    Error::CopyFailure(format!("binary data out of bounds at index {index}"))
                })
            }
            _ => Err(Error::Other("not a binary source".to_string())),
        }
    }
}

/// How a source row maps to an index into [`ValueSource`].
#[derive(Debug, Clone)]
pub enum RowLookup {
    Plain,
    Dictionary(Vec<i32>),
}

impl RowLookup {
    #[inline]
    pub fn index(&self, row: usize) -> Result<usize> {
        match self {
            RowLookup::Plain => Ok(row),
            RowLookup::Dictionary(ids) => {
                let id = *ids
                    .get(row)
                    .ok_or_else(|| Error::CopyFailure(format!("row {row} has no dictionary id")))?;
                usize::try_from(id)
                    .map_err(|_| Error::CopyFailure(format!("negative dictionary id {id}")))
            }
        }
    }
}

/// Per-column accessor resolved once per input batch: the encoding and the
/// value layout are decided here so the row loops never re-inspect the vector.
#[derive(Debug, Clone)]
pub struct ColumnReader<'a> {
    ty: ShuffleType,
    nulls: &'a [u8],
    source: ValueSource<'a>,
    lookup: RowLookup,
}

impl<'a> ColumnReader<'a> {
    pub fn new(vector: &'a ColumnVector, ty: ShuffleType) -> Result<Self> {
        if vector.shuffle_type() != ty {
            return Err(Error::Other(format!(
                "column type mismatch: expected {ty:?}, found {:?}",
                vector.shuffle_type()
            )));
        }
        match vector {
            ColumnVector::Plain { nulls, values } => Ok(Self {
                ty,
                nulls,
                source: ValueSource::from_values(values),
                lookup: RowLookup::Plain,
            }),
            ColumnVector::Dictionary { nulls, .. } => {
                let mut ids = Vec::new();
                let dictionary =
                    vector.extract_dictionary_and_ids(0, vector.row_count(), &mut ids)?;
                Ok(Self {
                    ty,
                    nulls,
                    source: ValueSource::from_values(dictionary),
                    lookup: RowLookup::Dictionary(ids),
                })
            }
        }
    }

    pub fn shuffle_type(&self) -> ShuffleType {
        self.ty
    }

    pub fn nulls(&self) -> &'a [u8] {
        self.nulls
    }

    pub fn source(&self) -> ValueSource<'a> {
        self.source
    }

    pub fn lookup(&self) -> &RowLookup {
        &self.lookup
    }

    pub fn is_dictionary(&self) -> bool {
        matches!(self.lookup, RowLookup::Dictionary(_))
    }

    /// Bytes of the variable-width value at `row`.
    #[inline]
    pub fn binary_value(&self, row: usize) -> Result<&'a [u8]> {
        let index = self.lookup.index(row)?;
        self.source.binary_at(index)
    }

    #[inline]
    pub fn binary_len(&self, row: usize) -> Result<u32> {
        let len = self.binary_value(row)?.len();
        u32::try_from(len).map_err(|_| Error::CopyFailure(format!("value at row {row} too large")))
    }
}
