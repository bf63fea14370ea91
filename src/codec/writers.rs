use crate::codec::block::{put_bytes, put_i32_le};
use crate::column_reader::{ColumnReader, RowLookup, ValueSource};
use crate::schema::OFFSET_LEN;
use crate::{Error, Result};

trait LeValue: Copy {
    const WIDTH: usize;
    fn put(self, dst: &mut [u8]);
}

macro_rules! impl_le_value {
    ($t:ty, $w:expr) => {
        impl LeValue for $t {
            const WIDTH: usize = $w;
            #[inline]
            fn put(self, dst: &mut [u8]) {
                dst.copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_le_value!(u8, 1);
impl_le_value!(u16, 2);
impl_le_value!(u32, 4);
impl_le_value!(u64, 8);

fn region_slice(buf: &mut [u8], pos: usize, len: usize) -> Result<&mut [u8]> {
    let end = pos
        .checked_add(len)
        .ok_or_else(|| Error::CopyFailure("write offset overflow".to_string()))?;
    buf.get_mut(pos..end).ok_or_else(|| {
        Error::CopyFailure(format!("write of {len} bytes at offset {pos} overruns region"))
    })
}

#[inline]
fn value_at<T: Copy>(values: &[T], index: usize) -> Result<T> {
    values
        .get(index)
        .copied()
        .ok_or_else(|| Error::CopyFailure(format!("value index {index} out of bounds")))
}

/// One null flag byte per selected row, in selection order.
pub fn write_null_values(
    buf: &mut [u8],
    pos: usize,
    nulls: &[u8],
    rows: &[u32],
) -> Result<usize> {
    let dst = region_slice(buf, pos, rows.len())?;
    for (slot, &row) in dst.iter_mut().zip(rows) {
        *slot = value_at(nulls, row as usize)?;
    }
    Ok(pos + rows.len())
}

fn write_fixed<T: LeValue>(
    buf: &mut [u8],
    pos: usize,
    values: &[T],
    lookup: &RowLookup,
    rows: &[u32],
) -> Result<usize> {
    let len = rows.len() * T::WIDTH;
    let dst = region_slice(buf, pos, len)?;
    let slots = dst.chunks_exact_mut(T::WIDTH).zip(rows);
    match lookup {
        RowLookup::Plain => {
            for (slot, &row) in slots {
                value_at(values, row as usize)?.put(slot);
            }
        }
        RowLookup::Dictionary(ids) => {
            for (slot, &row) in slots {
                let id = value_at(ids, row as usize)?;
                let index = usize::try_from(id)
                    .map_err(|_| Error::CopyFailure(format!("negative dictionary id {id}")))?;
                value_at(values, index)?.put(slot);
            }
        }
    }
    Ok(pos + len)
}

/// Decimal128 values are two consecutive words; value `i` lives at words
/// `2 * i` and `2 * i + 1`.
fn write_decimal128(
    buf: &mut [u8],
    pos: usize,
    words: &[u64],
    lookup: &RowLookup,
    rows: &[u32],
) -> Result<usize> {
    let len = rows.len() * 16;
    let dst = region_slice(buf, pos, len)?;
    for (slot, &row) in dst.chunks_exact_mut(16).zip(rows) {
        let index = lookup.index(row as usize)?;
        let lo = value_at(words, index << 1)?;
        let hi = value_at(words, (index << 1) | 1)?;
        slot[..8].copy_from_slice(&lo.to_le_bytes());
        slot[8..].copy_from_slice(&hi.to_le_bytes());
    }
    Ok(pos + len)
}

/// Writes `rows.len() + 1` cumulative offsets followed by the value bytes.
pub fn write_variable_width_values(
    buf: &mut [u8],
    pos: usize,
    reader: &ColumnReader<'_>,
    rows: &[u32],
) -> Result<usize> {
    let offsets_len = (rows.len() + 1) * OFFSET_LEN as usize;
    let mut offset_pos = put_i32_le(buf, pos, 0)?;
    let mut value_pos = pos + offsets_len;
    let value_start = value_pos;

    for &row in rows {
        let value = reader.binary_value(row as usize)?;
        value_pos = put_bytes(buf, value_pos, value).map_err(|e| {
            log::error!("Failed to write variable value with length {}", value.len());
            e
        })?;
        let total: i32 = (value_pos - value_start)
            .try_into()
            .map_err(|_| Error::CopyFailure("variable column too large".to_string()))?;
        offset_pos = put_i32_le(buf, offset_pos, total)?;
    }

    Ok(value_pos)
}

pub fn write_fixed_width_values(
    buf: &mut [u8],
    pos: usize,
    reader: &ColumnReader<'_>,
    rows: &[u32],
) -> Result<usize> {
    let lookup = reader.lookup();
    match reader.source() {
        ValueSource::Fixed1(values) => write_fixed(buf, pos, values, lookup, rows),
        ValueSource::Fixed2(values) => write_fixed(buf, pos, values, lookup, rows),
        ValueSource::Fixed4(values) => write_fixed(buf, pos, values, lookup, rows),
        ValueSource::Fixed8(values) => write_fixed(buf, pos, values, lookup, rows),
        ValueSource::Decimal128(words) => write_decimal128(buf, pos, words, lookup, rows),
        ValueSource::Binary { .. } => Err(Error::Other(
            "unexpected variable width source for fixed width column".to_string(),
        )),
    }
}

/// Null flags then payload of one column for the selected rows.
pub fn write_one_vector(
    buf: &mut [u8],
    pos: usize,
    reader: &ColumnReader<'_>,
    rows: &[u32],
) -> Result<usize> {
    let pos = write_null_values(buf, pos, reader.nulls(), rows)?;
    if reader.shuffle_type().is_variable() {
        write_variable_width_values(buf, pos, reader, rows)
    } else {
        write_fixed_width_values(buf, pos, reader, rows)
    }
}
