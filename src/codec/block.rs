use crate::schema::{BLOCK_HEADER_LEN, DECIMAL128_LEN, OFFSET_LEN, ShuffleType};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHeader {
    /// Whole block length in bytes, header included.
    pub length: u32,
    pub row_count: u32,
}

impl BlockHeader {
    pub fn write_at(&self, buf: &mut [u8], pos: usize) -> Result<usize> {
        let pos = put_u32_le(buf, pos, self.length)?;
        put_u32_le(buf, pos, self.row_count)
    }

    pub fn read_at(bytes: &[u8], pos: &mut usize) -> Result<Self> {
        let length = read_u32_le(bytes, pos)?;
        let row_count = read_u32_le(bytes, pos)?;
        if length < BLOCK_HEADER_LEN {
            return Err(Error::CopyFailure(format!(
                "block length {length} shorter than its header"
            )));
        }
        Ok(Self { length, row_count })
    }
}

#[inline]
pub fn put_bytes(buf: &mut [u8], pos: usize, src: &[u8]) -> Result<usize> {
    let end = pos
        .checked_add(src.len())
        .ok_or_else(|| Error::CopyFailure("write offset overflow".to_string()))?;
    let dst = buf.get_mut(pos..end).ok_or_else(|| {
        Error::CopyFailure(format!(
            "write of {} bytes at offset {pos} overruns region",
            src.len()
        ))
    })?;
    dst.copy_from_slice(src);
    Ok(end)
}

#[inline]
pub fn put_u32_le(buf: &mut [u8], pos: usize, v: u32) -> Result<usize> {
    put_bytes(buf, pos, &v.to_le_bytes())
}

#[inline]
pub fn put_i32_le(buf: &mut [u8], pos: usize, v: i32) -> Result<usize> {
    put_bytes(buf, pos, &v.to_le_bytes())
}

pub fn take<'a>(bytes: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(n)
        .ok_or_else(|| Error::CopyFailure("read offset overflow".to_string()))?;
    if end > bytes.len() {
        return Err(Error::CopyFailure("truncated shuffle block".to_string()));
    }
    let slice = &bytes[*pos..end];
    *pos = end;
    Ok(slice)
}

pub fn read_u32_le(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let b = take(bytes, pos, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline]
fn i32_at(bytes: &[u8], index: usize) -> i32 {
    let j = index * 4;
    i32::from_le_bytes([bytes[j], bytes[j + 1], bytes[j + 2], bytes[j + 3]])
}

/// Payload of one column inside a scanned block, still in wire form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSlice<'a> {
    Fixed { width: u32, bytes: &'a [u8] },
    Decimal128(&'a [u8]),
    Binary { offsets: &'a [u8], data: &'a [u8] },
}

impl<'a> PayloadSlice<'a> {
    /// Offset entry `index` of a binary payload.
    pub fn offset(&self, index: usize) -> Option<i32> {
        match self {
            PayloadSlice::Binary { offsets, .. } if (index + 1) * 4 <= offsets.len() => {
                Some(i32_at(offsets, index))
            }
            _ => None,
        }
    }

    /// Total value bytes of a binary payload, i.e. its last offset entry.
    pub fn value_length(&self) -> Option<u32> {
        match self {
            PayloadSlice::Binary { data, .. } => Some(data.len() as u32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSlice<'a> {
    pub nulls: &'a [u8],
    pub payload: PayloadSlice<'a>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockView<'a> {
    pub header: BlockHeader,
    pub columns: Vec<ColumnSlice<'a>>,
}

/// Reads only the header of the block starting at `pos`, without moving it.
pub fn peek_header(bytes: &[u8], pos: usize) -> Result<BlockHeader> {
    let mut cursor = pos;
    BlockHeader::read_at(bytes, &mut cursor)
}

/// Splits the block starting at `*pos` into per-column slices and advances
/// `*pos` past it. The column walk must land exactly on the header length.
pub fn scan_block<'a>(
    bytes: &'a [u8],
    pos: &mut usize,
    types: &[ShuffleType],
) -> Result<BlockView<'a>> {
    let start = *pos;
    let header = BlockHeader::read_at(bytes, pos)?;
    let end = start
        .checked_add(header.length as usize)
        .ok_or_else(|| Error::CopyFailure("block length overflow".to_string()))?;
    if end > bytes.len() {
        return Err(Error::CopyFailure("truncated shuffle block".to_string()));
    }
    let block = &bytes[..end];
    let rows = header.row_count as usize;

    let mut columns = Vec::with_capacity(types.len());
    for (col, ty) in types.iter().enumerate() {
        let nulls = take(block, pos, rows)?;
        let payload = match ty {
            ShuffleType::Binary => {
                let offsets_len = (rows + 1)
                    .checked_mul(OFFSET_LEN as usize)
                    .ok_or_else(|| Error::CopyFailure("offsets overflow".to_string()))?;
                let offsets = take(block, pos, offsets_len)?;
                if i32_at(offsets, 0) != 0 {
                    return Err(Error::CopyFailure(format!(
                        "column {col}: offsets[0] must be 0"
                    )));
                }
                let mut prev = 0i32;
                for i in 1..=rows {
                    let o = i32_at(offsets, i);
                    if o < prev {
                        return Err(Error::CopyFailure(format!(
                            "column {col}: offsets must be non-decreasing"
                        )));
                    }
                    prev = o;
                }
                let data = take(block, pos, prev as usize)?;
                PayloadSlice::Binary { offsets, data }
            }
            ShuffleType::Decimal128 => {
                let len = rows
                    .checked_mul(DECIMAL128_LEN as usize)
                    .ok_or_else(|| Error::CopyFailure("values overflow".to_string()))?;
                PayloadSlice::Decimal128(take(block, pos, len)?)
            }
            fixed => {
                let width = fixed.fixed_width().unwrap_or(0);
                let len = rows
                    .checked_mul(width as usize)
                    .ok_or_else(|| Error::CopyFailure("values overflow".to_string()))?;
                PayloadSlice::Fixed {
                    width,
                    bytes: take(block, pos, len)?,
                }
            }
        };
        columns.push(ColumnSlice { nulls, payload });
    }

    if *pos != end {
        return Err(Error::CopyFailure(format!(
            "block declares {} bytes but its columns span {}",
            header.length,
            *pos - start
        )));
    }

    Ok(BlockView { header, columns })
}
