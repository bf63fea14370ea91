use crate::{Error, Result};

#[cfg(any(feature = "compression-zstd", feature = "compression-gzip"))]
use std::io::{Read, Write};

#[cfg(feature = "tools-json")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "tools-json", derive(Serialize, Deserialize))]
pub enum Compression {
    #[default]
    None,
    Zstd {
        level: i32,
    },
    Gzip {
        level: u32,
    },
}

impl Compression {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

#[cfg(feature = "compression-zstd")]
fn compress_zstd_into(out: &mut Vec<u8>, plain: &[u8], level: i32) -> Result<()> {
    if !(-7..=22).contains(&level) {
        return Err(Error::Compression("invalid zstd level".to_string()));
    }
    let mut enc = zstd::stream::write::Encoder::new(out, level)
        .map_err(|e| Error::Compression(e.to_string()))?;
    enc.write_all(plain)
        .map_err(|e| Error::Compression(e.to_string()))?;
    let _ = enc.finish().map_err(|e| Error::Compression(e.to_string()))?;
    Ok(())
}

#[cfg(not(feature = "compression-zstd"))]
fn compress_zstd_into(_out: &mut Vec<u8>, _plain: &[u8], _level: i32) -> Result<()> {
    Err(Error::Compression(
        "zstd compression feature not enabled".to_string(),
    ))
}

#[cfg(feature = "compression-gzip")]
fn compress_gzip_into(out: &mut Vec<u8>, plain: &[u8], level: u32) -> Result<()> {
    if level > 9 {
        return Err(Error::Compression("invalid gzip level".to_string()));
    }
    let mut enc = flate2::GzBuilder::new()
        .mtime(0)
        .write(out, flate2::Compression::new(level));
    enc.write_all(plain)
        .map_err(|e| Error::Compression(e.to_string()))?;
    let _ = enc.finish().map_err(|e| Error::Compression(e.to_string()))?;
    Ok(())
}

#[cfg(not(feature = "compression-gzip"))]
fn compress_gzip_into(_out: &mut Vec<u8>, _plain: &[u8], _level: u32) -> Result<()> {
    Err(Error::Compression(
        "gzip compression feature not enabled".to_string(),
    ))
}

#[cfg(any(feature = "compression-zstd", feature = "compression-gzip"))]
fn decode_with_max_bound<R: Read>(
    reader: R,
    max_uncompressed_len: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let start = out.len();
    let mut limited = reader.take((max_uncompressed_len as u64) + 1);
    limited
        .read_to_end(out)
        .map_err(|e| Error::Compression(e.to_string()))?;
    if out.len() - start > max_uncompressed_len {
        return Err(Error::Compression(
            "decompressed payload exceeds max_uncompressed_len".to_string(),
        ));
    }
    Ok(())
}

#[cfg(feature = "compression-zstd")]
fn decompress_zstd_into(
    bytes: &[u8],
    max_uncompressed_len: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let dec =
        zstd::stream::read::Decoder::new(bytes).map_err(|e| Error::Compression(e.to_string()))?;
    decode_with_max_bound(dec, max_uncompressed_len, out)
}

#[cfg(not(feature = "compression-zstd"))]
fn decompress_zstd_into(
    _bytes: &[u8],
    _max_uncompressed_len: usize,
    _out: &mut Vec<u8>,
) -> Result<()> {
    Err(Error::Compression(
        "zstd compression feature not enabled".to_string(),
    ))
}

#[cfg(feature = "compression-gzip")]
fn decompress_gzip_into(
    bytes: &[u8],
    max_uncompressed_len: usize,
    out: &mut Vec<u8>,
) -> Result<()> {
    let dec = flate2::read::GzDecoder::new(bytes);
    decode_with_max_bound(dec, max_uncompressed_len, out)
}

#[cfg(not(feature = "compression-gzip"))]
fn decompress_gzip_into(
    _bytes: &[u8],
    _max_uncompressed_len: usize,
    _out: &mut Vec<u8>,
) -> Result<()> {
    Err(Error::Compression(
        "gzip compression feature not enabled".to_string(),
    ))
}

/// Appends `plain` to `out`, compressed with `c`.
pub fn compress_into(out: &mut Vec<u8>, plain: &[u8], c: Compression) -> Result<()> {
    match c {
        Compression::None => {
            out.extend_from_slice(plain);
            Ok(())
        }
        Compression::Zstd { level } => compress_zstd_into(out, plain, level),
        Compression::Gzip { level } => compress_gzip_into(out, plain, level),
    }
}

/// Appends the decompressed form of `bytes` to `out`, refusing to produce more
/// than `max_uncompressed_len` bytes.
pub fn decompress_into(
    out: &mut Vec<u8>,
    bytes: &[u8],
    c: Compression,
    max_uncompressed_len: usize,
) -> Result<()> {
    match c {
        Compression::None => {
            if bytes.len() > max_uncompressed_len {
                return Err(Error::Compression(
                    "decompressed payload exceeds max_uncompressed_len".to_string(),
                ));
            }
            out.extend_from_slice(bytes);
            Ok(())
        }
        Compression::Zstd { .. } => decompress_zstd_into(bytes, max_uncompressed_len, out),
        Compression::Gzip { .. } => decompress_gzip_into(bytes, max_uncompressed_len, out),
    }
}
