//! Chunk compressors of Zarr v2 arrays.
//!
//! Covers the numcodecs compressors Zarr writers emit by default: `blosc`
//! (the zarr-python default, any inner codec) and the `zlib` / `gzip`
//! stream codecs.

use flate2::read::{GzDecoder, ZlibDecoder};
use serde_json::Value;
use std::io::Read;

/// Compressor named by the `compressor` field of a `.zarray` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Compressor {
    /// Chunk files hold raw element bytes
    None,
    /// Blosc1 frame (shuffle and inner codec are recorded in the frame header)
    Blosc,
    /// zlib stream
    Zlib,
    /// gzip member
    Gzip,
}

impl Compressor {
    /// Parses the `compressor` value; `Err` carries the unsupported codec id.
    pub(crate) fn from_zarr(value: Option<&Value>) -> Result<Self, String> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return Ok(Self::None);
        };
        match value.get("id").and_then(Value::as_str) {
            Some("blosc") => Ok(Self::Blosc),
            Some("zlib") => Ok(Self::Zlib),
            Some("gzip") => Ok(Self::Gzip),
            Some(other) => Err(other.to_string()),
            None => Err("unknown".to_string()),
        }
    }

    /// Expands one chunk file into raw element bytes.
    ///
    /// `expected` is the decoded size of a full chunk and bounds the output.
    pub(crate) fn decompress(self, bytes: Vec<u8>, expected: usize) -> Result<Vec<u8>, String> {
        match self {
            Self::None => Ok(bytes),
            Self::Blosc => blosc_decompress(&bytes, expected),
            Self::Zlib => read_stream(ZlibDecoder::new(bytes.as_slice()), expected, "zlib"),
            Self::Gzip => read_stream(GzDecoder::new(bytes.as_slice()), expected, "gzip"),
        }
    }
}

fn read_stream(decoder: impl Read, expected: usize, codec: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(expected);
    decoder
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| format!("{} chunk: {}", codec, e))?;
    Ok(out)
}

fn blosc_decompress(bytes: &[u8], expected: usize) -> Result<Vec<u8>, String> {
    let mut nbytes: usize = 0;
    // SAFETY: validate reads at most `bytes.len()` bytes of the frame.
    let valid = unsafe {
        blosc_src::blosc_cbuffer_validate(
            bytes.as_ptr().cast(),
            bytes.len() as _,
            (&mut nbytes as *mut usize).cast(),
        )
    };
    if valid < 0 {
        return Err(format!("blosc chunk: invalid frame of {} bytes", bytes.len()));
    }
    if nbytes > expected {
        return Err(format!("blosc chunk expands to {} bytes, expected {}", nbytes, expected));
    }

    let mut out = vec![0u8; nbytes];
    if nbytes == 0 {
        return Ok(out);
    }
    // SAFETY: the frame was validated above and `out` holds its full decoded size.
    let written = unsafe {
        blosc_src::blosc_decompress_ctx(bytes.as_ptr().cast(), out.as_mut_ptr().cast(), out.len() as _, 1)
    };
    if written < 0 || written as usize != nbytes {
        return Err(format!("blosc chunk: decompression failed ({})", written));
    }
    Ok(out)
}
