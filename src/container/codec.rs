//! Chunk compression shared by both container formats.
use super::record::{COMPRESS_BZ2, COMPRESS_LZ4, COMPRESS_NONE};
use crate::error::ContainerError;
use std::io::Read;

/// Codec applied to a bag chunk or to every chunk body of a record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Bz2,
    /// LZ4 frame format.
    Lz4,
}

impl Compression {
    /// Value of a bag chunk's `compression` header field.
    pub fn from_bag_field(value: &[u8]) -> Result<Self, ContainerError> {
        match value {
            b"none" => Ok(Compression::None),
            b"bz2" => Ok(Compression::Bz2),
            b"lz4" => Ok(Compression::Lz4),
            other => Err(ContainerError::Unsupported(format!(
                "bag chunk compression {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// `compress` field of a record header.
    pub fn from_record_header(value: i32) -> Result<Self, ContainerError> {
        match value {
            COMPRESS_NONE => Ok(Compression::None),
            COMPRESS_BZ2 => Ok(Compression::Bz2),
            COMPRESS_LZ4 => Ok(Compression::Lz4),
            other => Err(ContainerError::Unsupported(format!("record compression type {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Bz2 => "bz2",
            Compression::Lz4 => "lz4",
        }
    }

    /// Decode `data`, checking the result against `expected` when the
    /// container records the uncompressed size.
    pub fn decompress(self, data: Vec<u8>, expected: Option<usize>) -> Result<Vec<u8>, ContainerError> {
        let out = match self {
            Compression::None => data,
            Compression::Bz2 => read_all(bzip2::read::BzDecoder::new(data.as_slice()), expected, self)?,
            Compression::Lz4 => read_all(lz4_flex::frame::FrameDecoder::new(data.as_slice()), expected, self)?,
        };
        match expected {
            Some(len) if len != out.len() => Err(ContainerError::malformed(
                "compressed chunk",
                format!("{} chunk decodes to {} bytes, header says {len}", self.as_str(), out.len()),
            )),
            _ => Ok(out),
        }
    }
}

fn read_all<R: Read>(mut decoder: R, expected: Option<usize>, codec: Compression) -> Result<Vec<u8>, ContainerError> {
    let mut out = Vec::with_capacity(expected.unwrap_or(0));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ContainerError::malformed("compressed chunk", format!("{} stream: {e}", codec.as_str())))?;
    Ok(out)
}
