//! Durable capture of everything a replay forwarded to the parser.
//!
//! Frames are stored as `[len:u32 LE][crc32:u32 LE][bincode payload]`. The
//! first frame is a [`CaptureHeader`]; every forwarded payload follows as a
//! [`CapturedPayload`] in forwarding order. Two captures of the same source
//! compare equal frame by frame.
use crate::config::GnssConfig;
use crate::parser::DataParser;
use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const CAPTURE_VERSION: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureHeader {
    pub version: u16,
    pub created_unix_ns: u128,
    /// Replayed file, as given on the command line
    pub source: String,
    /// File type tag (`bag`, `bin`, `record`)
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedPayload {
    pub seq: u64, // forwarding order, from 0
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureFrame {
    Header(CaptureHeader),
    Payload(CapturedPayload),
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("bincode: {0}")]
    Codec(#[from] bincode::Error),

    #[error("CRC mismatch at frame {frame}: file={on_file:#x}, calc={calc:#x}")]
    CrcMismatch { frame: usize, on_file: u32, calc: u32 },

    #[error("frame {0} truncated")]
    Truncated(usize),
}

pub fn now_unix_ns() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

pub fn write_frame<W: Write>(w: &mut W, frame: &CaptureFrame) -> Result<(), CaptureError> {
    let payload = bincode::serialize(frame)?;
    let mut hasher = Crc32::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let len = payload.len() as u32;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(&crc.to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

/// Buffered frame writer over a file.
pub struct CaptureWriter {
    w: BufWriter<File>,
    next_seq: u64,
}

impl CaptureWriter {
    /// Create (or truncate) `path` and write the header frame.
    pub fn create(path: &Path, header: CaptureHeader) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        let mut w = BufWriter::with_capacity(1 << 20, file); // 1 MiB buffer
        write_frame(&mut w, &CaptureFrame::Header(header))?;
        Ok(Self { w, next_seq: 0 })
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<(), CaptureError> {
        let frame = CaptureFrame::Payload(CapturedPayload { seq: self.next_seq, bytes: bytes.to_vec() });
        write_frame(&mut self.w, &frame)?;
        self.next_seq += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), CaptureError> {
        self.w.flush()?;
        Ok(())
    }
}

/// Parser that writes every appended payload to a capture file.
///
/// Write failures cannot be returned through [`DataParser`]; the first one is
/// logged and kept in [`CaptureParser::error`], and later payloads are dropped.
pub struct CaptureParser {
    writer: CaptureWriter,
    error: Option<CaptureError>,
}

impl CaptureParser {
    pub fn new(writer: CaptureWriter) -> Self {
        Self { writer, error: None }
    }

    pub fn error(&self) -> Option<&CaptureError> {
        self.error.as_ref()
    }

    fn fail(&mut self, e: CaptureError) {
        tracing::error!(error = %e, "capture write failed, further payloads are not captured");
        self.error = Some(e);
    }
}

impl DataParser for CaptureParser {
    fn init(&mut self, _config: &GnssConfig) {}

    fn parse_raw_data(&mut self, data: &[u8]) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.writer.push(data) {
            self.fail(e);
        }
    }

    fn release(&mut self) {
        if self.error.is_none() {
            if let Err(e) = self.writer.flush() {
                self.fail(e);
            }
        }
    }
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Iterates the frames of a capture file, checking each CRC.
pub struct CaptureReader<R> {
    r: R,
    frames: usize,
    done: bool,
}

impl CaptureReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> CaptureReader<R> {
    pub fn new(r: R) -> Self {
        Self { r, frames: 0, done: false }
    }

    fn read_frame(&mut self) -> Result<Option<CaptureFrame>, CaptureError> {
        let len = match read_u32(&mut self.r) {
            Ok(v) => v as usize,
            // EOF at a frame boundary
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let truncated = |e: io::Error, frame| match e.kind() {
            ErrorKind::UnexpectedEof => CaptureError::Truncated(frame),
            _ => CaptureError::Io(e),
        };
        let crc_on_file = read_u32(&mut self.r).map_err(|e| truncated(e, self.frames))?;
        let mut payload = vec![0u8; len];
        self.r.read_exact(&mut payload).map_err(|e| truncated(e, self.frames))?;
        let mut hasher = Crc32::new();
        hasher.update(&payload);
        let crc_calc = hasher.finalize();
        if crc_calc != crc_on_file {
            return Err(CaptureError::CrcMismatch { frame: self.frames, on_file: crc_on_file, calc: crc_calc });
        }
        let frame = bincode::deserialize(&payload)?;
        self.frames += 1;
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<CaptureFrame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.read_frame().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}
