//! Raw-stream extractor: the whole file is receiver output, forwarded in
//! fixed-size windows with no notion of message boundaries.
use crate::error::{ContainerError, ReplayError};
use crate::parser::{DataParser, ParserHandle};
use crate::replay::ReplayStats;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read until `buf` is full or the reader reports end of input.
fn fill_window<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Forward `reader` to the parser in windows of `chunk_size` bytes.
///
/// Every window is full except possibly the last, so a stream of `L` bytes
/// produces exactly `ceil(L / chunk_size)` appends. Only the bytes actually
/// read are forwarded. A `chunk_size` of zero is treated as one.
pub fn replay_raw<R: Read, P: DataParser>(
    mut reader: R,
    chunk_size: usize,
    parser: &mut ParserHandle<P>,
) -> io::Result<ReplayStats> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut stats = ReplayStats::default();
    loop {
        let n = fill_window(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        parser.append(&buf[..n]);
        stats.records += 1;
        stats.forwarded += 1;
        stats.bytes += n as u64;
        if n < buf.len() {
            break;
        }
    }
    tracing::debug!(chunks = stats.forwarded, bytes = stats.bytes, "raw stream exhausted");
    Ok(stats)
}

/// Open `path` in binary mode and replay it as a raw stream.
///
/// A read error after the first byte ends the replay as
/// [`ReplayError::Interrupted`]; windows read before it stay forwarded.
pub fn replay_raw_file<P: DataParser>(
    path: &Path,
    chunk_size: usize,
    parser: &mut ParserHandle<P>,
) -> Result<ReplayStats, ReplayError> {
    let file = File::open(path).map_err(|e| ReplayError::opening(path, ContainerError::Io(e)))?;
    replay_raw(BufReader::new(file), chunk_size, parser).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "raw stream read failed, stopping replay");
        ReplayError::reading(path, ContainerError::Io(e))
    })
}
