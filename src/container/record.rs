//! Cyber record reader.
//!
//! ```text
//! section := [type:i32][pad:4][size:i64][body: size bytes]
//! file    := header section (body padded to 2048 bytes), then chunk
//!            header/body pairs, channel sections and a trailing index
//! ```
//!
//! Chunk bodies hold the stored messages, compressed with the codec named in
//! the header. Reading stops at the index section, which only repeats what the
//! chunks already contain.
use super::{Compression, ContainerFormat, Record, RecordIter};
use crate::error::ContainerError;
use prost::Message;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

pub const SECTION_HEADER: i32 = 0;
pub const SECTION_CHUNK_HEADER: i32 = 1;
pub const SECTION_CHUNK_BODY: i32 = 2;
pub const SECTION_INDEX: i32 = 3;
pub const SECTION_CHANNEL: i32 = 4;

/// Bytes reserved for the header body after its section prefix.
pub const HEADER_LENGTH: usize = 2048;
pub const SECTION_PREFIX_LEN: usize = 16;

pub const COMPRESS_NONE: i32 = 0;
pub const COMPRESS_BZ2: i32 = 1;
pub const COMPRESS_LZ4: i32 = 2;

const MAX_SECTION_LEN: u64 = 1 << 31;

/// Protobuf messages stored in a record file.
pub mod proto {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Header {
        #[prost(uint32, optional, tag = "1")]
        pub major_version: Option<u32>,
        #[prost(uint32, optional, tag = "2")]
        pub minor_version: Option<u32>,
        #[prost(int32, optional, tag = "3")]
        pub compress: Option<i32>,
        #[prost(uint64, optional, tag = "4")]
        pub chunk_interval: Option<u64>,
        #[prost(uint64, optional, tag = "5")]
        pub segment_interval: Option<u64>,
        #[prost(uint64, optional, tag = "6")]
        pub index_position: Option<u64>,
        #[prost(uint64, optional, tag = "7")]
        pub chunk_number: Option<u64>,
        #[prost(uint64, optional, tag = "8")]
        pub channel_number: Option<u64>,
        #[prost(uint64, optional, tag = "9")]
        pub begin_time: Option<u64>,
        #[prost(uint64, optional, tag = "10")]
        pub end_time: Option<u64>,
        #[prost(uint64, optional, tag = "11")]
        pub message_number: Option<u64>,
        #[prost(uint64, optional, tag = "12")]
        pub size: Option<u64>,
        #[prost(bool, optional, tag = "13")]
        pub is_complete: Option<bool>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SingleMessage {
        #[prost(string, optional, tag = "1")]
        pub channel_name: Option<String>,
        #[prost(uint64, optional, tag = "2")]
        pub time: Option<u64>,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub content: Option<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ChunkBody {
        #[prost(message, repeated, tag = "1")]
        pub messages: Vec<SingleMessage>,
    }

    /// Common message header carried by driver messages.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct CommonHeader {
        #[prost(double, optional, tag = "1")]
        pub timestamp_sec: Option<f64>,
        #[prost(string, optional, tag = "2")]
        pub module_name: Option<String>,
        #[prost(uint32, optional, tag = "3")]
        pub sequence_num: Option<u32>,
        #[prost(string, optional, tag = "9")]
        pub frame_id: Option<String>,
    }

    /// Envelope published on the GNSS raw data channel.
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RawData {
        #[prost(message, optional, tag = "1")]
        pub header: Option<CommonHeader>,
        #[prost(bytes = "vec", optional, tag = "2")]
        pub data: Option<Vec<u8>>,
    }
}

/// Read a section prefix, or `None` on a clean end of file.
fn read_section<R: Read>(r: &mut R) -> Result<Option<(i32, u64)>, ContainerError> {
    let mut buf = [0u8; SECTION_PREFIX_LEN];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(ContainerError::malformed("record section", "truncated section prefix")),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    let kind = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let size = i64::from_le_bytes([buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15]]);
    if size < 0 || size as u64 > MAX_SECTION_LEN {
        return Err(ContainerError::malformed("record section", format!("section size {size}")));
    }
    Ok(Some((kind, size as u64)))
}

fn read_body<R: Read>(r: &mut R, size: u64) -> Result<Vec<u8>, ContainerError> {
    let mut body = vec![0u8; size as usize];
    r.read_exact(&mut body).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ContainerError::malformed("record section", "truncated section body"),
        _ => ContainerError::Io(e),
    })?;
    Ok(body)
}

fn skip_body<R: Read>(r: &mut R, size: u64) -> Result<(), ContainerError> {
    let skipped = io::copy(&mut r.take(size), &mut io::sink())?;
    if skipped != size {
        return Err(ContainerError::malformed("record section", "truncated section body"));
    }
    Ok(())
}

/// Record iterator over one open record file.
struct CyberRecords {
    reader: BufReader<File>,
    pending: VecDeque<proto::SingleMessage>,
    compression: Compression,
    done: bool,
}

impl CyberRecords {
    fn advance(&mut self) -> Result<Option<Record>, ContainerError> {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                return Ok(Some(Record {
                    channel: msg.channel_name.unwrap_or_default(),
                    time_ns: msg.time.unwrap_or_default(),
                    msg_type: None,
                    payload: msg.content.unwrap_or_default(),
                }));
            }
            let Some((kind, size)) = read_section(&mut self.reader)? else {
                return Ok(None);
            };
            match kind {
                SECTION_CHUNK_BODY => {
                    let body = self.compression.decompress(read_body(&mut self.reader, size)?, None)?;
                    let chunk = proto::ChunkBody::decode(body.as_slice())?;
                    self.pending.extend(chunk.messages);
                }
                SECTION_INDEX => return Ok(None),
                SECTION_CHUNK_HEADER | SECTION_CHANNEL => skip_body(&mut self.reader, size)?,
                other => {
                    tracing::debug!(section = other, size, "skipping unknown record section");
                    skip_body(&mut self.reader, size)?;
                }
            }
        }
    }
}

impl Iterator for CyberRecords {
    type Item = Result<Record, ContainerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Cyber record whose target messages are `RawData` envelopes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CyberRecordFormat;

impl CyberRecordFormat {
    /// Open `path` and validate its header section.
    fn open_reader(path: &Path) -> Result<(BufReader<File>, proto::Header, Compression), ContainerError> {
        let mut reader = BufReader::new(File::open(path)?);
        let (kind, size) = match read_section(&mut reader) {
            Ok(Some(section)) => section,
            Ok(None) | Err(ContainerError::Malformed { .. }) => return Err(ContainerError::BadMagic("cyber record")),
            Err(e) => return Err(e),
        };
        if kind != SECTION_HEADER {
            return Err(ContainerError::BadMagic("cyber record"));
        }
        if size as usize > HEADER_LENGTH {
            return Err(ContainerError::malformed("record header", format!("header size {size}")));
        }
        let block = read_body(&mut reader, HEADER_LENGTH as u64)?;
        let header = proto::Header::decode(&block[..size as usize])?;
        let compression = Compression::from_record_header(header.compress.unwrap_or(COMPRESS_NONE))?;
        Ok((reader, header, compression))
    }
}

impl ContainerFormat for CyberRecordFormat {
    fn name(&self) -> &'static str {
        "cyber record"
    }

    fn open(&self, path: &Path) -> Result<RecordIter, ContainerError> {
        let (reader, header, compression) = Self::open_reader(path)?;
        tracing::debug!(
            compression = compression.as_str(),
            version = %format!("{}.{}", header.major_version.unwrap_or(0), header.minor_version.unwrap_or(0)),
            messages = header.message_number.unwrap_or(0),
            complete = header.is_complete.unwrap_or(false),
            "opened record"
        );
        Ok(Box::new(CyberRecords { reader, pending: VecDeque::new(), compression, done: false }))
    }

    fn unwrap_payload(&self, record: Record) -> Result<Vec<u8>, ContainerError> {
        let raw = proto::RawData::decode(record.payload.as_slice())?;
        Ok(raw.data.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::fixtures::{RecordChunk, raw_data, write_record, write_record_with};

    #[test]
    fn yields_messages_in_stored_order_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.record");
        write_record(
            &path,
            &[
                RecordChunk::new().message("/a", 10, raw_data(b"x")).message("/b", 20, raw_data(b"y")),
                RecordChunk::new(),
                RecordChunk::new().message("/c", 5, raw_data(b"z")),
            ],
        );
        let records: Vec<Record> = CyberRecordFormat.open(&path).unwrap().collect::<Result<_, _>>().unwrap();
        let seen: Vec<(&str, u64)> = records.iter().map(|r| (r.channel.as_str(), r.time_ns)).collect();
        assert_eq!(seen, vec![("/a", 10), ("/b", 20), ("/c", 5)]);
        assert_eq!(CyberRecordFormat.unwrap_payload(records[2].clone()).unwrap(), b"z");
    }

    #[test]
    fn envelope_unwrap_keeps_binary_data() {
        let data: Vec<u8> = (0..=255).collect();
        let rec = Record { channel: "/a".into(), time_ns: 0, msg_type: None, payload: raw_data(&data) };
        assert_eq!(CyberRecordFormat.unwrap_payload(rec).unwrap(), data);
    }

    #[test]
    fn garbage_envelope_is_decode_error() {
        let rec = Record { channel: "/a".into(), time_ns: 0, msg_type: None, payload: vec![0x12, 0xff, 0x01] };
        assert!(matches!(CyberRecordFormat.unwrap_payload(rec), Err(ContainerError::Decode(_))));
    }

    #[test]
    fn non_record_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.record");
        std::fs::write(&path, b"tiny").unwrap();
        assert!(matches!(CyberRecordFormat.open(&path), Err(ContainerError::BadMagic(_))));

        let mut bytes = vec![0u8; SECTION_PREFIX_LEN + HEADER_LENGTH];
        bytes[0] = SECTION_CHUNK_BODY as u8;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(CyberRecordFormat.open(&path), Err(ContainerError::BadMagic(_))));
    }

    #[test]
    fn bz2_and_lz4_chunk_bodies_are_decompressed() {
        let dir = tempfile::tempdir().unwrap();
        for compress in [COMPRESS_BZ2, COMPRESS_LZ4] {
            let path = dir.path().join(format!("{compress}.record"));
            write_record_with(
                &path,
                compress,
                &[
                    RecordChunk::new().message("/a", 1, raw_data(b"x")).message("/b", 2, raw_data(b"y")),
                    RecordChunk::new().message("/a", 3, raw_data(b"z")),
                ],
            );
            let payloads: Vec<Vec<u8>> = CyberRecordFormat
                .open(&path)
                .unwrap()
                .map(|r| CyberRecordFormat.unwrap_payload(r.unwrap()).unwrap())
                .collect();
            assert_eq!(payloads, vec![b"x".to_vec(), b"y".to_vec(), b"z".to_vec()], "compress={compress}");
        }
    }

    #[test]
    fn unknown_compression_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zstd.record");
        let header = proto::Header { compress: Some(9), ..Default::default() }.encode_to_vec();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SECTION_HEADER.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.extend_from_slice(&(header.len() as i64).to_le_bytes());
        bytes.extend_from_slice(&header);
        bytes.resize(SECTION_PREFIX_LEN + HEADER_LENGTH, b'0');
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(CyberRecordFormat.open(&path), Err(ContainerError::Unsupported(_))));
    }

    #[test]
    fn truncated_chunk_body_ends_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.record");
        write_record(&path, &[RecordChunk::new().message("/a", 1, raw_data(b"payload"))]);
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        let results: Vec<_> = CyberRecordFormat.open(&path).unwrap().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
