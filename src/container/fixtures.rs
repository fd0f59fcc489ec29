//! Writers for small bag and record files used by unit tests.
use super::Compression;
use super::bag::{BAG_MAGIC, OP_BAG_HEADER, OP_CHUNK, OP_CONNECTION, OP_MSG_DATA, STRING_MSG_TYPE};
use super::record::{HEADER_LENGTH, SECTION_CHUNK_BODY, SECTION_CHUNK_HEADER, SECTION_HEADER, proto};
use prost::Message;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Encode `data` with `codec`.
pub fn compress(codec: Compression, data: &[u8]) -> Vec<u8> {
    match codec {
        Compression::None => data.to_vec(),
        Compression::Bz2 => {
            let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            enc.write_all(data).unwrap();
            enc.finish().unwrap()
        }
        Compression::Lz4 => {
            let mut enc = lz4_flex::frame::FrameEncoder::new(Vec::new());
            enc.write_all(data).unwrap();
            enc.finish().unwrap()
        }
    }
}

/// Serialize `data` as a `std_msgs/String`.
pub fn ros_string(data: &[u8]) -> Vec<u8> {
    let mut out = (data.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(data);
    out
}

/// Serialize `data` as a `RawData` envelope.
pub fn raw_data(data: &[u8]) -> Vec<u8> {
    proto::RawData {
        header: Some(proto::CommonHeader {
            module_name: Some("gnss".into()),
            ..Default::default()
        }),
        data: Some(data.to_vec()),
    }
    .encode_to_vec()
}

pub struct BagChunk {
    compression: &'static str,
    messages: Vec<(String, String, u64, Vec<u8>)>,
}

impl BagChunk {
    pub fn new() -> Self {
        Self { compression: "none", messages: Vec::new() }
    }

    pub fn compression(mut self, c: &'static str) -> Self {
        self.compression = c;
        self
    }

    pub fn message(self, topic: &str, time_ns: u64, payload: Vec<u8>) -> Self {
        self.typed_message(topic, STRING_MSG_TYPE, time_ns, payload)
    }

    pub fn typed_message(mut self, topic: &str, msg_type: &str, time_ns: u64, payload: Vec<u8>) -> Self {
        self.messages.push((topic.to_string(), msg_type.to_string(), time_ns, payload));
        self
    }
}

fn bag_fields(fields: &[(&str, &[u8])]) -> Vec<u8> {
    let mut header = Vec::new();
    for (name, value) in fields {
        header.extend_from_slice(&((name.len() + 1 + value.len()) as u32).to_le_bytes());
        header.extend_from_slice(name.as_bytes());
        header.push(b'=');
        header.extend_from_slice(value);
    }
    header
}

fn bag_record(out: &mut Vec<u8>, fields: &[(&str, &[u8])], data: &[u8]) {
    let header = bag_fields(fields);
    out.extend_from_slice(&(header.len() as u32).to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
}

/// Write a bag with one chunk record per [`BagChunk`], nothing after them.
///
/// Chunks named `bz2` or `lz4` are compressed; any other name is written raw.
pub fn write_bag(path: &Path, chunks: &[BagChunk]) {
    let mut out = BAG_MAGIC.to_vec();
    bag_record(
        &mut out,
        &[
            ("op", &[OP_BAG_HEADER]),
            ("index_pos", &0u64.to_le_bytes()),
            ("conn_count", &0u32.to_le_bytes()),
            ("chunk_count", &(chunks.len() as u32).to_le_bytes()),
        ],
        &[b' '; 64],
    );
    let mut conns: HashMap<(String, String), u32> = HashMap::new();
    for chunk in chunks {
        let mut body = Vec::new();
        let mut declared: Vec<u32> = Vec::new();
        for (topic, msg_type, time_ns, payload) in &chunk.messages {
            let next_id = conns.len() as u32;
            let id = *conns.entry((topic.clone(), msg_type.clone())).or_insert(next_id);
            if !declared.contains(&id) {
                declared.push(id);
                let conn_header = bag_fields(&[
                    ("topic", topic.as_bytes()),
                    ("type", msg_type.as_bytes()),
                    ("md5sum", b"992ce8a1687cec8c8bd883ec73ca41d1"),
                ]);
                bag_record(
                    &mut body,
                    &[("op", &[OP_CONNECTION]), ("conn", &id.to_le_bytes()), ("topic", topic.as_bytes())],
                    &conn_header,
                );
            }
            let mut time = ((time_ns / 1_000_000_000) as u32).to_le_bytes().to_vec();
            time.extend_from_slice(&((time_ns % 1_000_000_000) as u32).to_le_bytes());
            bag_record(
                &mut body,
                &[("op", &[OP_MSG_DATA]), ("conn", &id.to_le_bytes()), ("time", &time)],
                payload,
            );
        }
        let stored = match Compression::from_bag_field(chunk.compression.as_bytes()) {
            Ok(codec) => compress(codec, &body),
            Err(_) => body.clone(),
        };
        bag_record(
            &mut out,
            &[
                ("op", &[OP_CHUNK]),
                ("compression", chunk.compression.as_bytes()),
                ("size", &(body.len() as u32).to_le_bytes()),
            ],
            &stored,
        );
    }
    std::fs::write(path, out).unwrap();
}

pub struct RecordChunk {
    messages: Vec<proto::SingleMessage>,
}

impl RecordChunk {
    pub fn new() -> Self {
        Self { messages: Vec::new() }
    }

    pub fn message(mut self, channel: &str, time: u64, content: Vec<u8>) -> Self {
        self.messages.push(proto::SingleMessage {
            channel_name: Some(channel.to_string()),
            time: Some(time),
            content: Some(content),
        });
        self
    }
}

fn section(out: &mut Vec<u8>, kind: i32, body: &[u8]) {
    out.extend_from_slice(&kind.to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(body.len() as i64).to_le_bytes());
    out.extend_from_slice(body);
}

/// Write a record with a header and one chunk header/body pair per
/// [`RecordChunk`], without a trailing index.
pub fn write_record(path: &Path, chunks: &[RecordChunk]) {
    write_record_with(path, 0, chunks)
}

/// [`write_record`] with the header's `compress` field set to `compress`;
/// bz2 (1) and lz4 (2) chunk bodies are compressed to match.
pub fn write_record_with(path: &Path, compress_type: i32, chunks: &[RecordChunk]) {
    let codec = Compression::from_record_header(compress_type).unwrap_or_default();
    let header = proto::Header {
        major_version: Some(1),
        minor_version: Some(0),
        compress: Some(compress_type),
        chunk_number: Some(chunks.len() as u64),
        ..Default::default()
    }
    .encode_to_vec();
    let mut out = Vec::new();
    section(&mut out, SECTION_HEADER, &header);
    out.resize(out.len() + HEADER_LENGTH - header.len(), b'0');
    for chunk in chunks {
        section(&mut out, SECTION_CHUNK_HEADER, &[0x08, 0x01]);
        let body = proto::ChunkBody { messages: chunk.messages.clone() }.encode_to_vec();
        section(&mut out, SECTION_CHUNK_BODY, &compress(codec, &body));
    }
    std::fs::write(path, out).unwrap();
}
