//! ROS bag v2.0 reader.
//!
//! ```text
//! "#ROSBAG V2.0\n"
//! record := [header_len:u32][field...][data_len:u32][data]
//! field  := [field_len:u32][name '=' value]
//! ```
//!
//! The `op` header field tags each record. Message data and the connection
//! records that name their topics live inside chunk records, which may be
//! stored raw, bz2 or lz4 compressed.
use super::{Compression, ContainerFormat, Record, RecordIter};
use crate::error::ContainerError;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

pub const BAG_MAGIC: &[u8] = b"#ROSBAG V2.0\n";

pub const OP_MSG_DATA: u8 = 0x02;
pub const OP_BAG_HEADER: u8 = 0x03;
pub const OP_INDEX_DATA: u8 = 0x04;
pub const OP_CHUNK: u8 = 0x05;
pub const OP_CHUNK_INFO: u8 = 0x06;
pub const OP_CONNECTION: u8 = 0x07;

/// The only message type whose payload layout is understood.
pub const STRING_MSG_TYPE: &str = "std_msgs/String";

/// Upper bound on a single header or data block.
const MAX_BLOCK_LEN: usize = 1 << 30;

/// Parsed `name=value` header fields of one record.
struct Fields<'a>(Vec<(&'a [u8], &'a [u8])>);

impl<'a> Fields<'a> {
    fn parse(mut buf: &'a [u8]) -> Result<Self, ContainerError> {
        let mut out = Vec::new();
        while !buf.is_empty() {
            if buf.len() < 4 {
                return Err(ContainerError::malformed("bag header", "truncated field length"));
            }
            let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
            buf = &buf[4..];
            if len > buf.len() {
                return Err(ContainerError::malformed("bag header", "field overruns header"));
            }
            let (field, rest) = buf.split_at(len);
            let eq = field
                .iter()
                .position(|&b| b == b'=')
                .ok_or_else(|| ContainerError::malformed("bag header", "field without '='"))?;
            out.push((&field[..eq], &field[eq + 1..]));
            buf = rest;
        }
        Ok(Fields(out))
    }

    fn get(&self, name: &str) -> Option<&'a [u8]> {
        self.0.iter().find(|(n, _)| *n == name.as_bytes()).map(|(_, v)| *v)
    }

    fn require(&self, name: &'static str) -> Result<&'a [u8], ContainerError> {
        self.get(name)
            .ok_or_else(|| ContainerError::malformed("bag header", format!("missing {name} field")))
    }

    fn op(&self) -> Result<u8, ContainerError> {
        match self.require("op")? {
            [op] => Ok(*op),
            _ => Err(ContainerError::malformed("bag header", "op is not one byte")),
        }
    }

    fn u32(&self, name: &'static str) -> Result<u32, ContainerError> {
        let v: [u8; 4] = self
            .require(name)?
            .try_into()
            .map_err(|_| ContainerError::malformed("bag header", format!("{name} is not 4 bytes")))?;
        Ok(u32::from_le_bytes(v))
    }

    /// ROS time stored as `[sec:u32][nsec:u32]`.
    fn time_ns(&self) -> Result<u64, ContainerError> {
        match self.require("time")? {
            [s0, s1, s2, s3, n0, n1, n2, n3] => {
                let sec = u32::from_le_bytes([*s0, *s1, *s2, *s3]) as u64;
                let nsec = u32::from_le_bytes([*n0, *n1, *n2, *n3]) as u64;
                Ok(sec * 1_000_000_000 + nsec)
            }
            _ => Err(ContainerError::malformed("bag header", "time is not 8 bytes")),
        }
    }
}

fn take_block<'a>(buf: &'a [u8], pos: &mut usize, what: &'static str) -> Result<&'a [u8], ContainerError> {
    let rest = &buf[*pos..];
    if rest.len() < 4 {
        return Err(ContainerError::malformed("bag chunk", format!("truncated {what} length")));
    }
    let len = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
    if len > rest.len() - 4 {
        return Err(ContainerError::malformed("bag chunk", format!("{what} overruns chunk")));
    }
    *pos += 4 + len;
    Ok(&rest[4..4 + len])
}

/// Split one `[header][data]` record off the front of an in-memory chunk.
fn split_record<'a>(buf: &'a [u8], pos: &mut usize) -> Result<(&'a [u8], &'a [u8]), ContainerError> {
    let header = take_block(buf, pos, "header")?;
    let data = take_block(buf, pos, "data")?;
    Ok((header, data))
}

/// Read a little-endian length, or `None` on a clean end of file.
fn read_len<R: Read>(r: &mut R, what: &'static str) -> Result<Option<usize>, ContainerError> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(ContainerError::malformed("bag record", format!("truncated {what} length"))),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    let len = u32::from_le_bytes(buf) as usize;
    if len > MAX_BLOCK_LEN {
        return Err(ContainerError::malformed("bag record", format!("{what} length {len} too large")));
    }
    Ok(Some(len))
}

fn read_block<R: Read>(r: &mut R, len: usize, what: &'static str) -> Result<Vec<u8>, ContainerError> {
    let mut block = vec![0u8; len];
    r.read_exact(&mut block).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => ContainerError::malformed("bag record", format!("truncated {what}")),
        _ => ContainerError::Io(e),
    })?;
    Ok(block)
}

/// Topic and declared type of one bag connection.
#[derive(Debug, Clone)]
struct Connection {
    topic: String,
    msg_type: String,
}

/// Turn a connection or message record into state or a [`Record`].
fn on_record(
    connections: &mut HashMap<u32, Connection>,
    fields: &Fields<'_>,
    data: &[u8],
) -> Result<Option<Record>, ContainerError> {
    match fields.op()? {
        OP_CONNECTION => {
            let conn = fields.u32("conn")?;
            let topic = String::from_utf8_lossy(fields.require("topic")?).into_owned();
            // The data block is the publisher's connection header.
            let msg_type = String::from_utf8_lossy(Fields::parse(data)?.require("type")?).into_owned();
            connections.insert(conn, Connection { topic, msg_type });
            Ok(None)
        }
        OP_MSG_DATA => {
            let conn = fields.u32("conn")?;
            let connection = connections
                .get(&conn)
                .ok_or_else(|| ContainerError::malformed("bag message", format!("unknown connection {conn}")))?;
            Ok(Some(Record {
                channel: connection.topic.clone(),
                time_ns: fields.time_ns()?,
                msg_type: Some(connection.msg_type.clone()),
                payload: data.to_vec(),
            }))
        }
        OP_BAG_HEADER | OP_INDEX_DATA | OP_CHUNK_INFO => Ok(None),
        op => {
            tracing::debug!(op, "skipping unknown bag record");
            Ok(None)
        }
    }
}

/// Record iterator over one open bag file.
struct BagRecords {
    reader: BufReader<File>,
    connections: HashMap<u32, Connection>,
    chunk: Vec<u8>,
    chunk_pos: usize,
    done: bool,
}

impl BagRecords {
    fn advance(&mut self) -> Result<Option<Record>, ContainerError> {
        loop {
            if self.chunk_pos < self.chunk.len() {
                let (header, data) = split_record(&self.chunk, &mut self.chunk_pos)?;
                let fields = Fields::parse(header)?;
                if fields.op()? == OP_CHUNK {
                    return Err(ContainerError::malformed("bag chunk", "nested chunk"));
                }
                if let Some(record) = on_record(&mut self.connections, &fields, data)? {
                    return Ok(Some(record));
                }
                continue;
            }

            let Some(header_len) = read_len(&mut self.reader, "header")? else {
                return Ok(None);
            };
            let header = read_block(&mut self.reader, header_len, "header")?;
            let data_len = read_len(&mut self.reader, "data")?
                .ok_or_else(|| ContainerError::malformed("bag record", "missing data block"))?;
            let data = read_block(&mut self.reader, data_len, "data")?;

            let fields = Fields::parse(&header)?;
            if fields.op()? == OP_CHUNK {
                let codec = Compression::from_bag_field(fields.require("compression")?)?;
                let size = fields.u32("size")? as usize;
                self.chunk = codec.decompress(data, Some(size))?;
                self.chunk_pos = 0;
                continue;
            }
            if let Some(record) = on_record(&mut self.connections, &fields, &data)? {
                return Ok(Some(record));
            }
        }
    }
}

impl Iterator for BagRecords {
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

/// ROS bag whose target messages are `std_msgs/String`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BagFormat;

impl ContainerFormat for BagFormat {
    fn name(&self) -> &'static str {
        "rosbag"
    }

    fn open(&self, path: &Path) -> Result<RecordIter, ContainerError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut magic = [0u8; BAG_MAGIC.len()];
        match reader.read_exact(&mut magic) {
            Ok(()) if magic == BAG_MAGIC => {}
            Ok(()) => return Err(ContainerError::BadMagic("rosbag")),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(ContainerError::BadMagic("rosbag")),
            Err(e) => return Err(e.into()),
        }
        Ok(Box::new(BagRecords {
            reader,
            connections: HashMap::new(),
            chunk: Vec::new(),
            chunk_pos: 0,
            done: false,
        }))
    }

    /// `std_msgs/String` is `[len:u32][bytes]`.
    fn unwrap_payload(&self, record: Record) -> Result<Vec<u8>, ContainerError> {
        if let Some(msg_type) = record.msg_type.as_deref().filter(|t| *t != STRING_MSG_TYPE) {
            return Err(ContainerError::malformed(
                "std_msgs/String",
                format!("connection on {} carries {msg_type}", record.channel),
            ));
        }
        let payload = record.payload;
        if payload.len() < 4 {
            return Err(ContainerError::malformed("std_msgs/String", "shorter than length prefix"));
        }
        let len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
        if len != payload.len() - 4 {
            return Err(ContainerError::malformed(
                "std_msgs/String",
                format!("length prefix {len} but {} bytes follow", payload.len() - 4),
            ));
        }
        Ok(payload[4..].to_vec())
    }
}
