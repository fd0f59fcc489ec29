//! The seam between the replay core and a GNSS data parser.
//!
//! The core only ever initializes a parser, appends raw bytes to it in source
//! order, and releases it. [`ParserHandle`] owns that lifecycle so release
//! happens exactly once on every exit path.
use crate::config::GnssConfig;
use crc32fast::Hasher as Crc32;

/// A stateful decoder fed with raw receiver bytes.
pub trait DataParser {
    /// Called once before any bytes are appended.
    fn init(&mut self, config: &GnssConfig);

    /// Append raw bytes. Parser-internal failures are not reported back.
    fn parse_raw_data(&mut self, data: &[u8]);

    /// Called once after the source is exhausted or the replay failed.
    fn release(&mut self) {}
}

impl<P: DataParser + ?Sized> DataParser for &mut P {
    fn init(&mut self, config: &GnssConfig) {
        (**self).init(config)
    }

    fn parse_raw_data(&mut self, data: &[u8]) {
        (**self).parse_raw_data(data)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

impl<P: DataParser + ?Sized> DataParser for Box<P> {
    fn init(&mut self, config: &GnssConfig) {
        (**self).init(config)
    }

    fn parse_raw_data(&mut self, data: &[u8]) {
        (**self).parse_raw_data(data)
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// An absent parser accepts and discards everything.
impl<P: DataParser> DataParser for Option<P> {
    fn init(&mut self, config: &GnssConfig) {
        if let Some(p) = self {
            p.init(config)
        }
    }

    fn parse_raw_data(&mut self, data: &[u8]) {
        if let Some(p) = self {
            p.parse_raw_data(data)
        }
    }

    fn release(&mut self) {
        if let Some(p) = self {
            p.release()
        }
    }
}

/// Scoped ownership of an initialized parser; releases it on drop.
pub struct ParserHandle<P: DataParser> {
    parser: P,
}

impl<P: DataParser> ParserHandle<P> {
    pub fn new(mut parser: P, config: &GnssConfig) -> Self {
        parser.init(config);
        Self { parser }
    }

    pub fn append(&mut self, data: &[u8]) {
        self.parser.parse_raw_data(data);
    }
}

impl<P: DataParser> Drop for ParserHandle<P> {
    fn drop(&mut self) {
        self.parser.release();
    }
}

/// Counts what reaches the parser and keeps a CRC-32 over the byte stream.
///
/// Two replays of the same file must end with equal [`StatsParser::digest`].
#[derive(Debug, Default, Clone)]
pub struct StatsParser {
    payloads: u64,
    bytes: u64,
    hasher: Crc32,
}

impl StatsParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> u64 {
        self.payloads
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn digest(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl DataParser for StatsParser {
    fn init(&mut self, config: &GnssConfig) {
        tracing::debug!(format = ?config.data.format, "stats parser ready");
    }

    fn parse_raw_data(&mut self, data: &[u8]) {
        self.payloads += 1;
        self.bytes += data.len() as u64;
        self.hasher.update(data);
    }

    fn release(&mut self) {
        tracing::info!(
            payloads = self.payloads,
            bytes = self.bytes,
            crc32 = %format!("{:#010x}", self.digest()),
            "parser released"
        );
    }
}

/// Feeds every call to two parsers, first `A` then `B`.
#[derive(Debug, Default)]
pub struct Tee<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: DataParser, B: DataParser> DataParser for Tee<A, B> {
    fn init(&mut self, config: &GnssConfig) {
        self.first.init(config);
        self.second.init(config);
    }

    fn parse_raw_data(&mut self, data: &[u8]) {
        self.first.parse_raw_data(data);
        self.second.parse_raw_data(data);
    }

    fn release(&mut self) {
        self.first.release();
        self.second.release();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every call it receives.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingParser {
        pub inits: usize,
        pub releases: usize,
        pub payloads: Vec<Vec<u8>>,
    }

    impl DataParser for RecordingParser {
        fn init(&mut self, _config: &GnssConfig) {
            assert!(self.payloads.is_empty(), "init after data");
            self.inits += 1;
        }

        fn parse_raw_data(&mut self, data: &[u8]) {
            assert_eq!(self.inits, 1, "data before init");
            assert_eq!(self.releases, 0, "data after release");
            self.payloads.push(data.to_vec());
        }

        fn release(&mut self) {
            self.releases += 1;
        }
    }

    #[test]
    fn handle_inits_once_and_releases_on_drop() {
        let mut p = RecordingParser::default();
        {
            let mut h = ParserHandle::new(&mut p, &GnssConfig::default());
            h.append(b"abc");
            h.append(b"");
        }
        assert_eq!(p.inits, 1);
        assert_eq!(p.releases, 1);
        assert_eq!(p.payloads, vec![b"abc".to_vec(), Vec::new()]);
    }

    #[test]
    fn handle_releases_on_early_return() {
        fn fails(p: &mut RecordingParser, stop: bool) -> Result<(), &'static str> {
            let mut h = ParserHandle::new(p, &GnssConfig::default());
            h.append(b"x");
            if stop {
                return Err("stop");
            }
            h.append(b"never");
            Ok(())
        }
        let mut p = RecordingParser::default();
        assert!(fails(&mut p, true).is_err());
        assert_eq!((p.inits, p.releases), (1, 1));
        assert_eq!(p.payloads.len(), 1);
    }

    #[test]
    fn stats_digest_matches_concatenation() {
        let mut s = StatsParser::new();
        s.parse_raw_data(b"hello ");
        s.parse_raw_data(b"world");
        assert_eq!(s.payloads(), 2);
        assert_eq!(s.bytes(), 11);
        assert_eq!(s.digest(), crc32fast::hash(b"hello world"));
    }

    #[test]
    fn tee_forwards_to_both_in_order() {
        let mut tee = Tee::new(RecordingParser::default(), StatsParser::new());
        {
            let mut h = ParserHandle::new(&mut tee, &GnssConfig::default());
            h.append(b"ab");
            h.append(b"c");
        }
        assert_eq!(tee.first.payloads, vec![b"ab".to_vec(), b"c".to_vec()]);
        assert_eq!((tee.first.inits, tee.first.releases), (1, 1));
        assert_eq!(tee.second.digest(), crc32fast::hash(b"abc"));
    }

    #[test]
    fn optional_parser_is_transparent() {
        let mut none: Option<RecordingParser> = None;
        let mut some = Some(RecordingParser::default());
        {
            let mut h = ParserHandle::new(Tee::new(&mut none, &mut some), &GnssConfig::default());
            h.append(b"q");
        }
        let p = some.unwrap();
        assert_eq!((p.inits, p.releases), (1, 1));
        assert_eq!(p.payloads, vec![b"q".to_vec()]);
    }
}
