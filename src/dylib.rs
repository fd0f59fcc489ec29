//! Parser implementation loaded from a shared library at runtime.
//!
//! The library must export a small C ABI:
//!
//! ```c
//! void* gnss_parser_create(const char* config_yaml);
//! void  gnss_parser_parse(void* parser, const uint8_t* data, size_t len);
//! void  gnss_parser_destroy(void* parser);
//! ```
//!
//! `create` receives the YAML-serialized [`GnssConfig`] and may return null on
//! failure, in which case appended bytes are dropped with a warning.
use crate::config::GnssConfig;
use crate::parser::DataParser;
use anyhow::{Context, Result};
use libloading::{Library, Symbol};
use std::ffi::{CString, c_char, c_void};
use std::path::Path;

type CreateFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
type ParseFn = unsafe extern "C" fn(*mut c_void, *const u8, usize);
type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Function pointers resolved from the parser library.
///
/// The `_lib` field keeps the library mapped so the pointers stay valid.
pub struct DylibParser {
    _lib: Library,
    create: CreateFn,
    parse: ParseFn,
    destroy: DestroyFn,
    instance: *mut c_void,
    dropped: u64,
}

impl DylibParser {
    /// Load the library at `path` and resolve the parser symbols.
    pub fn load(path: &Path) -> Result<Self> {
        unsafe {
            let lib = Library::new(path).with_context(|| format!("loading {}", path.display()))?;
            let create: Symbol<CreateFn> = lib.get(b"gnss_parser_create").context("missing symbol gnss_parser_create")?;
            let parse: Symbol<ParseFn> = lib.get(b"gnss_parser_parse").context("missing symbol gnss_parser_parse")?;
            let destroy: Symbol<DestroyFn> = lib.get(b"gnss_parser_destroy").context("missing symbol gnss_parser_destroy")?;
            let this = Self {
                create: *create,
                parse: *parse,
                destroy: *destroy,
                instance: std::ptr::null_mut(),
                dropped: 0,
                _lib: lib,
            };
            Ok(this)
        }
    }

    fn create_instance(&self, config: &GnssConfig) -> Result<*mut c_void> {
        let yaml = CString::new(config.to_yaml()?).context("config contains a NUL byte")?;
        let instance = unsafe { (self.create)(yaml.as_ptr()) };
        anyhow::ensure!(!instance.is_null(), "gnss_parser_create returned null");
        Ok(instance)
    }
}

impl DataParser for DylibParser {
    fn init(&mut self, config: &GnssConfig) {
        match self.create_instance(config) {
            Ok(instance) => self.instance = instance,
            Err(e) => tracing::error!(error = %format!("{e:#}"), "parser library init failed"),
        }
    }

    fn parse_raw_data(&mut self, data: &[u8]) {
        if self.instance.is_null() {
            self.dropped += 1;
            return;
        }
        unsafe { (self.parse)(self.instance, data.as_ptr(), data.len()) }
    }

    fn release(&mut self) {
        if !self.instance.is_null() {
            unsafe { (self.destroy)(self.instance) };
            self.instance = std::ptr::null_mut();
        }
        if self.dropped > 0 {
            tracing::warn!(dropped = self.dropped, "payloads dropped, parser library never initialized");
        }
    }
}
