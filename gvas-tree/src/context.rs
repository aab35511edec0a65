use std::{
    collections::HashMap,
    io::{Cursor, Read, Seek, Write},
    rc::Rc,
};

use tracing::debug;

use crate::{
    header::{Header, VersionInfo},
    structs::StructType,
    Result,
};

/// Hints the decoder cannot recover from the file itself.
///
/// Legacy property tags do not record the struct type of set elements or map
/// keys and values, so those are looked up by property path (for example
/// `Inventory.Key` or `Stats.Value`). Classes registered with
/// [`Types::add_record_class`] mark byte arrays that hold an embedded object
/// record.
#[derive(Debug, Default, Clone)]
pub struct Types {
    types: HashMap<String, StructType>,
    records: HashMap<String, usize>,
}
impl Types {
    /// No hints and no record classes
    pub fn new() -> Self {
        Self::default()
    }
    /// Struct type to assume for the set element, map key or map value at `path`
    pub fn add(&mut self, path: impl Into<String>, t: StructType) {
        // TODO: names containing '.' cannot be addressed until paths are stored as components
        self.types.insert(path.into(), t);
    }
    /// Treat a `Data` byte array next to a `Class` object reference naming `class` as an
    /// embedded record ending in `trailer_len` bytes that are carried verbatim.
    pub fn add_record_class(&mut self, class: impl Into<String>, trailer_len: usize) {
        self.records.insert(class.into(), trailer_len);
    }
    pub(crate) fn has(&self, path: &str) -> bool {
        self.types.contains_key(path)
    }
    pub(crate) fn record_trailer(&self, class: &str) -> Option<usize> {
        self.records.get(class).copied()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    components: Vec<String>,
}
impl Scope {
    fn path(&self) -> String {
        self.components.join(".")
    }
    fn push(&mut self, name: &str) {
        self.components.push(name.to_string());
    }
    fn pop(&mut self) {
        self.components.pop();
    }
}

/// Version used before the header has been decoded.
struct Unversioned;
impl VersionInfo for Unversioned {
    fn engine(&self) -> (u16, u16) {
        (0, 0)
    }
    fn package_ue5(&self) -> u32 {
        0
    }
}

#[derive(Debug)]
pub(crate) struct Context<S> {
    pub(crate) stream: S,
    version: Option<Header>,
    types: Rc<Types>,
    scope: Scope,
}
impl<R: Read> Read for Context<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}
impl<S: Seek> Seek for Context<S> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.stream.seek(pos)
    }
}
impl<W: Write> Write for Context<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl<S> Context<S> {
    pub(crate) fn new(stream: S, version: Option<Header>, types: Rc<Types>) -> Self {
        Self {
            stream,
            version,
            types,
            scope: Scope::default(),
        }
    }
    pub(crate) fn set_version(&mut self, version: Header) {
        self.version = Some(version);
    }
    pub(crate) fn version(&self) -> &dyn VersionInfo {
        match &self.version {
            Some(header) => header,
            None => &Unversioned,
        }
    }
    pub(crate) fn types(&self) -> &Types {
        &self.types
    }
    pub(crate) fn with_scope<F, T>(&mut self, name: &str, f: F) -> T
    where
        F: FnOnce(&mut Context<S>) -> T,
    {
        self.scope.push(name);
        let result = f(self);
        self.scope.pop();
        result
    }
    /// Context over another buffer sharing this one's version and hints.
    pub(crate) fn fork<T>(&self, stream: T) -> Context<T> {
        Context::new(stream, self.version.clone(), self.types.clone())
    }
    pub(crate) fn path(&self) -> String {
        self.scope.path()
    }
}
impl<R: Read + Seek> Context<R> {
    pub(crate) fn get_type_or(&mut self, t: &StructType) -> Result<StructType> {
        let path = self.path();
        match self.types.types.get(&path) {
            Some(t) => Ok(t.clone()),
            None => {
                let offset = self.stream.stream_position()?;
                debug!(offset, path = %path, "struct type unspecified, assuming {t:?}");
                Ok(t.clone())
            }
        }
    }
}
impl Context<Cursor<Vec<u8>>> {
    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.stream.into_inner()
    }
}
