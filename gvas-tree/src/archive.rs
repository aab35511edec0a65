use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{WriteBytesExt, LE};

use crate::{
    context::{Context, Types},
    fstring::FString,
    header::VersionInfo,
    structs::StructType,
    Result,
};

pub(crate) trait ArchiveReader: Read + Seek + Sized {
    fn version(&self) -> &dyn VersionInfo;
    fn types(&self) -> &Types;
    fn path(&self) -> String;
    fn with_scope<F, T>(&mut self, name: &str, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T;
    fn get_type_or(&mut self, t: &StructType) -> Result<StructType>;
    /// Reader over a nested buffer with the same version and hints.
    fn fork<'d>(&self, data: &'d [u8]) -> Context<Cursor<&'d [u8]>>;
    /// Writer with the same version, used to check that nested data re-encodes.
    fn fork_writer(&self) -> Context<Cursor<Vec<u8>>>;

    fn read_fstring(&mut self) -> Result<FString> {
        FString::read(self)
    }
}
pub(crate) trait ArchiveWriter: Write + Seek + Sized {
    fn version(&self) -> &dyn VersionInfo;

    fn write_fstring(&mut self, s: &FString) -> Result<()> {
        s.write(self)
    }
    /// Engine-defined names such as type names and the `None` terminator.
    fn write_string(&mut self, s: &str) -> Result<()> {
        FString::new(s).write(self)
    }
}

impl<R> ArchiveReader for Context<R>
where
    R: Read + Seek,
{
    fn version(&self) -> &dyn VersionInfo {
        Context::version(self)
    }
    fn types(&self) -> &Types {
        Context::types(self)
    }
    fn path(&self) -> String {
        Context::path(self)
    }
    fn with_scope<F, T>(&mut self, name: &str, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        Context::with_scope(self, name, f)
    }
    fn get_type_or(&mut self, t: &StructType) -> Result<StructType> {
        Context::get_type_or(self, t)
    }
    fn fork<'d>(&self, data: &'d [u8]) -> Context<Cursor<&'d [u8]>> {
        Context::fork(self, Cursor::new(data))
    }
    fn fork_writer(&self) -> Context<Cursor<Vec<u8>>> {
        Context::fork(self, Cursor::new(vec![]))
    }
}
impl<W> ArchiveWriter for Context<W>
where
    W: Write + Seek,
{
    fn version(&self) -> &dyn VersionInfo {
        Context::version(self)
    }
}

pub(crate) fn read_array<T, F, A: ArchiveReader>(length: u32, ar: &mut A, f: F) -> Result<Vec<T>>
where
    F: Fn(&mut A) -> Result<T>,
{
    (0..length).map(|_| f(ar)).collect()
}

/// Element or byte count as written in front of a container.
pub(crate) fn write_len<A: ArchiveWriter>(ar: &mut A, len: usize) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| crate::Error::InvalidData(format!("container of {len} elements")))?;
    ar.write_u32::<LE>(len)?;
    Ok(())
}

/// Patch the u32 at `size_offset` with the number of bytes written since `start`.
pub(crate) fn patch_size<A: ArchiveWriter>(ar: &mut A, size_offset: u64, start: u64) -> Result<()> {
    let end = ar.stream_position()?;
    let size = u32::try_from(end - start)
        .map_err(|_| crate::Error::InvalidData(format!("payload of {} bytes", end - start)))?;
    ar.seek(SeekFrom::Start(size_offset))?;
    ar.write_u32::<LE>(size)?;
    ar.seek(SeekFrom::Start(end))?;
    Ok(())
}
