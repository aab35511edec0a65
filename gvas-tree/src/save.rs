use std::{
    io::{Cursor, Read, Write},
    rc::Rc,
};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::{
    archive::{ArchiveReader, ArchiveWriter},
    context::{Context, Types},
    error::{Error, ParseError},
    fstring::FString,
    header::Header,
    value::{read_properties_until_none, write_properties_none_terminated, Properties},
    Result,
};

/// Root level object: a class name and its property list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveObject {
    pub name: FString,
    /// Flag byte following the name in saves with complete type names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u8>,
    pub properties: Properties,
}
impl SaveObject {
    #[instrument(name = "SaveObject_read", skip_all)]
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let name = ar.read_fstring()?;
        let flags = if ar.version().property_tag() {
            Some(ar.read_u8()?)
        } else {
            None
        };
        let properties = read_properties_until_none(ar)?;
        Ok(Self {
            name,
            flags,
            properties,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_fstring(&self.name)?;
        if ar.version().property_tag() {
            ar.write_u8(self.flags.unwrap_or(0))?;
        }
        write_properties_none_terminated(ar, &self.properties)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
    pub header: Header,
    pub objects: Vec<SaveObject>,
    /// Whether the object list was closed by an empty name
    pub end_marker: bool,
    /// Bytes following the objects, carried verbatim
    pub footer: Vec<u8>,
}
impl SaveFile {
    /// Reads save from the given reader
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ParseError> {
        SaveReader::new().read(reader)
    }
    /// Reads save from the given reader using the provided [`Types`]
    pub fn read_with_types<R: Read>(reader: &mut R, types: Types) -> Result<Self, ParseError> {
        SaveReader::new().types(types).read(reader)
    }
    /// Encodes the whole save in memory and only then writes it out.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }
    #[instrument(name = "SaveFile_write", skip_all)]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Context::new(
            Cursor::new(vec![]),
            Some(self.header.clone()),
            Rc::new(Types::new()),
        );
        self.header.write(&mut writer)?;
        for object in &self.objects {
            object.write(&mut writer)?;
        }
        if self.end_marker {
            writer.write_u32::<LE>(0)?;
        }
        writer.write_all(&self.footer)?;
        Ok(writer.into_inner())
    }
}

pub struct SaveReader {
    types: Option<Rc<Types>>,
}
impl Default for SaveReader {
    fn default() -> Self {
        Self::new()
    }
}
impl SaveReader {
    pub fn new() -> Self {
        Self { types: None }
    }
    pub fn types(mut self, types: Types) -> Self {
        self.types = Some(Rc::new(types));
        self
    }
    /// Buffers the whole stream, then decodes it.
    pub fn read<S: Read>(self, mut stream: S) -> Result<SaveFile, ParseError> {
        let mut data = vec![];
        stream
            .read_to_end(&mut data)
            .map_err(|e| ParseError {
                offset: 0,
                error: e.into(),
            })?;
        self.read_slice(&data)
    }
    #[instrument(name = "SaveReader_read", skip_all)]
    pub fn read_slice(self, data: &[u8]) -> Result<SaveFile, ParseError> {
        let types = self.types.unwrap_or_else(|| Rc::new(Types::new()));
        let mut reader = Context::new(Cursor::new(data), None, types);
        read_save(&mut reader).map_err(|error| ParseError {
            offset: reader.stream.position() as usize,
            error,
        })
    }
}

fn read_save(reader: &mut Context<Cursor<&[u8]>>) -> Result<SaveFile> {
    let header = Header::read(reader)?;
    reader.set_version(header.clone());

    let len = reader.stream.get_ref().len() as u64;
    let mut objects = vec![];
    let mut end_marker = false;
    loop {
        let start = reader.stream.position();
        if len - start < 4 {
            break;
        }
        let name_len = reader.read_i32::<LE>()?;
        if name_len == 0 {
            end_marker = true;
            break;
        }
        reader.stream.set_position(start);
        if !objects.is_empty() && !name_fits(name_len, len - start - 4) {
            break;
        }
        objects.push(SaveObject::read(reader)?);
    }
    if objects.is_empty() {
        return Err(Error::InvalidData("save contains no objects".into()));
    }

    let mut footer = vec![];
    reader.read_to_end(&mut footer)?;
    if !footer.is_empty() {
        warn!(
            "{} bytes after the last object, save may not have been parsed completely",
            footer.len()
        );
    }
    Ok(SaveFile {
        header,
        objects,
        end_marker,
        footer,
    })
}

/// Whether an object name with this length prefix fits in the remaining input. Trailing data
/// whose first word does not is footer rather than another object.
fn name_fits(prefix: i32, remaining: u64) -> bool {
    let units = u64::from(prefix.unsigned_abs());
    let bytes = if prefix < 0 { units * 2 } else { units };
    bytes <= remaining
}
