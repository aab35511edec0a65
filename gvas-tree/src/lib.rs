/*!
A library for editing Unreal Engine save files (commonly referred to as GVAS)
without disturbing anything that was not edited.

A save decodes into a tree of typed properties. Edits are expressed as
[`MutationOp`]s addressed by [`PropertyPath`], checked against the declared
type of their target and applied atomically. Encoding recomputes every size
and count from the live tree, while everything untouched (including types the
decoder does not understand, which are kept as opaque bytes) is written back
byte for byte.

# Example

```no_run
use gvas_tree::{Document, MutationOp, PropertyValue};

let mut doc = Document::load("SaveSlot.sav")?;
let path = "HinakoRecord.Health".parse()?;
doc.apply(MutationOp::Replace {
    path,
    value: PropertyValue::Float(50f32.into()),
})?;
doc.save("SaveSlot.sav")?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

mod archive;
mod context;
mod error;
mod fstring;
mod header;
mod mutate;
mod save;
mod structs;
mod tag;
mod text;
mod tree;
mod value;

#[cfg(test)]
mod tests;

pub use context::Types;
pub use error::{Error, ParseError};
pub use fstring::FString;
pub use header::{
    CustomVersion, CustomVersions, EngineVersion, Header, PackageVersion, VersionInfo,
};
pub use mutate::MutationOp;
pub use save::{SaveFile, SaveObject, SaveReader};
pub use structs::*;
pub use tag::{PropertyTag, PropertyType, TagData, TypeNode};
pub use text::{Text, TextHistory};
pub use tree::{PathStep, PropertyPath, PropertyView};
pub use value::{
    ArrayValue, Byte, MapEntry, MapValue, ObjectRecord, Properties, Property, PropertyValue,
    SetValue, ValueVec,
};

use std::{io::Write, path::Path};

use tracing::instrument;

type Result<T, E = Error> = std::result::Result<T, E>;

/// An open save file and the edits applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    file: SaveFile,
    modified: bool,
}
impl Document {
    /// Reads and decodes the save at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        Self::load_with_types(path, Types::new())
    }
    /// Reads and decodes the save at `path` using the provided [`Types`]
    pub fn load_with_types(path: impl AsRef<Path>, types: Types) -> Result<Self, ParseError> {
        let data = std::fs::read(path).map_err(|e| ParseError {
            offset: 0,
            error: e.into(),
        })?;
        Self::read_with_types(&data, types)
    }
    pub fn read(data: &[u8]) -> Result<Self, ParseError> {
        Self::read_with_types(data, Types::new())
    }
    pub fn read_with_types(data: &[u8], types: Types) -> Result<Self, ParseError> {
        Ok(SaveReader::new().types(types).read_slice(data)?.into())
    }

    pub fn header(&self) -> &Header {
        &self.file.header
    }
    pub fn root_objects(&self) -> &[SaveObject] {
        &self.file.objects
    }
    pub fn save_file(&self) -> &SaveFile {
        &self.file
    }
    pub fn into_save_file(self) -> SaveFile {
        self.file
    }
    /// Whether any edit has been applied since loading
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn property_at(&self, path: &PropertyPath) -> Result<PropertyView<'_>> {
        tree::view(&self.file.objects, path)
    }
    /// Applies one edit. On error the document is left unchanged.
    pub fn apply(&mut self, op: MutationOp) -> Result<()> {
        mutate::apply(&mut self.file.objects, &self.file.header, &op)?;
        self.modified = true;
        Ok(())
    }
    /// Index of the root object an object reference names, matching either the full path
    /// or the object name after the last `.`
    pub fn resolve_reference(&self, reference: &str) -> Option<usize> {
        let objects = &self.file.objects;
        objects
            .iter()
            .position(|o| o.name == reference)
            .or_else(|| {
                let short = object_name(reference);
                objects.iter().position(|o| object_name(o.name.as_str()) == short)
            })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.file.to_bytes()
    }
    /// Encodes the document and replaces the file at `path`. The new contents are written to
    /// a temporary file in the same directory which is then renamed over `path`, so on any
    /// failure the existing file is left as it was.
    #[instrument(skip_all)]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(path)?;
        Ok(())
    }
}
impl From<SaveFile> for Document {
    fn from(file: SaveFile) -> Self {
        Self {
            file,
            modified: false,
        }
    }
}

fn object_name(path: &str) -> &str {
    path.rsplit(['.', ':']).next().unwrap_or(path)
}
