use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    archive::{ArchiveReader, ArchiveWriter},
    error::Error,
    fstring::FString,
    structs::{FGuid, StructType},
    Result,
};

/// Property types with a decoded value representation. Any other type name is kept in
/// [`TagData::Unknown`] and its payload carried as opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Int8Property,
    Int16Property,
    IntProperty,
    Int64Property,
    UInt8Property,
    UInt16Property,
    UInt32Property,
    UInt64Property,
    FloatProperty,
    DoubleProperty,
    BoolProperty,
    ByteProperty,
    EnumProperty,
    StrProperty,
    NameProperty,
    ObjectProperty,
    SoftObjectProperty,
    TextProperty,
    ArrayProperty,
    SetProperty,
    MapProperty,
    StructProperty,
}
const TYPE_NAMES: &[(PropertyType, &str)] = &[
    (PropertyType::Int8Property, "Int8Property"),
    (PropertyType::Int16Property, "Int16Property"),
    (PropertyType::IntProperty, "IntProperty"),
    (PropertyType::Int64Property, "Int64Property"),
    (PropertyType::UInt8Property, "UInt8Property"),
    (PropertyType::UInt16Property, "UInt16Property"),
    (PropertyType::UInt32Property, "UInt32Property"),
    (PropertyType::UInt64Property, "UInt64Property"),
    (PropertyType::FloatProperty, "FloatProperty"),
    (PropertyType::DoubleProperty, "DoubleProperty"),
    (PropertyType::BoolProperty, "BoolProperty"),
    (PropertyType::ByteProperty, "ByteProperty"),
    (PropertyType::EnumProperty, "EnumProperty"),
    (PropertyType::StrProperty, "StrProperty"),
    (PropertyType::NameProperty, "NameProperty"),
    (PropertyType::ObjectProperty, "ObjectProperty"),
    (PropertyType::SoftObjectProperty, "SoftObjectProperty"),
    (PropertyType::TextProperty, "TextProperty"),
    (PropertyType::ArrayProperty, "ArrayProperty"),
    (PropertyType::SetProperty, "SetProperty"),
    (PropertyType::MapProperty, "MapProperty"),
    (PropertyType::StructProperty, "StructProperty"),
];
impl PropertyType {
    pub fn name(&self) -> &'static str {
        TYPE_NAMES
            .iter()
            .find(|(t, _)| t == self)
            .map_or("None", |(_, name)| name)
    }
    pub fn from_name(name: &str) -> Option<Self> {
        TYPE_NAMES.iter().find(|(_, n)| *n == name).map(|(t, _)| *t)
    }
    /// Single-value types that can be created from scratch as properties or elements.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            PropertyType::ArrayProperty
                | PropertyType::SetProperty
                | PropertyType::MapProperty
                | PropertyType::StructProperty
                | PropertyType::TextProperty
                | PropertyType::SoftObjectProperty
        )
    }
}
impl std::fmt::Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One node of a complete type name: a name and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeNode {
    pub name: FString,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner: Vec<TypeNode>,
}
impl TypeNode {
    fn leaf(name: impl Into<FString>) -> Self {
        Self {
            name: name.into(),
            inner: vec![],
        }
    }
    fn with(name: impl Into<FString>, inner: Vec<TypeNode>) -> Self {
        Self {
            name: name.into(),
            inner,
        }
    }
    /// `Package.Name` paths are stored as `Name(Package)`.
    fn path(path: &str) -> Self {
        match path.split_once('.') {
            Some((package, name)) => Self::with(name, vec![Self::leaf(package)]),
            None => Self::leaf(path),
        }
    }
    fn as_path(&self) -> Option<String> {
        match self.inner.as_slice() {
            [] => Some(self.name.to_string()),
            [package] if package.inner.is_empty() => {
                Some(format!("{}.{}", package.name, self.name))
            }
            _ => None,
        }
    }

    const MAX_DEPTH: usize = 16;

    fn read<A: ArchiveReader>(ar: &mut A, depth: usize) -> Result<Self> {
        if depth > Self::MAX_DEPTH {
            return Err(Error::InvalidData("type name nested too deeply".into()));
        }
        let name = ar.read_fstring()?;
        let count = ar.read_u32::<LE>()?;
        let mut inner = vec![];
        for _ in 0..count {
            inner.push(Self::read(ar, depth + 1)?);
        }
        Ok(Self { name, inner })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_fstring(&self.name)?;
        ar.write_u32::<LE>(self.inner.len() as u32)?;
        for node in &self.inner {
            node.write(ar)?;
        }
        Ok(())
    }
}

/// Type information of a tag, recursive for containers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagData {
    Array(Box<TagData>),
    Struct {
        struct_type: StructType,
        id: FGuid,
    },
    Set {
        key_type: Box<TagData>,
    },
    Map {
        key_type: Box<TagData>,
        value_type: Box<TagData>,
    },
    /// Byte with an optional enum type
    Byte(Option<FString>),
    /// Enum type and, in complete type names, its underlying container type
    Enum(FString, Option<FString>),
    /// Inline value of a boolean property
    Bool(bool),
    Other(PropertyType),
    /// Type the decoder has no representation for
    Unknown(TypeNode),
}
impl TagData {
    pub fn basic_type(&self) -> Option<PropertyType> {
        Some(match self {
            Self::Array(_) => PropertyType::ArrayProperty,
            Self::Struct { .. } => PropertyType::StructProperty,
            Self::Set { .. } => PropertyType::SetProperty,
            Self::Map { .. } => PropertyType::MapProperty,
            Self::Byte(_) => PropertyType::ByteProperty,
            Self::Enum(_, _) => PropertyType::EnumProperty,
            Self::Bool(_) => PropertyType::BoolProperty,
            Self::Other(t) => *t,
            Self::Unknown(_) => return None,
        })
    }
    pub fn type_name(&self) -> &str {
        match self {
            Self::Unknown(node) => node.name.as_str(),
            known => known.basic_type().map_or("None", |t| t.name()),
        }
    }
    pub(crate) fn is_scalar(&self) -> bool {
        self.basic_type().is_some_and(|t| t.is_scalar())
    }
    /// Whether any part of the value must be carried as opaque bytes.
    pub(crate) fn has_opaque_part(&self) -> bool {
        match self {
            Self::Array(inner) => inner.has_opaque_part(),
            Self::Struct { struct_type, .. } => struct_type.raw(),
            Self::Set { key_type } => key_type.has_opaque_part(),
            Self::Map {
                key_type,
                value_type,
            } => key_type.has_opaque_part() || value_type.has_opaque_part(),
            Self::Unknown(_) => true,
            _ => false,
        }
    }
    fn has_native_struct(&self) -> bool {
        match self {
            Self::Array(inner) => inner.has_native_struct(),
            Self::Struct { struct_type, .. } => struct_type.native(),
            Self::Set { key_type } => key_type.has_native_struct(),
            Self::Map {
                key_type,
                value_type,
            } => key_type.has_native_struct() || value_type.has_native_struct(),
            _ => false,
        }
    }
    /// Element type named only by its property type, as in legacy container tags.
    fn from_type(name: FString, struct_type: Option<StructType>) -> Self {
        match PropertyType::from_name(name.as_str()) {
            Some(PropertyType::BoolProperty) => Self::Bool(false),
            Some(PropertyType::ByteProperty) => Self::Byte(None),
            Some(PropertyType::EnumProperty) => Self::Enum(FString::default(), None),
            Some(PropertyType::StructProperty) => Self::Struct {
                struct_type: struct_type.unwrap_or(StructType::Struct(None)),
                id: FGuid::nil(),
            },
            // nested containers cannot be described by a legacy tag
            Some(
                PropertyType::ArrayProperty | PropertyType::SetProperty | PropertyType::MapProperty,
            )
            | None => Self::Unknown(TypeNode::leaf(name)),
            Some(other) => Self::Other(other),
        }
    }

    fn from_node(node: &TypeNode, flags: EPropertyTagFlags) -> Self {
        let inner = node.inner.as_slice();
        let parsed = match (node.name.as_str(), inner) {
            ("ArrayProperty", [elem]) => Some(Self::Array(Self::from_node(elem, flags).into())),
            ("SetProperty", [key]) => Some(Self::Set {
                key_type: Self::from_node(key, flags).into(),
            }),
            ("MapProperty", [key, value]) => Some(Self::Map {
                key_type: Self::from_node(key, flags).into(),
                value_type: Self::from_node(value, flags).into(),
            }),
            ("StructProperty", [path, rest @ ..]) if rest.len() <= 1 => {
                let native = flags.contains(EPropertyTagFlags::HasBinaryOrNativeSerialize);
                let id = match rest {
                    [id] if id.inner.is_empty() => FGuid::parse_str(id.name.as_str()).ok(),
                    [] => Some(FGuid::nil()),
                    _ => None,
                };
                path.as_path()
                    .zip(id)
                    .map(|(path, id)| Self::Struct {
                        struct_type: StructType::from_full(&path, native),
                        id,
                    })
            }
            ("ByteProperty", []) => Some(Self::Byte(None)),
            ("ByteProperty", [path]) => path.as_path().map(|p| Self::Byte(Some(p.into()))),
            ("EnumProperty", [path]) => path.as_path().map(|p| Self::Enum(p.into(), None)),
            ("EnumProperty", [path, container]) if container.inner.is_empty() => path
                .as_path()
                .map(|p| Self::Enum(p.into(), Some(container.name.clone()))),
            ("BoolProperty", []) => Some(Self::Bool(flags.contains(EPropertyTagFlags::BoolTrue))),
            (name, []) => PropertyType::from_name(name)
                .filter(|t| {
                    !matches!(
                        t,
                        PropertyType::ArrayProperty
                            | PropertyType::SetProperty
                            | PropertyType::MapProperty
                            | PropertyType::StructProperty
                    )
                })
                .map(Self::Other),
            _ => None,
        };
        // anything that would not be written back the same way stays unknown
        match parsed {
            Some(data) if data.to_node() == *node => data,
            _ => Self::Unknown(node.clone()),
        }
    }
    fn to_node(&self) -> TypeNode {
        match self {
            Self::Array(inner) => TypeNode::with("ArrayProperty", vec![inner.to_node()]),
            Self::Struct { struct_type, id } => {
                let mut inner = vec![TypeNode::path(struct_type.full_str())];
                if !id.is_nil() {
                    inner.push(TypeNode::leaf(id.to_string()));
                }
                TypeNode::with("StructProperty", inner)
            }
            Self::Set { key_type } => TypeNode::with("SetProperty", vec![key_type.to_node()]),
            Self::Map {
                key_type,
                value_type,
            } => TypeNode::with("MapProperty", vec![key_type.to_node(), value_type.to_node()]),
            Self::Byte(None) => TypeNode::leaf("ByteProperty"),
            Self::Byte(Some(path)) => {
                TypeNode::with("ByteProperty", vec![TypeNode::path(path.as_str())])
            }
            Self::Enum(path, container) => {
                let mut inner = vec![TypeNode::path(path.as_str())];
                if let Some(container) = container {
                    inner.push(TypeNode::leaf(container.clone()));
                }
                TypeNode::with("EnumProperty", inner)
            }
            Self::Bool(_) => TypeNode::leaf("BoolProperty"),
            Self::Other(t) => TypeNode::leaf(t.name()),
            Self::Unknown(node) => node.clone(),
        }
    }

    fn write_basic_type<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        match self {
            Self::Unknown(node) => ar.write_fstring(&node.name),
            known => ar.write_string(known.type_name()),
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct EPropertyTagFlags : u8 {
        const HasArrayIndex = 0x01;
        const HasPropertyGuid = 0x02;
        const HasPropertyExtensions = 0x04;
        const HasBinaryOrNativeSerialize = 0x08;
        const BoolTrue = 0x10;
    }
}
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct EPropertyTagExtension : u8 {
        const ReserveForFutureUse = 0x01;
        const OverridableInformation = 0x02;
    }
}

/// Header of one property: name, type, declared payload size and array index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyTag {
    pub name: FString,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub index: u32,
    /// Payload size as declared in the file. Recomputed whenever the tag is written.
    #[serde(default)]
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FGuid>,
    /// Raw flag byte of a complete-type-name tag.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub flags: u8,
    /// Property extension bytes of a complete-type-name tag, kept as read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<u8>,
    /// Stored byte of a legacy boolean tag when it is neither 0 nor 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bool_byte: Option<u8>,
    pub data: TagData,
}
fn is_zero<T: Default + PartialEq>(v: &T) -> bool {
    *v == T::default()
}

impl PropertyTag {
    /// Tag for a property that does not exist in the file yet.
    pub fn new(name: impl Into<FString>, data: TagData) -> Self {
        let mut tag = Self {
            name: name.into(),
            index: 0,
            size: 0,
            id: None,
            flags: 0,
            extensions: vec![],
            bool_byte: None,
            data,
        };
        tag.reset_flags();
        tag
    }
    pub(crate) fn reset_flags(&mut self) {
        self.flags = if self.data.has_native_struct() {
            EPropertyTagFlags::HasBinaryOrNativeSerialize.bits()
        } else {
            0
        };
    }

    #[instrument(name = "PropertyTag_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Option<Self>> {
        let name = ar.read_fstring()?;
        if name == "None" {
            return Ok(None);
        }
        if ar.version().property_tag() {
            let node = TypeNode::read(ar, 0)?;
            let size = ar.read_u32::<LE>()?;
            let raw = ar.read_u8()?;
            let flags = EPropertyTagFlags::from_bits(raw)
                .ok_or_else(|| Error::InvalidData(format!("unknown tag flags {raw:#04x}")))?;
            let index = if flags.contains(EPropertyTagFlags::HasArrayIndex) {
                ar.read_u32::<LE>()?
            } else {
                0
            };
            let id = if flags.contains(EPropertyTagFlags::HasPropertyGuid) {
                Some(FGuid::read(ar)?)
            } else {
                None
            };
            let extensions = if flags.contains(EPropertyTagFlags::HasPropertyExtensions) {
                read_extensions(ar, &name)?
            } else {
                vec![]
            };
            Ok(Some(Self {
                data: TagData::from_node(&node, flags),
                name,
                index,
                size,
                id,
                flags: raw,
                extensions,
                bool_byte: None,
            }))
        } else {
            let scope = name.to_string();
            ar.with_scope(&scope, |ar| {
                let type_name = ar.read_fstring()?;
                let size = ar.read_u32::<LE>()?;
                let index = ar.read_u32::<LE>()?;
                let mut bool_byte = None;
                let data = match PropertyType::from_name(type_name.as_str()) {
                    Some(PropertyType::BoolProperty) => {
                        let b = ar.read_u8()?;
                        bool_byte = (b > 1).then_some(b);
                        TagData::Bool(b > 0)
                    }
                    Some(PropertyType::ByteProperty) => {
                        let enum_type = ar.read_fstring()?;
                        TagData::Byte((enum_type != "None").then_some(enum_type))
                    }
                    Some(PropertyType::EnumProperty) => TagData::Enum(ar.read_fstring()?, None),
                    Some(PropertyType::ArrayProperty) => {
                        TagData::Array(TagData::from_type(ar.read_fstring()?, None).into())
                    }
                    Some(PropertyType::SetProperty) => {
                        let key_type = ar.read_fstring()?;
                        let key_struct = if key_type == "StructProperty" {
                            Some(ar.get_type_or(&StructType::Guid)?)
                        } else {
                            None
                        };
                        TagData::Set {
                            key_type: TagData::from_type(key_type, key_struct).into(),
                        }
                    }
                    Some(PropertyType::MapProperty) => {
                        let key_type = ar.read_fstring()?;
                        let key_struct = if key_type == "StructProperty" {
                            Some(ar.with_scope("Key", |ar| ar.get_type_or(&StructType::Guid))?)
                        } else {
                            None
                        };
                        let value_type = ar.read_fstring()?;
                        let value_struct = if value_type == "StructProperty" {
                            Some(ar.with_scope("Value", |ar| {
                                ar.get_type_or(&StructType::Struct(None))
                            })?)
                        } else {
                            None
                        };
                        TagData::Map {
                            key_type: TagData::from_type(key_type, key_struct).into(),
                            value_type: TagData::from_type(value_type, value_struct).into(),
                        }
                    }
                    Some(PropertyType::StructProperty) => TagData::Struct {
                        struct_type: StructType::read(ar)?,
                        id: FGuid::read(ar)?,
                    },
                    Some(other) => TagData::Other(other),
                    None => TagData::Unknown(TypeNode::leaf(type_name)),
                };
                let id = if ar.version().property_guid() && ar.read_u8()? > 0 {
                    Some(FGuid::read(ar)?)
                } else {
                    None
                };
                Ok(Some(Self {
                    name,
                    index,
                    size,
                    id,
                    flags: 0,
                    extensions: vec![],
                    bool_byte,
                    data,
                }))
            })
        }
    }

    /// Write the tag with `size` as the payload size. Returns the stream offset of the size
    /// field so it can be patched once the payload has been written.
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A, size: u32) -> Result<u64> {
        if self.name == "None" {
            return Err(Error::InvalidData(
                "a property named None would end its property list".into(),
            ));
        }
        ar.write_fstring(&self.name)?;
        if ar.version().property_tag() {
            self.data.to_node().write(ar)?;
            let size_offset = ar.stream_position()?;
            ar.write_u32::<LE>(size)?;

            let mut flags = EPropertyTagFlags::from_bits_retain(self.flags);
            flags.set(
                EPropertyTagFlags::BoolTrue,
                matches!(self.data, TagData::Bool(true)),
            );
            flags.set(EPropertyTagFlags::HasPropertyGuid, self.id.is_some());
            flags.set(
                EPropertyTagFlags::HasPropertyExtensions,
                !self.extensions.is_empty(),
            );
            if self.index != 0 {
                flags.insert(EPropertyTagFlags::HasArrayIndex);
            }
            ar.write_u8(flags.bits())?;
            if flags.contains(EPropertyTagFlags::HasArrayIndex) {
                ar.write_u32::<LE>(self.index)?;
            }
            if let Some(id) = &self.id {
                id.write(ar)?;
            }
            ar.write_all(&self.extensions)?;
            Ok(size_offset)
        } else {
            self.data.write_basic_type(ar)?;
            let size_offset = ar.stream_position()?;
            ar.write_u32::<LE>(size)?;
            ar.write_u32::<LE>(self.index)?;
            match &self.data {
                TagData::Array(inner) => inner.write_basic_type(ar)?,
                TagData::Struct { struct_type, id } => {
                    struct_type.write(ar)?;
                    id.write(ar)?;
                }
                TagData::Set { key_type } => key_type.write_basic_type(ar)?,
                TagData::Map {
                    key_type,
                    value_type,
                } => {
                    key_type.write_basic_type(ar)?;
                    value_type.write_basic_type(ar)?;
                }
                TagData::Byte(Some(enum_type)) | TagData::Enum(enum_type, _) => {
                    ar.write_fstring(enum_type)?
                }
                TagData::Byte(None) => ar.write_string("None")?,
                TagData::Bool(value) => {
                    ar.write_u8(self.bool_byte.filter(|_| *value).unwrap_or(*value as u8))?
                }
                TagData::Other(_) | TagData::Unknown(_) => {}
            }
            if ar.version().property_guid() {
                match &self.id {
                    Some(id) => {
                        ar.write_u8(1)?;
                        id.write(ar)?;
                    }
                    None => ar.write_u8(0)?,
                }
            }
            Ok(size_offset)
        }
    }
}

/// Extension flags and, for overridable properties, the override operation and the
/// experimental overridable logic flag.
fn read_extensions<A: ArchiveReader>(ar: &mut A, name: &FString) -> Result<Vec<u8>> {
    let raw = ar.read_u8()?;
    let extensions = EPropertyTagExtension::from_bits(raw)
        .filter(|e| !e.contains(EPropertyTagExtension::ReserveForFutureUse))
        .ok_or_else(|| {
            Error::InvalidData(format!("unknown property extensions {raw:#04x} on {name}"))
        })?;
    let mut bytes = vec![raw];
    if extensions.contains(EPropertyTagExtension::OverridableInformation) {
        bytes.push(ar.read_u8()?);
        bytes.push(ar.read_u8()?);
    }
    Ok(bytes)
}
