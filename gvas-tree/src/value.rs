use std::{
    borrow::Cow,
    io::{Seek, SeekFrom},
};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::{
    archive::{patch_size, read_array, write_len, ArchiveReader, ArchiveWriter},
    error::Error,
    fstring::{read_bytes, FString},
    header::VersionInfo,
    structs::{Double, Float, SoftObjectPath, StructType, StructValue},
    tag::{PropertyTag, PropertyType, TagData},
    text::Text,
    Result,
};

/// Just a plain byte, or an enum label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Byte {
    Byte(u8),
    Label(FString),
}
impl Byte {
    pub(crate) fn is_raw(&self) -> bool {
        matches!(self, Byte::Byte(_))
    }
    pub(crate) fn kind(raw: bool) -> &'static str {
        if raw {
            "ByteProperty (raw byte)"
        } else {
            "ByteProperty (enum label)"
        }
    }
}

/// Decoded payload of a property or of a container element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(Float),
    Double(Double),
    Byte(Byte),
    Enum(FString),
    Str(FString),
    Name(FString),
    Object(FString),
    SoftObject(SoftObjectPath),
    Text(Text),
    Struct(StructValue),
    Array(ArrayValue),
    Set(SetValue),
    Map(MapValue),
    /// Payload of a property that was not decoded, re-emitted verbatim
    Opaque(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    /// Shared element tag of legacy struct arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_tag: Option<PropertyTag>,
    pub elements: ValueVec,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueVec {
    Bytes(Vec<u8>),
    Values(Vec<PropertyValue>),
    /// Byte array holding an embedded object record
    Record(Box<ObjectRecord>),
}

/// Set payload. `removed` holds the elements a delta save removes from the default value and is
/// carried through unchanged.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<PropertyValue>,
    pub elements: Vec<PropertyValue>,
}
/// Map payload. `removed` holds the keys a delta save removes from the default value and is
/// carried through unchanged.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<PropertyValue>,
    pub entries: Vec<MapEntry>,
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: PropertyValue,
    pub value: PropertyValue,
}

/// Object serialized into a byte array: a flag byte, a property list and a fixed-length trailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub flags: u8,
    pub properties: Properties,
    pub trailer: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub tag: PropertyTag,
    pub value: PropertyValue,
    /// Set on every property along the path of an applied edit.
    #[serde(skip)]
    pub dirty: bool,
}

/// Ordered property list. Names may repeat (fixed-size arrays are stored as one property per
/// array index) so lookups return the first match.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties(pub Vec<Property>);
impl Properties {
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.0.iter().find(|p| p.tag.name == name)
    }
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.0.iter_mut().find(|p| p.tag.name == name)
    }
    /// Position of the property with the given name and array index.
    pub fn position(&self, name: &str, index: u32) -> Option<usize> {
        self.0
            .iter()
            .position(|p| p.tag.name == name && p.tag.index == index)
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl std::ops::Index<&str> for Properties {
    type Output = Property;
    /// Panics if no property has this name.
    fn index(&self, name: &str) -> &Property {
        match self.get(name) {
            Some(p) => p,
            None => panic!("no property named {name:?}"),
        }
    }
}
impl<'a> IntoIterator for &'a Properties {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[instrument(skip_all)]
pub(crate) fn read_properties_until_none<A: ArchiveReader>(ar: &mut A) -> Result<Properties> {
    let mut properties = Properties::default();
    while let Some(tag) = PropertyTag::read(ar)? {
        let name = tag.name.to_string();
        let property = ar.with_scope(&name, |ar| Property::read(ar, tag))?;
        properties.0.push(property);
    }
    attach_record(ar, &mut properties);
    Ok(properties)
}
#[instrument(skip_all)]
pub(crate) fn write_properties_none_terminated<A: ArchiveWriter>(
    ar: &mut A,
    properties: &Properties,
) -> Result<()> {
    for p in properties {
        p.write(ar)?;
    }
    ar.write_string("None")?;
    Ok(())
}

/// Decode the `Data` byte array of a list whose `Class` names a registered record class.
fn attach_record<A: ArchiveReader>(ar: &A, properties: &mut Properties) {
    let class = match properties.get("Class").map(|p| &p.value) {
        Some(PropertyValue::Object(class)) => class.value.clone(),
        _ => return,
    };
    let Some(trailer_len) = ar.types().record_trailer(&class) else {
        return;
    };
    let Some(PropertyValue::Array(array)) = properties.get_mut("Data").map(|p| &mut p.value)
    else {
        return;
    };
    let ValueVec::Bytes(bytes) = &array.elements else {
        return;
    };
    match ObjectRecord::parse(ar, bytes, trailer_len) {
        Ok(record) => array.elements = ValueVec::Record(Box::new(record)),
        Err(e) => warn!(class = %class, "embedded record kept as bytes: {e}"),
    }
}

impl ObjectRecord {
    fn parse<A: ArchiveReader>(ar: &A, bytes: &[u8], trailer_len: usize) -> Result<Self> {
        let mut sub = ar.fork(bytes);
        let flags = sub.read_u8()?;
        let properties = read_properties_until_none(&mut sub)?;
        let end = sub.stream_position()? as usize;
        let trailer = bytes[end..].to_vec();
        if trailer.len() != trailer_len {
            return Err(Error::InvalidData(format!(
                "record trailer is {} bytes, expected {trailer_len}",
                trailer.len()
            )));
        }
        let record = Self {
            flags,
            properties,
            trailer,
        };
        let mut check = ar.fork_writer();
        record.write(&mut check)?;
        if check.into_inner() != bytes {
            return Err(Error::InvalidData("record does not re-encode identically".into()));
        }
        Ok(record)
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_u8(self.flags)?;
        write_properties_none_terminated(ar, &self.properties)?;
        ar.write_all(&self.trailer)?;
        Ok(())
    }
}

impl Property {
    pub fn new(tag: PropertyTag, value: PropertyValue) -> Self {
        Self {
            tag,
            value,
            dirty: false,
        }
    }

    #[instrument(name = "Property_read", skip_all)]
    fn read<A: ArchiveReader>(ar: &mut A, tag: PropertyTag) -> Result<Property> {
        let start = ar.stream_position()?;
        if tag.data.has_opaque_part() {
            let value = PropertyValue::Opaque(read_bytes(ar, tag.size as usize)?);
            return Ok(Property::new(tag, value));
        }
        let decoded = read_value(ar, &tag).and_then(|value| {
            check_size(ar, start, tag.size)?;
            Ok(value)
        });
        let reason = match decoded {
            Ok(value) => return Ok(Property::new(tag, value)),
            Err(Error::UnsupportedVariant(reason)) => reason,
            Err(
                e @ (Error::SizeMismatch { .. } | Error::TruncatedData | Error::InvalidData(_)),
            ) if assumed_member_struct(ar, &tag.data) => {
                format!("{e} with an assumed member struct type")
            }
            Err(e) => return Err(e),
        };
        warn!(
            offset = start,
            property = %ar.path(),
            "{reason}, keeping payload as raw bytes"
        );
        ar.seek(SeekFrom::Start(start))?;
        let value = PropertyValue::Opaque(read_bytes(ar, tag.size as usize)?);
        Ok(Property::new(tag, value))
    }

    #[instrument(name = "Property_write", skip_all)]
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        let mut tag = Cow::Borrowed(&self.tag);
        if let (PropertyValue::Bool(value), TagData::Bool(inline)) = (&self.value, &tag.data) {
            if value != inline {
                tag.to_mut().data = TagData::Bool(*value);
            }
        }
        if !matches!(self.value, PropertyValue::Opaque(_)) {
            self.value.check(&tag.data, ar.version())?;
        }
        let size_offset = tag.write(ar, 0)?;
        let start = ar.stream_position()?;
        match (&self.value, &tag.data) {
            (PropertyValue::Opaque(bytes), _) => ar.write_all(bytes)?,
            (PropertyValue::Bool(_), TagData::Bool(_)) => {}
            (PropertyValue::Array(array), TagData::Array(inner)) => {
                array.write(ar, &tag.name, inner)?
            }
            (PropertyValue::Set(set), TagData::Set { key_type }) => set.write(ar, key_type)?,
            (PropertyValue::Map(map), TagData::Map { .. }) => map.write(ar)?,
            (value, _) => value.write_element(ar)?,
        }
        patch_size(ar, size_offset, start)
    }
}

/// Fail unless exactly `declared` bytes were consumed since `start`.
fn check_size<A: ArchiveReader>(ar: &mut A, start: u64, declared: u32) -> Result<()> {
    let consumed = ar.stream_position()? - start;
    if consumed != u64::from(declared) {
        return Err(Error::SizeMismatch {
            offset: start,
            declared: declared.into(),
            consumed,
        });
    }
    Ok(())
}

/// Whether a legacy set or map has a struct member whose type no hint names, so the decoder
/// had to assume one.
fn assumed_member_struct<A: ArchiveReader>(ar: &A, data: &TagData) -> bool {
    if ar.version().property_tag() {
        return false;
    }
    let path = ar.path();
    let assumed = |member: &TagData, hint: &str| {
        matches!(member, TagData::Struct { .. }) && !ar.types().has(hint)
    };
    match data {
        TagData::Set { key_type } => assumed(&**key_type, &path),
        TagData::Map {
            key_type,
            value_type,
        } => {
            assumed(&**key_type, &format!("{path}.Key"))
                || assumed(&**value_type, &format!("{path}.Value"))
        }
        _ => false,
    }
}

/// Byte members of sets and maps are raw bytes only when a complete type name says the byte
/// has no enum. Everywhere else they are enum labels.
pub(crate) fn raw_byte_members(data: &TagData, version: &dyn VersionInfo) -> bool {
    matches!(data, TagData::Byte(None)) && version.property_tag()
}

/// Legacy struct arrays start with one tag shared by all elements.
fn shared_element_tag(element_type: &TagData, version: &dyn VersionInfo) -> bool {
    matches!(element_type, TagData::Struct { .. })
        && version.array_inner_tag()
        && !version.property_tag()
}

fn read_value<A: ArchiveReader>(ar: &mut A, tag: &PropertyTag) -> Result<PropertyValue> {
    Ok(match &tag.data {
        TagData::Bool(value) => {
            if tag.size != 0 {
                return Err(Error::UnsupportedVariant("boolean with a payload".into()));
            }
            PropertyValue::Bool(*value)
        }
        TagData::Byte(_) if tag.size == 1 => PropertyValue::Byte(Byte::Byte(ar.read_u8()?)),
        TagData::Byte(_) => PropertyValue::Byte(Byte::Label(ar.read_fstring()?)),
        TagData::Array(inner) => PropertyValue::Array(ArrayValue::read(ar, inner, tag.size)?),
        TagData::Set { key_type } => PropertyValue::Set(SetValue::read(ar, key_type)?),
        TagData::Map {
            key_type,
            value_type,
        } => PropertyValue::Map(MapValue::read(ar, key_type, value_type)?),
        other => read_element(ar, other)?,
    })
}

/// Bare value without a tag, as stored inside containers and struct properties.
fn read_element<A: ArchiveReader>(ar: &mut A, data: &TagData) -> Result<PropertyValue> {
    Ok(match data {
        TagData::Struct { struct_type, .. } => {
            PropertyValue::Struct(StructValue::read(ar, struct_type)?)
        }
        TagData::Byte(_) if raw_byte_members(data, ar.version()) => {
            PropertyValue::Byte(Byte::Byte(ar.read_u8()?))
        }
        TagData::Byte(_) => PropertyValue::Byte(Byte::Label(ar.read_fstring()?)),
        TagData::Enum(..) => PropertyValue::Enum(ar.read_fstring()?),
        TagData::Bool(_) => match ar.read_u8()? {
            b @ (0 | 1) => PropertyValue::Bool(b == 1),
            b => {
                return Err(Error::UnsupportedVariant(format!(
                    "boolean element with value {b}"
                )))
            }
        },
        TagData::Other(t) => match t {
            PropertyType::Int8Property => PropertyValue::Int8(ar.read_i8()?),
            PropertyType::Int16Property => PropertyValue::Int16(ar.read_i16::<LE>()?),
            PropertyType::IntProperty => PropertyValue::Int(ar.read_i32::<LE>()?),
            PropertyType::Int64Property => PropertyValue::Int64(ar.read_i64::<LE>()?),
            PropertyType::UInt8Property => PropertyValue::UInt8(ar.read_u8()?),
            PropertyType::UInt16Property => PropertyValue::UInt16(ar.read_u16::<LE>()?),
            PropertyType::UInt32Property => PropertyValue::UInt32(ar.read_u32::<LE>()?),
            PropertyType::UInt64Property => PropertyValue::UInt64(ar.read_u64::<LE>()?),
            PropertyType::FloatProperty => PropertyValue::Float(ar.read_f32::<LE>()?.into()),
            PropertyType::DoubleProperty => PropertyValue::Double(ar.read_f64::<LE>()?.into()),
            PropertyType::StrProperty => PropertyValue::Str(ar.read_fstring()?),
            PropertyType::NameProperty => PropertyValue::Name(ar.read_fstring()?),
            PropertyType::ObjectProperty => PropertyValue::Object(ar.read_fstring()?),
            PropertyType::SoftObjectProperty => {
                PropertyValue::SoftObject(SoftObjectPath::read(ar)?)
            }
            PropertyType::TextProperty => PropertyValue::Text(Text::read(ar)?),
            other => {
                return Err(Error::UnsupportedVariant(format!(
                    "{other} described only by its type name"
                )))
            }
        },
        TagData::Array(_) | TagData::Set { .. } | TagData::Map { .. } | TagData::Unknown(_) => {
            return Err(Error::UnsupportedVariant(format!(
                "{} nested in a container",
                data.type_name()
            )))
        }
    })
}

impl ArrayValue {
    /// Type of the elements: the shared inner tag when there is one, otherwise the tag's own.
    pub fn element_type<'a>(&'a self, inner: &'a TagData) -> &'a TagData {
        self.inner_tag.as_ref().map_or(inner, |tag| &tag.data)
    }
    pub fn len(&self) -> usize {
        match &self.elements {
            ValueVec::Bytes(bytes) => bytes.len(),
            ValueVec::Values(values) => values.len(),
            ValueVec::Record(_) => 1,
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[instrument(name = "ArrayValue_read", skip_all)]
    fn read<A: ArchiveReader>(ar: &mut A, inner: &TagData, size: u32) -> Result<Self> {
        let count = ar.read_u32::<LE>()?;
        if shared_element_tag(inner, ar.version()) {
            let tag = PropertyTag::read(ar)?
                .ok_or_else(|| Error::InvalidData("struct array without an inner tag".into()))?;
            let TagData::Struct { struct_type, .. } = &tag.data else {
                return Err(Error::InvalidData(format!(
                    "struct array inner tag of type {}",
                    tag.data.type_name()
                )));
            };
            let start = ar.stream_position()?;
            let values = read_array(count, ar, |ar| {
                Ok(PropertyValue::Struct(StructValue::read(ar, struct_type)?))
            })?;
            check_size(ar, start, tag.size)?;
            return Ok(Self {
                inner_tag: Some(tag),
                elements: ValueVec::Values(values),
            });
        }
        let elements = match inner {
            // byte arrays hold either raw bytes or enum labels, told apart by the payload size
            TagData::Byte(_) if size.checked_sub(4) == Some(count) => {
                ValueVec::Bytes(read_bytes(ar, count as usize)?)
            }
            TagData::Byte(_) => ValueVec::Values(read_array(count, ar, |ar| {
                Ok(PropertyValue::Byte(Byte::Label(ar.read_fstring()?)))
            })?),
            _ => ValueVec::Values(read_array(count, ar, |ar| read_element(ar, inner))?),
        };
        Ok(Self {
            inner_tag: None,
            elements,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A, name: &FString, inner: &TagData) -> Result<()> {
        match &self.elements {
            ValueVec::Bytes(bytes) => {
                write_len(ar, bytes.len())?;
                ar.write_all(bytes)?;
            }
            ValueVec::Record(record) => {
                let size_offset = ar.stream_position()?;
                ar.write_u32::<LE>(0)?;
                let start = ar.stream_position()?;
                record.write(ar)?;
                patch_size(ar, size_offset, start)?;
            }
            ValueVec::Values(values) => {
                write_len(ar, values.len())?;
                let element_type = self.element_type(inner);
                if shared_element_tag(element_type, ar.version()) {
                    let tag = match &self.inner_tag {
                        Some(tag) => Cow::Borrowed(tag),
                        None => Cow::Owned(PropertyTag::new(name.clone(), element_type.clone())),
                    };
                    let size_offset = tag.write(ar, 0)?;
                    let start = ar.stream_position()?;
                    for v in values {
                        v.write_element(ar)?;
                    }
                    patch_size(ar, size_offset, start)?;
                } else {
                    for v in values {
                        v.write_element(ar)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl SetValue {
    #[instrument(name = "SetValue_read", skip_all)]
    fn read<A: ArchiveReader>(ar: &mut A, key_type: &TagData) -> Result<Self> {
        Ok(Self {
            removed: read_array(ar.read_u32::<LE>()?, ar, |ar| read_element(ar, key_type))?,
            elements: read_array(ar.read_u32::<LE>()?, ar, |ar| read_element(ar, key_type))?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A, _key_type: &TagData) -> Result<()> {
        for list in [&self.removed, &self.elements] {
            write_len(ar, list.len())?;
            for v in list {
                v.write_element(ar)?;
            }
        }
        Ok(())
    }
}

impl MapValue {
    #[instrument(name = "MapValue_read", skip_all)]
    fn read<A: ArchiveReader>(ar: &mut A, key_type: &TagData, value_type: &TagData) -> Result<Self> {
        let removed = read_array(ar.read_u32::<LE>()?, ar, |ar| read_element(ar, key_type))?;
        let entries = read_array(ar.read_u32::<LE>()?, ar, |ar| {
            Ok(MapEntry {
                key: read_element(ar, key_type)?,
                value: read_element(ar, value_type)?,
            })
        })?;
        Ok(Self { removed, entries })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        write_len(ar, self.removed.len())?;
        for key in &self.removed {
            key.write_element(ar)?;
        }
        write_len(ar, self.entries.len())?;
        for entry in &self.entries {
            entry.key.write_element(ar)?;
            entry.value.write_element(ar)?;
        }
        Ok(())
    }
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Struct(s) => s.type_name(),
            PropertyValue::Opaque(_) => "Opaque",
            other => other.property_type().map_or("None", |t| t.name()),
        }
    }
    /// Property type this value is written as, if it has one.
    pub fn property_type(&self) -> Option<PropertyType> {
        Some(match self {
            PropertyValue::Bool(_) => PropertyType::BoolProperty,
            PropertyValue::Int8(_) => PropertyType::Int8Property,
            PropertyValue::Int16(_) => PropertyType::Int16Property,
            PropertyValue::Int(_) => PropertyType::IntProperty,
            PropertyValue::Int64(_) => PropertyType::Int64Property,
            PropertyValue::UInt8(_) => PropertyType::UInt8Property,
            PropertyValue::UInt16(_) => PropertyType::UInt16Property,
            PropertyValue::UInt32(_) => PropertyType::UInt32Property,
            PropertyValue::UInt64(_) => PropertyType::UInt64Property,
            PropertyValue::Float(_) => PropertyType::FloatProperty,
            PropertyValue::Double(_) => PropertyType::DoubleProperty,
            PropertyValue::Byte(_) => PropertyType::ByteProperty,
            PropertyValue::Enum(_) => PropertyType::EnumProperty,
            PropertyValue::Str(_) => PropertyType::StrProperty,
            PropertyValue::Name(_) => PropertyType::NameProperty,
            PropertyValue::Object(_) => PropertyType::ObjectProperty,
            PropertyValue::SoftObject(_) => PropertyType::SoftObjectProperty,
            PropertyValue::Text(_) => PropertyType::TextProperty,
            PropertyValue::Struct(_) => PropertyType::StructProperty,
            PropertyValue::Array(_) => PropertyType::ArrayProperty,
            PropertyValue::Set(_) => PropertyType::SetProperty,
            PropertyValue::Map(_) => PropertyType::MapProperty,
            PropertyValue::Opaque(_) => return None,
        })
    }
    /// Tag describing a freshly created property holding this value. Only scalars whose tag
    /// can be derived from the value alone qualify.
    pub fn scalar_tag(&self) -> Option<TagData> {
        match self {
            PropertyValue::Bool(b) => Some(TagData::Bool(*b)),
            PropertyValue::Byte(Byte::Byte(_)) => Some(TagData::Byte(None)),
            PropertyValue::Byte(Byte::Label(_)) | PropertyValue::Enum(_) => None,
            other => other
                .property_type()
                .filter(|t| t.is_scalar())
                .map(TagData::Other),
        }
    }
    pub fn is_opaque(&self) -> bool {
        matches!(self, PropertyValue::Opaque(_))
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s)
            | PropertyValue::Name(s)
            | PropertyValue::Enum(s)
            | PropertyValue::Object(s)
            | PropertyValue::Byte(Byte::Label(s)) => Some(s.as_str()),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            PropertyValue::Int8(v) => v.into(),
            PropertyValue::Int16(v) => v.into(),
            PropertyValue::Int(v) => v.into(),
            PropertyValue::Int64(v) => v,
            PropertyValue::UInt8(v) | PropertyValue::Byte(Byte::Byte(v)) => v.into(),
            PropertyValue::UInt16(v) => v.into(),
            PropertyValue::UInt32(v) => v.into(),
            PropertyValue::UInt64(v) => i64::try_from(v).ok()?,
            _ => return None,
        })
    }
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            PropertyValue::Float(v) => Some(v.0.into()),
            PropertyValue::Double(v) => Some(v.0),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            PropertyValue::Bool(v) => Some(v),
            _ => None,
        }
    }
    /// Whether a map key equals `wanted`. Keys also match a key spelled as text, so a path
    /// parsed from a string can address `NameProperty` or integer keys.
    pub fn matches_key(&self, wanted: &PropertyValue) -> bool {
        if self == wanted {
            return true;
        }
        match (self.key_text(), wanted.key_text()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
    pub(crate) fn key_text(&self) -> Option<String> {
        self.as_str()
            .map(str::to_owned)
            .or_else(|| self.as_i64().map(|v| v.to_string()))
    }

    /// Zero value for a property of type `data`.
    pub fn default_for(data: &TagData, version: &dyn VersionInfo) -> Self {
        match data {
            TagData::Bool(b) => PropertyValue::Bool(*b),
            TagData::Byte(None) => PropertyValue::Byte(Byte::Byte(0)),
            TagData::Byte(Some(_)) => PropertyValue::Byte(Byte::Label(FString::default())),
            TagData::Enum(..) => PropertyValue::Enum(FString::default()),
            TagData::Struct { struct_type, .. } => StructValue::default_for(struct_type, version)
                .map_or(PropertyValue::Opaque(vec![]), PropertyValue::Struct),
            TagData::Array(inner) => PropertyValue::Array(ArrayValue {
                inner_tag: None,
                elements: match **inner {
                    TagData::Byte(None) => ValueVec::Bytes(vec![]),
                    _ => ValueVec::Values(vec![]),
                },
            }),
            TagData::Set { .. } => PropertyValue::Set(SetValue::default()),
            TagData::Map { .. } => PropertyValue::Map(MapValue::default()),
            TagData::Other(t) => match t {
                PropertyType::Int8Property => PropertyValue::Int8(0),
                PropertyType::Int16Property => PropertyValue::Int16(0),
                PropertyType::IntProperty => PropertyValue::Int(0),
                PropertyType::Int64Property => PropertyValue::Int64(0),
                PropertyType::UInt8Property => PropertyValue::UInt8(0),
                PropertyType::UInt16Property => PropertyValue::UInt16(0),
                PropertyType::UInt32Property => PropertyValue::UInt32(0),
                PropertyType::UInt64Property => PropertyValue::UInt64(0),
                PropertyType::FloatProperty => PropertyValue::Float(Float(0.0)),
                PropertyType::DoubleProperty => PropertyValue::Double(Double(0.0)),
                PropertyType::StrProperty => PropertyValue::Str(FString::default()),
                PropertyType::NameProperty => PropertyValue::Name(FString::default()),
                PropertyType::ObjectProperty => PropertyValue::Object(FString::default()),
                PropertyType::SoftObjectProperty => {
                    PropertyValue::SoftObject(SoftObjectPath::default_for(version))
                }
                PropertyType::TextProperty => PropertyValue::Text(Text::default()),
                _ => PropertyValue::Opaque(vec![]),
            },
            TagData::Unknown(_) => PropertyValue::Opaque(vec![]),
        }
    }

    /// Check a container member. Byte members of one container are either all raw bytes or
    /// all enum labels, as `raw_byte` says.
    pub(crate) fn check_member(
        &self,
        data: &TagData,
        raw_byte: bool,
        version: &dyn VersionInfo,
    ) -> Result<()> {
        match (data, self) {
            (TagData::Byte(_), PropertyValue::Byte(b)) if b.is_raw() != raw_byte => {
                Err(Error::mismatch(Byte::kind(raw_byte), Byte::kind(b.is_raw())))
            }
            _ => self.check(data, version),
        }
    }

    /// Check that this value has the shape `data` describes, recursing into containers.
    pub(crate) fn check(&self, data: &TagData, version: &dyn VersionInfo) -> Result<()> {
        let ok = match (data, self) {
            (TagData::Bool(_), PropertyValue::Bool(_))
            | (TagData::Byte(_), PropertyValue::Byte(_))
            | (TagData::Enum(..), PropertyValue::Enum(_)) => true,
            (TagData::Struct { struct_type, .. }, PropertyValue::Struct(s)) => {
                if !s.matches(struct_type) {
                    return Err(Error::mismatch(struct_type.as_str(), s.type_name()));
                }
                true
            }
            (TagData::Array(inner), PropertyValue::Array(array)) => {
                return array.check(inner, version);
            }
            (TagData::Set { key_type }, PropertyValue::Set(set)) => {
                let raw = raw_byte_members(key_type, version);
                return set
                    .removed
                    .iter()
                    .chain(&set.elements)
                    .try_for_each(|e| e.check_member(key_type, raw, version));
            }
            (
                TagData::Map {
                    key_type,
                    value_type,
                },
                PropertyValue::Map(map),
            ) => {
                let raw_key = raw_byte_members(key_type, version);
                let raw_value = raw_byte_members(value_type, version);
                map.removed
                    .iter()
                    .try_for_each(|k| k.check_member(key_type, raw_key, version))?;
                return map.entries.iter().try_for_each(|e| {
                    e.key.check_member(key_type, raw_key, version)?;
                    e.value.check_member(value_type, raw_value, version)
                });
            }
            (TagData::Other(t), value) => value.property_type() == Some(*t),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::mismatch(data.type_name(), self.type_name()))
        }
    }

    /// Write as a bare element. Containers and opaque payloads only exist at property level.
    pub(crate) fn write_element<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        match self {
            PropertyValue::Bool(v) => ar.write_u8(*v as u8)?,
            PropertyValue::Int8(v) => ar.write_i8(*v)?,
            PropertyValue::Int16(v) => ar.write_i16::<LE>(*v)?,
            PropertyValue::Int(v) => ar.write_i32::<LE>(*v)?,
            PropertyValue::Int64(v) => ar.write_i64::<LE>(*v)?,
            PropertyValue::UInt8(v) => ar.write_u8(*v)?,
            PropertyValue::UInt16(v) => ar.write_u16::<LE>(*v)?,
            PropertyValue::UInt32(v) => ar.write_u32::<LE>(*v)?,
            PropertyValue::UInt64(v) => ar.write_u64::<LE>(*v)?,
            PropertyValue::Float(v) => ar.write_f32::<LE>(v.0)?,
            PropertyValue::Double(v) => ar.write_f64::<LE>(v.0)?,
            PropertyValue::Byte(Byte::Byte(v)) => ar.write_u8(*v)?,
            PropertyValue::Byte(Byte::Label(v))
            | PropertyValue::Enum(v)
            | PropertyValue::Str(v)
            | PropertyValue::Name(v)
            | PropertyValue::Object(v) => ar.write_fstring(v)?,
            PropertyValue::SoftObject(v) => v.write(ar)?,
            PropertyValue::Text(v) => v.write(ar)?,
            PropertyValue::Struct(v) => v.write(ar)?,
            PropertyValue::Array(_)
            | PropertyValue::Set(_)
            | PropertyValue::Map(_)
            | PropertyValue::Opaque(_) => {
                return Err(Error::UnsupportedOperation(format!(
                    "{} cannot be written as a container element",
                    self.type_name()
                )))
            }
        }
        Ok(())
    }
}

impl ArrayValue {
    fn check(&self, inner: &TagData, version: &dyn VersionInfo) -> Result<()> {
        match &self.inner_tag {
            Some(tag) if !matches!(tag.data, TagData::Struct { .. }) => {
                return Err(Error::mismatch("StructProperty", tag.data.type_name()));
            }
            None if shared_element_tag(inner, version)
                && matches!(
                    inner,
                    TagData::Struct {
                        struct_type: StructType::Struct(None),
                        ..
                    }
                ) =>
            {
                return Err(Error::UnsupportedOperation(
                    "struct array without the element tag naming its struct type".into(),
                ));
            }
            _ => {}
        }
        let element_type = self.element_type(inner);
        match &self.elements {
            // byte elements kept as values are enum labels, raw bytes are stored as `Bytes`
            ValueVec::Values(values) => values
                .iter()
                .try_for_each(|v| v.check_member(element_type, false, version)),
            ValueVec::Bytes(_) | ValueVec::Record(_) => match element_type {
                TagData::Byte(_) => Ok(()),
                other => Err(Error::mismatch(other.type_name(), "ByteProperty")),
            },
        }
    }
}
