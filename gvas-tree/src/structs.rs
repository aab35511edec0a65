use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use tracing::instrument;

use crate::{
    archive::{read_array, write_len, ArchiveReader, ArchiveWriter},
    error::Error,
    fstring::FString,
    header::VersionInfo,
    value::{read_properties_until_none, write_properties_none_terminated, Properties},
    Result,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FGuid {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}
impl FGuid {
    pub fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }
    pub fn nil() -> Self {
        Self::default()
    }
    pub fn is_nil(&self) -> bool {
        *self == Self::nil()
    }
    pub fn parse_str(s: &str) -> Result<Self> {
        let digits = s.replace('-', "");
        if digits.len() != 32 || !digits.is_ascii() {
            return Err(Error::InvalidData(format!("malformed GUID {s:?}")));
        }
        let part = |i: usize| {
            u32::from_str_radix(&digits[i * 8..i * 8 + 8], 16)
                .map_err(|_| Error::InvalidData(format!("malformed GUID {s:?}")))
        };
        Ok(Self::new(part(0)?, part(1)?, part(2)?, part(3)?))
    }

    #[instrument(name = "FGuid_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            a: ar.read_u32::<LE>()?,
            b: ar.read_u32::<LE>()?,
            c: ar.read_u32::<LE>()?,
            d: ar.read_u32::<LE>()?,
        })
    }
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        for part in [self.a, self.b, self.c, self.d] {
            ar.write_u32::<LE>(part)?;
        }
        Ok(())
    }
}
impl std::fmt::Display for FGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:04x}{:08x}",
            self.a,
            self.b >> 16,
            self.b & 0xffff,
            self.c >> 16,
            self.c & 0xffff,
            self.d
        )
    }
}
impl Serialize for FGuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
impl<'de> Deserialize<'de> for FGuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FGuid::parse_str(&s).map_err(D::Error::custom)
    }
}

/// `f32` that serializes NaN and infinities as strings.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Float(pub f32);
/// `f64` that serializes NaN and infinities as strings.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Double(pub f64);

impl From<f32> for Float {
    fn from(v: f32) -> Self {
        Self(v)
    }
}
impl From<Float> for f32 {
    fn from(v: Float) -> Self {
        v.0
    }
}
impl From<f64> for Double {
    fn from(v: f64) -> Self {
        Self(v)
    }
}
impl From<Double> for f64 {
    fn from(v: Double) -> Self {
        v.0
    }
}
impl std::fmt::Display for Float {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl std::fmt::Display for Double {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FloatRepr {
    Number(f64),
    Special(String),
}
impl FloatRepr {
    fn value<E: serde::de::Error>(self) -> std::result::Result<f64, E> {
        match self {
            FloatRepr::Number(v) => Ok(v),
            FloatRepr::Special(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "-NaN" => Ok(-f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                _ => Err(E::custom(format!("unexpected string {s:?} in place of a float"))),
            },
        }
    }
}
fn special_name(v: f64) -> &'static str {
    match (v.is_nan(), v.is_sign_negative()) {
        (true, false) => "NaN",
        (true, true) => "-NaN",
        (false, false) => "Infinity",
        (false, true) => "-Infinity",
    }
}
impl Serialize for Float {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_f32(self.0)
        } else {
            serializer.serialize_str(special_name(self.0 as f64))
        }
    }
}
impl<'de> Deserialize<'de> for Float {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self(FloatRepr::deserialize(deserializer)?.value::<D::Error>()? as f32))
    }
}
impl Serialize for Double {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_str(special_name(self.0))
        }
    }
}
impl<'de> Deserialize<'de> for Double {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self(FloatRepr::deserialize(deserializer)?.value::<D::Error>()?))
    }
}

/// Component of a vector type: `f64` with large world coordinates, `f32` before.
fn read_real<A: ArchiveReader>(ar: &mut A) -> Result<Double> {
    Ok(if ar.version().large_world_coordinates() {
        ar.read_f64::<LE>()?.into()
    } else {
        (ar.read_f32::<LE>()? as f64).into()
    })
}
fn write_real<A: ArchiveWriter>(ar: &mut A, v: Double) -> Result<()> {
    if ar.version().large_world_coordinates() {
        ar.write_f64::<LE>(v.0)?;
    } else {
        ar.write_f32::<LE>(v.0 as f32)?;
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector2D {
    pub x: Double,
    pub y: Double,
}
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub x: Double,
    pub y: Double,
    pub z: Double,
}
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rotator {
    pub pitch: Double,
    pub yaw: Double,
    pub roll: Double,
}
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: Double,
    pub y: Double,
    pub z: Double,
    pub w: Double,
}
impl Vector2D {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            x: read_real(ar)?,
            y: read_real(ar)?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        write_real(ar, self.x)?;
        write_real(ar, self.y)
    }
}
impl Vector {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            x: read_real(ar)?,
            y: read_real(ar)?,
            z: read_real(ar)?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        write_real(ar, self.x)?;
        write_real(ar, self.y)?;
        write_real(ar, self.z)
    }
}
impl Rotator {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            pitch: read_real(ar)?,
            yaw: read_real(ar)?,
            roll: read_real(ar)?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        write_real(ar, self.pitch)?;
        write_real(ar, self.yaw)?;
        write_real(ar, self.roll)
    }
}
impl Quat {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            x: read_real(ar)?,
            y: read_real(ar)?,
            z: read_real(ar)?,
            w: read_real(ar)?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        write_real(ar, self.x)?;
        write_real(ar, self.y)?;
        write_real(ar, self.z)?;
        write_real(ar, self.w)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vector,
    pub max: Vector,
    pub is_valid: u8,
}
impl BoundingBox {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            min: Vector::read(ar)?,
            max: Vector::read(ar)?,
            is_valid: ar.read_u8()?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        self.min.write(ar)?;
        self.max.write(ar)?;
        ar.write_u8(self.is_valid)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntVector {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntPoint {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearColor {
    pub r: Float,
    pub g: Float,
    pub b: Float,
    pub a: Float,
}
/// 8-bit color, stored in BGRA order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftObjectPath {
    Old {
        asset_path_name: FString,
        sub_path: FString,
    },
    New {
        package_name: FString,
        asset_name: FString,
        sub_path: FString,
    },
}
impl SoftObjectPath {
    pub(crate) fn default_for(version: &dyn VersionInfo) -> Self {
        if version.remove_asset_path_fnames() {
            Self::New {
                package_name: FString::default(),
                asset_name: FString::default(),
                sub_path: FString::default(),
            }
        } else {
            Self::Old {
                asset_path_name: FString::default(),
                sub_path: FString::default(),
            }
        }
    }
    #[instrument(name = "SoftObjectPath_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(if ar.version().remove_asset_path_fnames() {
            Self::New {
                package_name: ar.read_fstring()?,
                asset_name: ar.read_fstring()?,
                sub_path: ar.read_fstring()?,
            }
        } else {
            Self::Old {
                asset_path_name: ar.read_fstring()?,
                sub_path: ar.read_fstring()?,
            }
        })
    }
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        match self {
            Self::Old {
                asset_path_name,
                sub_path,
            } => {
                ar.write_fstring(asset_path_name)?;
                ar.write_fstring(sub_path)?;
            }
            Self::New {
                package_name,
                asset_name,
                sub_path,
            } => {
                ar.write_fstring(package_name)?;
                ar.write_fstring(asset_name)?;
                ar.write_fstring(sub_path)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameplayTagContainer {
    pub tags: Vec<FString>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueNetIdRepl {
    pub inner: Option<UniqueNetIdReplInner>,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueNetIdReplInner {
    pub size: std::num::NonZeroU32,
    pub type_: FString,
    pub contents: FString,
}
impl UniqueNetIdRepl {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let size = ar.read_u32::<LE>()?;
        let inner = match std::num::NonZeroU32::new(size) {
            Some(size) => Some(UniqueNetIdReplInner {
                size,
                type_: ar.read_fstring()?,
                contents: ar.read_fstring()?,
            }),
            None => None,
        };
        Ok(Self { inner })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        match &self.inner {
            Some(inner) => {
                ar.write_u32::<LE>(inner.size.get())?;
                ar.write_fstring(&inner.type_)?;
                ar.write_fstring(&inner.contents)?;
            }
            None => ar.write_u32::<LE>(0)?,
        }
        Ok(())
    }
}

/// Struct type named by a tag. Known engine structs have a fixed binary layout, everything else
/// is either a property list ([`StructType::Struct`]) or natively serialized and kept as raw
/// bytes ([`StructType::Raw`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructType {
    Guid,
    DateTime,
    Timespan,
    Vector2D,
    Vector,
    IntVector,
    Box,
    IntPoint,
    Quat,
    Rotator,
    LinearColor,
    Color,
    SoftObjectPath,
    GameplayTagContainer,
    UniqueNetIdRepl,
    Raw(FString),
    Struct(Option<FString>),
}

const KNOWN: &[(StructType, &str, &str)] = &[
    (StructType::Guid, "Guid", "/Script/CoreUObject.Guid"),
    (StructType::DateTime, "DateTime", "/Script/CoreUObject.DateTime"),
    (StructType::Timespan, "Timespan", "/Script/CoreUObject.Timespan"),
    (StructType::Vector2D, "Vector2D", "/Script/CoreUObject.Vector2D"),
    (StructType::Vector, "Vector", "/Script/CoreUObject.Vector"),
    (StructType::IntVector, "IntVector", "/Script/CoreUObject.IntVector"),
    (StructType::Box, "Box", "/Script/CoreUObject.Box"),
    (StructType::IntPoint, "IntPoint", "/Script/CoreUObject.IntPoint"),
    (StructType::Quat, "Quat", "/Script/CoreUObject.Quat"),
    (StructType::Rotator, "Rotator", "/Script/CoreUObject.Rotator"),
    (StructType::LinearColor, "LinearColor", "/Script/CoreUObject.LinearColor"),
    (StructType::Color, "Color", "/Script/CoreUObject.Color"),
    (StructType::SoftObjectPath, "SoftObjectPath", "/Script/CoreUObject.SoftObjectPath"),
    (
        StructType::GameplayTagContainer,
        "GameplayTagContainer",
        "/Script/GameplayTags.GameplayTagContainer",
    ),
    (StructType::UniqueNetIdRepl, "UniqueNetIdRepl", "/Script/Engine.UniqueNetIdRepl"),
    (StructType::Struct(None), "Struct", "/Script/CoreUObject.Struct"),
];

impl From<&str> for StructType {
    fn from(t: &str) -> Self {
        KNOWN
            .iter()
            .find(|(_, short, _)| *short == t)
            .map(|(st, _, _)| st.clone())
            .unwrap_or_else(|| StructType::Struct(Some(t.into())))
    }
}
impl From<String> for StructType {
    fn from(t: String) -> Self {
        t.as_str().into()
    }
}
impl From<FString> for StructType {
    /// Custom struct names keep their encoding.
    fn from(t: FString) -> Self {
        match StructType::from(t.as_str()) {
            StructType::Struct(Some(_)) => StructType::Struct(Some(t)),
            known => known,
        }
    }
}
impl StructType {
    /// Resolve a full object path from a complete type name. `native` is set when the tag is
    /// flagged as natively serialized.
    pub(crate) fn from_full(t: &str, native: bool) -> Self {
        match KNOWN.iter().find(|(_, _, full)| *full == t) {
            Some((st, _, _)) => st.clone(),
            None if native => StructType::Raw(t.into()),
            None => StructType::Struct(Some(t.into())),
        }
    }
    pub(crate) fn full_str(&self) -> &str {
        match self {
            StructType::Raw(t) | StructType::Struct(Some(t)) => t.as_str(),
            known => KNOWN
                .iter()
                .find(|(st, _, _)| st == known)
                .map_or("/Script/CoreUObject.Struct", |(_, _, full)| full),
        }
    }
    pub fn as_str(&self) -> &str {
        match self {
            StructType::Raw(t) | StructType::Struct(Some(t)) => t.as_str(),
            known => KNOWN
                .iter()
                .find(|(st, _, _)| st == known)
                .map_or("Struct", |(_, short, _)| short),
        }
    }
    pub(crate) fn raw(&self) -> bool {
        matches!(self, StructType::Raw(_))
    }
    /// Whether values of this type are written natively rather than as a property list.
    pub(crate) fn native(&self) -> bool {
        !matches!(self, StructType::Struct(_))
    }
    #[instrument(name = "StructType_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(ar.read_fstring()?.into())
    }
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        match self {
            StructType::Raw(t) | StructType::Struct(Some(t)) => ar.write_fstring(t),
            known => ar.write_string(known.as_str()),
        }
    }
}

/// Decoded body of a struct property or struct element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructValue {
    Guid(FGuid),
    DateTime(u64),
    Timespan(i64),
    Vector2D(Vector2D),
    Vector(Vector),
    IntVector(IntVector),
    Box(BoundingBox),
    IntPoint(IntPoint),
    Quat(Quat),
    Rotator(Rotator),
    LinearColor(LinearColor),
    Color(Color),
    SoftObjectPath(SoftObjectPath),
    GameplayTagContainer(GameplayTagContainer),
    UniqueNetIdRepl(UniqueNetIdRepl),
    /// User defined struct which is simply a list of properties
    Struct(Properties),
}
impl StructValue {
    /// Zero value for a struct type. Natively serialized unknown types have none.
    pub(crate) fn default_for(t: &StructType, version: &dyn VersionInfo) -> Option<Self> {
        Some(match t {
            StructType::Guid => StructValue::Guid(FGuid::nil()),
            StructType::DateTime => StructValue::DateTime(0),
            StructType::Timespan => StructValue::Timespan(0),
            StructType::Vector2D => StructValue::Vector2D(Default::default()),
            StructType::Vector => StructValue::Vector(Default::default()),
            StructType::IntVector => StructValue::IntVector(Default::default()),
            StructType::Box => StructValue::Box(Default::default()),
            StructType::IntPoint => StructValue::IntPoint(Default::default()),
            StructType::Quat => StructValue::Quat(Default::default()),
            StructType::Rotator => StructValue::Rotator(Default::default()),
            StructType::LinearColor => StructValue::LinearColor(Default::default()),
            StructType::Color => StructValue::Color(Default::default()),
            StructType::SoftObjectPath => {
                StructValue::SoftObjectPath(SoftObjectPath::default_for(version))
            }
            StructType::GameplayTagContainer => {
                StructValue::GameplayTagContainer(Default::default())
            }
            StructType::UniqueNetIdRepl => StructValue::UniqueNetIdRepl(Default::default()),
            StructType::Raw(_) => return None,
            StructType::Struct(_) => StructValue::Struct(Properties::default()),
        })
    }
    /// Whether this value has the layout `t` describes.
    pub(crate) fn matches(&self, t: &StructType) -> bool {
        matches!(
            (self, t),
            (StructValue::Guid(_), StructType::Guid)
                | (StructValue::DateTime(_), StructType::DateTime)
                | (StructValue::Timespan(_), StructType::Timespan)
                | (StructValue::Vector2D(_), StructType::Vector2D)
                | (StructValue::Vector(_), StructType::Vector)
                | (StructValue::IntVector(_), StructType::IntVector)
                | (StructValue::Box(_), StructType::Box)
                | (StructValue::IntPoint(_), StructType::IntPoint)
                | (StructValue::Quat(_), StructType::Quat)
                | (StructValue::Rotator(_), StructType::Rotator)
                | (StructValue::LinearColor(_), StructType::LinearColor)
                | (StructValue::Color(_), StructType::Color)
                | (StructValue::SoftObjectPath(_), StructType::SoftObjectPath)
                | (
                    StructValue::GameplayTagContainer(_),
                    StructType::GameplayTagContainer
                )
                | (StructValue::UniqueNetIdRepl(_), StructType::UniqueNetIdRepl)
                | (StructValue::Struct(_), StructType::Struct(_))
        )
    }
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            StructValue::Guid(_) => "Guid",
            StructValue::DateTime(_) => "DateTime",
            StructValue::Timespan(_) => "Timespan",
            StructValue::Vector2D(_) => "Vector2D",
            StructValue::Vector(_) => "Vector",
            StructValue::IntVector(_) => "IntVector",
            StructValue::Box(_) => "Box",
            StructValue::IntPoint(_) => "IntPoint",
            StructValue::Quat(_) => "Quat",
            StructValue::Rotator(_) => "Rotator",
            StructValue::LinearColor(_) => "LinearColor",
            StructValue::Color(_) => "Color",
            StructValue::SoftObjectPath(_) => "SoftObjectPath",
            StructValue::GameplayTagContainer(_) => "GameplayTagContainer",
            StructValue::UniqueNetIdRepl(_) => "UniqueNetIdRepl",
            StructValue::Struct(_) => "Struct",
        }
    }

    #[instrument(name = "StructValue_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A, t: &StructType) -> Result<Self> {
        Ok(match t {
            StructType::Guid => StructValue::Guid(FGuid::read(ar)?),
            StructType::DateTime => StructValue::DateTime(ar.read_u64::<LE>()?),
            StructType::Timespan => StructValue::Timespan(ar.read_i64::<LE>()?),
            StructType::Vector2D => StructValue::Vector2D(Vector2D::read(ar)?),
            StructType::Vector => StructValue::Vector(Vector::read(ar)?),
            StructType::IntVector => StructValue::IntVector(IntVector {
                x: ar.read_i32::<LE>()?,
                y: ar.read_i32::<LE>()?,
                z: ar.read_i32::<LE>()?,
            }),
            StructType::Box => StructValue::Box(BoundingBox::read(ar)?),
            StructType::IntPoint => StructValue::IntPoint(IntPoint {
                x: ar.read_i32::<LE>()?,
                y: ar.read_i32::<LE>()?,
            }),
            StructType::Quat => StructValue::Quat(Quat::read(ar)?),
            StructType::Rotator => StructValue::Rotator(Rotator::read(ar)?),
            StructType::LinearColor => StructValue::LinearColor(LinearColor {
                r: ar.read_f32::<LE>()?.into(),
                g: ar.read_f32::<LE>()?.into(),
                b: ar.read_f32::<LE>()?.into(),
                a: ar.read_f32::<LE>()?.into(),
            }),
            StructType::Color => StructValue::Color(Color {
                b: ar.read_u8()?,
                g: ar.read_u8()?,
                r: ar.read_u8()?,
                a: ar.read_u8()?,
            }),
            StructType::SoftObjectPath => StructValue::SoftObjectPath(SoftObjectPath::read(ar)?),
            StructType::GameplayTagContainer => {
                StructValue::GameplayTagContainer(GameplayTagContainer {
                    tags: read_array(ar.read_u32::<LE>()?, ar, |ar| ar.read_fstring())?,
                })
            }
            StructType::UniqueNetIdRepl => StructValue::UniqueNetIdRepl(UniqueNetIdRepl::read(ar)?),
            StructType::Raw(t) => {
                return Err(Error::UnsupportedVariant(format!(
                    "natively serialized struct {t}"
                )))
            }
            StructType::Struct(_) => StructValue::Struct(read_properties_until_none(ar)?),
        })
    }
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        match self {
            StructValue::Guid(v) => v.write(ar)?,
            StructValue::DateTime(v) => ar.write_u64::<LE>(*v)?,
            StructValue::Timespan(v) => ar.write_i64::<LE>(*v)?,
            StructValue::Vector2D(v) => v.write(ar)?,
            StructValue::Vector(v) => v.write(ar)?,
            StructValue::IntVector(v) => {
                ar.write_i32::<LE>(v.x)?;
                ar.write_i32::<LE>(v.y)?;
                ar.write_i32::<LE>(v.z)?;
            }
            StructValue::Box(v) => v.write(ar)?,
            StructValue::IntPoint(v) => {
                ar.write_i32::<LE>(v.x)?;
                ar.write_i32::<LE>(v.y)?;
            }
            StructValue::Quat(v) => v.write(ar)?,
            StructValue::Rotator(v) => v.write(ar)?,
            StructValue::LinearColor(v) => {
                for c in [v.r, v.g, v.b, v.a] {
                    ar.write_f32::<LE>(c.into())?;
                }
            }
            StructValue::Color(v) => ar.write_all(&[v.b, v.g, v.r, v.a])?,
            StructValue::SoftObjectPath(v) => v.write(ar)?,
            StructValue::GameplayTagContainer(v) => {
                write_len(ar, v.tags.len())?;
                for tag in &v.tags {
                    ar.write_fstring(tag)?;
                }
            }
            StructValue::UniqueNetIdRepl(v) => v.write(ar)?,
            StructValue::Struct(v) => write_properties_none_terminated(ar, v)?,
        }
        Ok(())
    }
}
