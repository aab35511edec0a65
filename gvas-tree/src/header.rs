use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::{
    archive::{read_array, write_len, ArchiveReader, ArchiveWriter},
    fstring::FString,
    structs::FGuid,
    Result,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVersion {
    pub id: FGuid,
    pub value: i32,
}

/// Custom version table: a format number and `(GUID, version)` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVersions {
    pub format: u32,
    pub entries: Vec<CustomVersion>,
}
impl CustomVersions {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let format = ar.read_u32::<LE>()?;
        let count = ar.read_u32::<LE>()?;
        let entries = read_array(count, ar, |ar| {
            Ok(CustomVersion {
                id: FGuid::read(ar)?,
                value: ar.read_i32::<LE>()?,
            })
        })?;
        Ok(Self { format, entries })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_u32::<LE>(self.format)?;
        write_len(ar, self.entries.len())?;
        for CustomVersion { id, value } in &self.entries {
            id.write(ar)?;
            ar.write_i32::<LE>(*value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub ue4: u32,
    pub ue5: Option<u32>,
}

/// Engine build that wrote the save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u32,
    pub branch: FString,
}
impl EngineVersion {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            major: ar.read_u16::<LE>()?,
            minor: ar.read_u16::<LE>()?,
            patch: ar.read_u16::<LE>()?,
            build: ar.read_u32::<LE>()?,
            branch: ar.read_fstring()?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        for v in [self.major, self.minor, self.patch] {
            ar.write_u16::<LE>(v)?;
        }
        ar.write_u32::<LE>(self.build)?;
        ar.write_fstring(&self.branch)
    }
    fn at_least(&self, major: u16, minor: u16) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

/// Layout switches that depend on the engine and package versions in the header.
pub trait VersionInfo {
    /// `(major, minor)` engine version
    fn engine(&self) -> (u16, u16);
    /// UE5 package version, 0 for UE4 saves
    fn package_ue5(&self) -> u32;

    /// Vector components are `f64` (large world coordinates)
    fn large_world_coordinates(&self) -> bool {
        self.engine().0 >= 5
    }
    /// Tags carry a complete type name tree
    fn property_tag(&self) -> bool {
        self.engine() >= (5, 4)
    }
    /// Legacy tags end with an optional property GUID
    fn property_guid(&self) -> bool {
        self.engine() >= (4, 12)
    }
    /// Legacy struct arrays start with one shared element tag
    fn array_inner_tag(&self) -> bool {
        self.engine() >= (4, 12)
    }
    /// Soft object paths are written as a package/asset pair without an FName
    fn remove_asset_path_fnames(&self) -> bool {
        self.package_ue5() >= 1007
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub magic: u32,
    pub save_game_version: u32,
    pub package_version: PackageVersion,
    pub engine_version: EngineVersion,
    /// Present from engine 4.12 on
    pub custom_versions: Option<CustomVersions>,
}
impl VersionInfo for Header {
    fn engine(&self) -> (u16, u16) {
        (self.engine_version.major, self.engine_version.minor)
    }
    fn package_ue5(&self) -> u32 {
        self.package_version.ue5.unwrap_or(0)
    }
}
impl Header {
    pub const MAGIC: u32 = u32::from_le_bytes(*b"GVAS");

    /// Whether a save game version is followed by a UE5 package version. 34 is written by at
    /// least one title without one.
    fn has_ue5_version(save_game_version: u32) -> bool {
        save_game_version >= 3 && save_game_version != 34
    }

    #[instrument(name = "Header_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let magic = ar.read_u32::<LE>()?;
        if magic != Self::MAGIC {
            let bytes = magic.to_le_bytes();
            warn!(
                "unexpected magic {bytes:02x?} ({:?}), reading on",
                String::from_utf8_lossy(&bytes)
            );
        }
        let save_game_version = ar.read_u32::<LE>()?;
        let ue4 = ar.read_u32::<LE>()?;
        let ue5 = if Self::has_ue5_version(save_game_version) {
            Some(ar.read_u32::<LE>()?)
        } else {
            None
        };
        let engine_version = EngineVersion::read(ar)?;
        let custom_versions = if engine_version.at_least(4, 12) {
            Some(CustomVersions::read(ar)?)
        } else {
            None
        };
        Ok(Header {
            magic,
            save_game_version,
            package_version: PackageVersion { ue4, ue5 },
            engine_version,
            custom_versions,
        })
    }
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        for v in [self.magic, self.save_game_version, self.package_version.ue4] {
            ar.write_u32::<LE>(v)?;
        }
        if let Some(ue5) = self.package_version.ue5 {
            ar.write_u32::<LE>(ue5)?;
        }
        self.engine_version.write(ar)?;
        if let Some(custom) = &self.custom_versions {
            custom.write(ar)?;
        }
        Ok(())
    }
}
