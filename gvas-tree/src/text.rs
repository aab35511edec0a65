use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    archive::{read_array, write_len, ArchiveReader, ArchiveWriter},
    error::Error,
    fstring::FString,
    Result,
};

/// Localizable text value. Only the history kinds below are decoded; a property holding any
/// other kind is kept as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    pub flags: u32,
    pub history: TextHistory,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextHistory {
    // -0x1
    None {
        culture_invariant: Vec<FString>,
    },
    // 0x0
    Base {
        namespace: FString,
        key: FString,
        source_string: FString,
    },
    // 0x7
    AsDate {
        source_date_time: u64,
        date_style: i8,
        time_zone: FString,
        culture_name: FString,
    },
    // 0x9
    AsDateTime {
        ticks: i64,
        date_style: i8,
        time_style: i8,
        time_zone: FString,
        culture_name: FString,
    },
    // 0xb
    StringTableEntry {
        table: FString,
        key: FString,
    },
}
impl Default for Text {
    fn default() -> Self {
        Self {
            flags: 0,
            history: TextHistory::None {
                culture_invariant: vec![],
            },
        }
    }
}

impl Text {
    #[instrument(name = "Text_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let flags = ar.read_u32::<LE>()?;
        let history_type = ar.read_i8()?;
        let history = match history_type {
            -0x1 => TextHistory::None {
                culture_invariant: read_array(ar.read_u32::<LE>()?, ar, |ar| ar.read_fstring())?,
            },
            0x0 => TextHistory::Base {
                namespace: ar.read_fstring()?,
                key: ar.read_fstring()?,
                source_string: ar.read_fstring()?,
            },
            0x7 => TextHistory::AsDate {
                source_date_time: ar.read_u64::<LE>()?,
                date_style: ar.read_i8()?,
                time_zone: ar.read_fstring()?,
                culture_name: ar.read_fstring()?,
            },
            0x9 => TextHistory::AsDateTime {
                ticks: ar.read_i64::<LE>()?,
                date_style: ar.read_i8()?,
                time_style: ar.read_i8()?,
                time_zone: ar.read_fstring()?,
                culture_name: ar.read_fstring()?,
            },
            0xb => TextHistory::StringTableEntry {
                table: ar.read_fstring()?,
                key: ar.read_fstring()?,
            },
            _ => {
                return Err(Error::UnsupportedVariant(format!(
                    "text history type {history_type:#x}"
                )))
            }
        };
        Ok(Self { flags, history })
    }
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_u32::<LE>(self.flags)?;
        match &self.history {
            TextHistory::None { culture_invariant } => {
                ar.write_i8(-0x1)?;
                write_len(ar, culture_invariant.len())?;
                for s in culture_invariant {
                    ar.write_fstring(s)?;
                }
            }
            TextHistory::Base {
                namespace,
                key,
                source_string,
            } => {
                ar.write_i8(0x0)?;
                ar.write_fstring(namespace)?;
                ar.write_fstring(key)?;
                ar.write_fstring(source_string)?;
            }
            TextHistory::AsDate {
                source_date_time,
                date_style,
                time_zone,
                culture_name,
            } => {
                ar.write_i8(0x7)?;
                ar.write_u64::<LE>(*source_date_time)?;
                ar.write_i8(*date_style)?;
                ar.write_fstring(time_zone)?;
                ar.write_fstring(culture_name)?;
            }
            TextHistory::AsDateTime {
                ticks,
                date_style,
                time_style,
                time_zone,
                culture_name,
            } => {
                ar.write_i8(0x9)?;
                ar.write_i64::<LE>(*ticks)?;
                ar.write_i8(*date_style)?;
                ar.write_i8(*time_style)?;
                ar.write_fstring(time_zone)?;
                ar.write_fstring(culture_name)?;
            }
            TextHistory::StringTableEntry { table, key } => {
                ar.write_i8(0xb)?;
                ar.write_fstring(table)?;
                ar.write_fstring(key)?;
            }
        }
        Ok(())
    }
}
