use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};

use crate::{error::Error, Result};

/// Length-prefixed engine string.
///
/// A positive prefix means `n` single-byte characters, a negative prefix means
/// `-n` UTF-16 code units, both counts including the terminator. The encoding
/// and any bytes that follow the text inside the declared length are kept so
/// the string re-encodes exactly as it was read.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FString {
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub wide: bool,
    /// Bytes after the text when they differ from what [`FString::new`] would emit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<Vec<u8>>,
}

impl FString {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            wide: !value.is_ascii(),
            value,
            tail: None,
        }
    }
    pub fn as_str(&self) -> &str {
        &self.value
    }
    /// Replace the text, keeping the original encoding when it can still hold it.
    pub fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.tail = None;
        if !self.wide && !is_latin1(&self.value) {
            self.wide = true;
        }
    }

    pub(crate) fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let len = r.read_i32::<LE>()?;
        if len == 0 {
            return Ok(Self {
                value: String::new(),
                wide: false,
                tail: Some(vec![]),
            });
        }
        if len < 0 {
            let bytes = read_bytes(r, len.unsigned_abs() as usize * 2)?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
            let value = String::from_utf16(&units[..end])
                .map_err(|_| Error::UnsupportedVariant("unpaired surrogate in string".into()))?;
            let rest = &bytes[end * 2..];
            Ok(Self {
                value,
                wide: true,
                tail: (end == 0 || rest != [0, 0]).then(|| rest.to_vec()),
            })
        } else {
            let bytes = read_bytes(r, len as usize)?;
            let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
            let rest = &bytes[end..];
            Ok(Self {
                value: bytes[..end].iter().map(|&b| b as char).collect(),
                wide: false,
                tail: (end == 0 || rest != [0]).then(|| rest.to_vec()),
            })
        }
    }

    pub(crate) fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let wide = self.wide || !is_latin1(&self.value);
        // a tail recorded for the other encoding no longer lines up with the text
        let tail = self.tail.as_deref().filter(|_| wide == self.wide);
        if wide {
            let units: Vec<u16> = self.value.encode_utf16().collect();
            let tail = tail.unwrap_or(&[0, 0]);
            if tail.len() % 2 != 0 {
                return Err(Error::InvalidData(format!(
                    "UTF-16 string {:?} has an odd-length tail",
                    self.value
                )));
            }
            let count = units.len() + tail.len() / 2;
            w.write_i32::<LE>(-prefix(count)?)?;
            for c in units {
                w.write_u16::<LE>(c)?;
            }
            w.write_all(tail)?;
        } else {
            let tail: &[u8] = match tail {
                Some(tail) => tail,
                None if self.value.is_empty() => &[],
                None => &[0],
            };
            let count = self.value.chars().count() + tail.len();
            w.write_i32::<LE>(prefix(count)?)?;
            let bytes: Vec<u8> = self.value.chars().map(|c| c as u8).collect();
            w.write_all(&bytes)?;
            w.write_all(tail)?;
        }
        Ok(())
    }
}

fn prefix(count: usize) -> Result<i32> {
    i32::try_from(count).map_err(|_| Error::InvalidData(format!("string of {count} units")))
}

fn is_latin1(s: &str) -> bool {
    s.chars().all(|c| (c as u32) <= 0xff)
}

/// Read exactly `len` bytes without trusting `len` for the allocation up front.
pub(crate) fn read_bytes<R: Read + ?Sized>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(Error::TruncatedData);
    }
    Ok(buf)
}

impl std::fmt::Display for FString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}
impl From<&str> for FString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
impl From<String> for FString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
impl PartialEq<str> for FString {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}
impl PartialEq<&str> for FString {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}
impl PartialEq<FString> for str {
    fn eq(&self, other: &FString) -> bool {
        self == other.value
    }
}
impl PartialEq<FString> for &str {
    fn eq(&self, other: &FString) -> bool {
        *self == other.value
    }
}
