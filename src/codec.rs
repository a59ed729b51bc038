//! Byte-exact encoding for the fixed-layout structures exchanged with devices.
//!
//! Every wire structure derives zerocopy's `FromBytes`/`IntoBytes`, so encoding
//! is a plain byte view and decoding copies out of a buffer. Nothing here
//! overlays a structure on live memory.

use std::fmt;
use std::mem::size_of;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U64};

use crate::error::{Result, SmartError};

/// A structure with a fixed, protocol-defined byte layout.
pub trait WireStruct: FromBytes + IntoBytes + Immutable + KnownLayout + Sized {
    /// Name used in `MalformedStructure` errors.
    const NAME: &'static str;
    const SIZE: usize = size_of::<Self>();

    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Decodes from the start of `bytes`. Trailing bytes are ignored.
    fn decode(bytes: &[u8]) -> Result<Self> {
        Self::read_from_prefix(bytes)
            .map(|(value, _rest)| value)
            .map_err(|_| SmartError::MalformedStructure {
                structure: Self::NAME,
                expected: Self::SIZE,
                actual: bytes.len(),
            })
    }
}

/// Unsigned 128-bit little-endian counter, stored as two 64-bit halves.
#[repr(C)]
#[derive(Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct U128Le {
    low: U64<LE>,
    high: U64<LE>,
}

impl U128Le {
    pub fn new(value: u128) -> Self {
        Self {
            low: U64::new(value as u64),
            high: U64::new((value >> 64) as u64),
        }
    }

    pub fn get(&self) -> u128 {
        (u128::from(self.high.get()) << 64) | u128::from(self.low.get())
    }

    /// The counter clamped to `u64::MAX`.
    pub fn saturating_u64(&self) -> u64 {
        u64::try_from(self.get()).unwrap_or(u64::MAX)
    }
}

impl fmt::Debug for U128Le {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl fmt::Display for U128Le {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Exposes a fixed-width text field: trailing spaces and NULs are dropped.
pub fn trim_text(field: &[u8]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |i| i + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// A single decoded field, as exposed by [`FieldTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Flag(bool),
    Unsigned(u128),
    List(Vec<u128>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Flag(v) => write!(f, "{v}"),
            FieldValue::Unsigned(v) => write!(f, "{v}"),
            FieldValue::List(values) => {
                let parts: Vec<String> = values.iter().map(u128::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Structures that can list their fields by name, reserved regions omitted.
pub trait FieldTable {
    fn fields(&self) -> Vec<(&'static str, FieldValue)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_spaces_and_nuls() {
        let mut field = [b' '; 20];
        field[..6].copy_from_slice(b"ABC123");
        field[15..].fill(0);
        assert_eq!(trim_text(&field), "ABC123");
    }

    #[test]
    fn keeps_leading_and_inner_spaces() {
        assert_eq!(trim_text(b" SN 01 \0\0"), " SN 01");
        assert_eq!(trim_text(&[0u8; 8]), "");
    }

    #[test]
    fn u128_halves_are_little_endian() {
        let value = U128Le::new((7u128 << 64) | 0x1122);
        let bytes = value.as_bytes();
        assert_eq!(&bytes[..2], &[0x22, 0x11]);
        assert_eq!(bytes[8], 7);
        assert_eq!(value.get(), (7u128 << 64) | 0x1122);
        assert_eq!(value.saturating_u64(), u64::MAX);
        assert_eq!(U128Le::new(42).saturating_u64(), 42);
    }

    #[test]
    fn field_value_display() {
        assert_eq!(FieldValue::List(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(FieldValue::Flag(true).to_string(), "true");
    }
}
