use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};

pub const SQLCA_LENGTH: usize = 136;

/// SQL communication area (zero-copy)
///
/// Character members are in the host job CCSID. Only SQLSTATE is decoded
/// here; it is restricted to digits and upper-case letters.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct Sqlca {
    pub sqlcaid: [u8; 8],
    pub sqlcabc: I32BE,
    pub sqlcode: I32BE,
    pub sqlerrml: I16BE,
    pub sqlerrmc: [u8; 70],
    pub sqlerrp: [u8; 8],
    pub sqlerrd: [I32BE; 6],
    pub sqlwarn: [u8; 11],
    pub sqlstate: [u8; 5],
}

impl Sqlca {
    pub fn from_bytes(payload: &[u8]) -> Result<&Self> {
        let bytes = payload.get(..SQLCA_LENGTH).ok_or(Error::UnexpectedEof)?;
        Self::ref_from_bytes(bytes).map_err(Error::from_debug)
    }

    pub fn sqlcode(&self) -> i32 {
        self.sqlcode.get()
    }

    pub fn sqlstate(&self) -> String {
        self.sqlstate.iter().map(|&b| invariant_char(b)).collect()
    }

    /// Number of rows the last fetch returned
    pub fn rows_fetched(&self) -> i32 {
        self.sqlerrd[2].get()
    }

    /// Message tokens, `sqlerrml` bytes of `sqlerrmc`
    pub fn message_tokens(&self) -> &[u8] {
        let len = (self.sqlerrml.get().max(0) as usize).min(self.sqlerrmc.len());
        &self.sqlerrmc[..len]
    }

    /// `sqlwarn[0]` is set when any other warning flag is set
    pub fn has_warning(&self) -> bool {
        !matches!(invariant_char(self.sqlwarn[0]), ' ' | '\0')
    }
}

/// Map one SQLSTATE byte from either EBCDIC or ASCII
fn invariant_char(b: u8) -> char {
    match b {
        0xF0..=0xF9 => (b'0' + (b - 0xF0)) as char,
        0xC1..=0xC9 => (b'A' + (b - 0xC1)) as char,
        0xD1..=0xD9 => (b'J' + (b - 0xD1)) as char,
        0xE2..=0xE9 => (b'S' + (b - 0xE2)) as char,
        0x40 => ' ',
        _ if b.is_ascii() => b as char,
        _ => '?',
    }
}
