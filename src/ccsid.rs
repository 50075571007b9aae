//! Character converters keyed by CCSID.
//!
//! The session owns the converter table; frames and rows only borrow it to
//! turn host character data into `String`s and back.

use std::collections::HashMap;
use std::sync::Arc;

use auto_impl::auto_impl;

use crate::constant::{CCSID_UCS2, CCSID_UTF8, CCSID_UTF16};
use crate::error::{Error, Result, eyre};

#[auto_impl(&, Arc, Box)]
pub trait CharConverter: Send + Sync {
    fn ccsid(&self) -> u16;

    /// Encode a client string into host bytes
    fn to_host(&self, text: &str) -> Vec<u8>;

    /// Decode host bytes into a client string
    fn from_host(&self, bytes: &[u8]) -> Result<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Converter;

impl CharConverter for Utf8Converter {
    fn ccsid(&self) -> u16 {
        CCSID_UTF8
    }

    fn to_host(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn from_host(&self, bytes: &[u8]) -> Result<String> {
        let text = simdutf8::basic::from_utf8(bytes)
            .map_err(|e| Error::LibraryBug(eyre!("invalid UTF-8 from host: {}", e)))?;
        Ok(text.to_owned())
    }
}

/// Big-endian UTF-16, also used for UCS-2 (13488)
#[derive(Debug, Clone, Copy)]
pub struct Utf16Converter {
    ccsid: u16,
}

impl Utf16Converter {
    pub fn new(ccsid: u16) -> Self {
        Self { ccsid }
    }
}

impl CharConverter for Utf16Converter {
    fn ccsid(&self) -> u16 {
        self.ccsid
    }

    fn to_host(&self, text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_be_bytes).collect()
    }

    fn from_host(&self, bytes: &[u8]) -> Result<String> {
        if bytes.len() % 2 != 0 {
            return Err(Error::InvalidPacket);
        }
        let units = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        char::decode_utf16(units)
            .map(|c| c.map_err(|e| Error::LibraryBug(eyre!("invalid UTF-16 from host: {}", e))))
            .collect()
    }
}

/// CCSID to converter lookup
#[derive(Clone)]
pub struct ConverterTable {
    converters: HashMap<u16, Arc<dyn CharConverter>>,
}

impl ConverterTable {
    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    pub fn register(&mut self, converter: Arc<dyn CharConverter>) {
        self.converters.insert(converter.ccsid(), converter);
    }

    pub fn get(&self, ccsid: u16) -> Result<&dyn CharConverter> {
        self.converters
            .get(&ccsid)
            .map(|c| c.as_ref())
            .ok_or(Error::UnsupportedCcsid(ccsid))
    }

    pub fn decode(&self, ccsid: u16, bytes: &[u8]) -> Result<String> {
        self.get(ccsid)?.from_host(bytes)
    }
}

impl Default for ConverterTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.register(Arc::new(Utf8Converter));
        table.register(Arc::new(Utf16Converter::new(CCSID_UTF16)));
        table.register(Arc::new(Utf16Converter::new(CCSID_UCS2)));
        table
    }
}

impl std::fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ccsids: Vec<_> = self.converters.keys().copied().collect();
        ccsids.sort_unstable();
        f.debug_struct("ConverterTable")
            .field("ccsids", &ccsids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16_round_trip() {
        let conv = Utf16Converter::new(CCSID_UCS2);
        let bytes = conv.to_host("Ab");
        assert_eq!(bytes, [0, b'A', 0, b'b']);
        assert_eq!(conv.from_host(&bytes).unwrap(), "Ab");
    }

    #[test]
    fn test_utf16_odd_length() {
        let conv = Utf16Converter::new(CCSID_UTF16);
        assert!(matches!(conv.from_host(&[0, 1, 2]), Err(Error::InvalidPacket)));
    }

    #[test]
    fn test_table_lookup() {
        let table = ConverterTable::default();
        assert_eq!(table.decode(CCSID_UTF8, b"lib").unwrap(), "lib");
        assert!(matches!(table.get(37), Err(Error::UnsupportedCcsid(37))));
    }
}
