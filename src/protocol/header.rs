use zerocopy::byteorder::big_endian::{I32 as I32BE, U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::constant::{
    DATABASE_SERVER_ID, HEADER_LENGTH, OperationId, OrsBitmap, RESERVED_COMPRESSED,
    TEMPLATE_LENGTH, VARIABLE_DATA_OFFSET,
};
use crate::error::{Error, Result};

/// Frame header (zero-copy)
///
/// Layout, all big-endian:
/// - total_length: 4 bytes, whole frame including this header
/// - header_id: 2 bytes
/// - server_id: 2 bytes
/// - instance_id: 4 bytes
/// - correlation_id: 4 bytes
/// - template_length: 2 bytes
/// - operation_id: 2 bytes
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct FrameHeader {
    pub total_length: U32BE,
    pub header_id: U16BE,
    pub server_id: U16BE,
    pub instance_id: U32BE,
    pub correlation_id: U32BE,
    pub template_length: U16BE,
    pub operation_id: U16BE,
}

impl FrameHeader {
    pub fn new(operation: OperationId) -> Self {
        Self {
            total_length: U32BE::new(VARIABLE_DATA_OFFSET as u32),
            header_id: U16BE::new(0),
            server_id: U16BE::new(DATABASE_SERVER_ID),
            instance_id: U32BE::new(0),
            correlation_id: U32BE::new(0),
            template_length: U16BE::new(TEMPLATE_LENGTH as u16),
            operation_id: U16BE::new(operation as u16),
        }
    }

    pub fn total_length(&self) -> usize {
        self.total_length.get() as usize
    }

    pub fn correlation_id(&self) -> u32 {
        self.correlation_id.get()
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        if data.len() < HEADER_LENGTH {
            return Err(Error::UnexpectedEof);
        }
        Self::ref_from_bytes(&data[..HEADER_LENGTH]).map_err(Error::from_debug)
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        if data.len() < HEADER_LENGTH {
            return Err(Error::UnexpectedEof);
        }
        Self::mut_from_bytes(&mut data[..HEADER_LENGTH]).map_err(Error::from_debug)
    }
}

/// Request template (zero-copy), follows the header
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct RequestTemplate {
    pub ors_bitmap: U32BE,
    pub reserved: U32BE,
    pub return_ors_handle: U16BE,
    pub fill_ors_handle: U16BE,
    pub based_on_ors_handle: U16BE,
    pub rpb_handle: U16BE,
    pub pmd_handle: U16BE,
    pub parameter_count: U16BE,
}

impl RequestTemplate {
    pub fn new() -> Self {
        Self::new_zeroed()
    }

    pub fn ors_bitmap(&self) -> OrsBitmap {
        OrsBitmap::from_bits_retain(self.ors_bitmap.get())
    }

    pub fn is_compressed(&self) -> bool {
        self.reserved.get() & RESERVED_COMPRESSED != 0
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        let reserved = self.reserved.get();
        let reserved = if compressed {
            reserved | RESERVED_COMPRESSED
        } else {
            reserved & !RESERVED_COMPRESSED
        };
        self.reserved.set(reserved);
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        let template = data
            .get(HEADER_LENGTH..VARIABLE_DATA_OFFSET)
            .ok_or(Error::UnexpectedEof)?;
        Self::ref_from_bytes(template).map_err(Error::from_debug)
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        let template = data
            .get_mut(HEADER_LENGTH..VARIABLE_DATA_OFFSET)
            .ok_or(Error::UnexpectedEof)?;
        Self::mut_from_bytes(template).map_err(Error::from_debug)
    }
}

impl Default for RequestTemplate {
    fn default() -> Self {
        Self::new()
    }
}

/// Reply template (zero-copy), follows the header
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct ReplyTemplate {
    pub ors_bitmap: U32BE,
    pub reserved: U32BE,
    pub function_id: U16BE,
    pub return_ors_handle: U16BE,
    pub reserved2: U16BE,
    pub error_class: U16BE,
    pub return_code: I32BE,
}

impl ReplyTemplate {
    pub fn error_class(&self) -> u16 {
        self.error_class.get()
    }

    pub fn return_code(&self) -> i32 {
        self.return_code.get()
    }

    pub fn is_compressed(&self) -> bool {
        self.reserved.get() & RESERVED_COMPRESSED != 0
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        let template = data
            .get(HEADER_LENGTH..VARIABLE_DATA_OFFSET)
            .ok_or(Error::UnexpectedEof)?;
        Self::ref_from_bytes(template).map_err(Error::from_debug)
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        let template = data
            .get_mut(HEADER_LENGTH..VARIABLE_DATA_OFFSET)
            .ok_or(Error::UnexpectedEof)?;
        Self::mut_from_bytes(template).map_err(Error::from_debug)
    }
}
