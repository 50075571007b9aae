/// Server id of the database host server, carried in every header
pub const DATABASE_SERVER_ID: u16 = 0xE004;

/// Header length in bytes
pub const HEADER_LENGTH: usize = 20;

/// Template length in bytes, identical for requests and replies
pub const TEMPLATE_LENGTH: usize = 20;

/// Offset of the first optional field
pub const VARIABLE_DATA_OFFSET: usize = HEADER_LENGTH + TEMPLATE_LENGTH;

/// `(length u32, code point u16)` prefix of every optional field
pub const FIELD_HEADER_LENGTH: usize = 6;

/// Reserved template bit marking a compressed variable-data region
pub const RESERVED_COMPRESSED: u32 = 0x4000_0000;

/// Code point identifying the RLE compression scheme
pub const RLE_SCHEME: u16 = 0x3832;

/// `LL u32 | CP u16 | decompressed length u32`
pub const COMPRESSION_HEADER_LENGTH: usize = 10;

/// Smallest variable-data region for which request compression is attempted
pub const COMPRESSION_THRESHOLD: usize = 1064;

/// Request operation ids
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationId {
    PrepareDescribe = 0x1803,
    Execute = 0x1805,
    CloseCursor = 0x180A,
    Fetch = 0x180B,
    OpenDescribeFetch = 0x180E,
    Reply = 0x2800,
}

impl OperationId {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1803 => Some(Self::PrepareDescribe),
            0x1805 => Some(Self::Execute),
            0x180A => Some(Self::CloseCursor),
            0x180B => Some(Self::Fetch),
            0x180E => Some(Self::OpenDescribeFetch),
            0x2800 => Some(Self::Reply),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Operation-result bitmap: which reply sections the client asks for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OrsBitmap: u32 {
        const SEND_REPLY_IMMEDIATELY = 0x8000_0000;
        const MESSAGE_ID = 0x4000_0000;
        const FIRST_LEVEL_TEXT = 0x2000_0000;
        const SECOND_LEVEL_TEXT = 0x1000_0000;
        const DATA_FORMAT = 0x0800_0000;
        const RESULT_DATA = 0x0400_0000;
        const SQLCA = 0x0200_0000;
        const SERVER_ATTRIBUTES = 0x0100_0000;
        const PACKAGE_INFO = 0x0010_0000;
        const EXTENDED_COLUMN_DESCRIPTORS = 0x0002_0000;
        const CURSOR_ATTRIBUTES = 0x0000_8000;
        const REPLY_RLE_COMPRESSION = 0x0000_4000;
    }
}

/// Code points of request parameters
pub mod request_cp {
    pub const LIBRARY_NAME: u16 = 0x3801;
    pub const STATEMENT_TEXT: u16 = 0x3807;
    pub const CURSOR_NAME: u16 = 0x380B;
    pub const BLOCKING_FACTOR: u16 = 0x380C;
    pub const SCROLL_ORIENTATION: u16 = 0x380E;
    pub const LIBRARY_LIST: u16 = 0x3813;
    pub const VARIABLE_FIELD_COMPRESSION: u16 = 0x3833;
    pub const FETCH_BUFFER_SIZE: u16 = 0x3834;
}

/// Code points of reply sections
pub mod reply_cp {
    pub const MESSAGE_ID: u16 = 0x3801;
    pub const FIRST_LEVEL_TEXT: u16 = 0x3802;
    pub const SECOND_LEVEL_TEXT: u16 = 0x3803;
    pub const SERVER_ATTRIBUTES: u16 = 0x3804;
    pub const DATA_FORMAT: u16 = 0x3805;
    pub const RESULT_DATA: u16 = 0x3806;
    pub const SQLCA: u16 = 0x3807;
    pub const PACKAGE_INFO: u16 = 0x380B;
    pub const VARIABLE_RESULT_DATA: u16 = 0x380E;
    pub const LOB_DATA: u16 = 0x380F;
    pub const CURSOR_ATTRIBUTES: u16 = 0x3810;
    pub const EXTENDED_COLUMN_DESCRIPTORS: u16 = 0x3811;
    pub const ARRAY_RESULT_DATA: u16 = 0x3813;
}

/// `(error class, return code)` pairs with protocol meaning on a fetch reply
pub mod sentinel {
    /// No more rows in the requested direction
    pub const END_OF_DATA: (u16, i32) = (2, 700);
    /// Scroll position out of range, same meaning as `END_OF_DATA`
    pub const END_OF_SCROLL: (u16, i32) = (2, 701);
    /// The server-side cursor is not open
    pub const CURSOR_CLOSED: (u16, i32) = (2, -501);
}

/// Value of the variable-field-compression request parameter (EBCDIC 'Y')
pub const VARIABLE_FIELD_COMPRESSION_ON: u8 = 0xE8;

bitflags::bitflags! {
    /// Cursor attribute bitfield returned by the host
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CursorAttributes: u32 {
        const SCROLLABLE = 0x8000_0000;
        const SENSITIVE = 0x4000_0000;
        const UPDATABLE = 0x2000_0000;
        const HOLDABLE = 0x1000_0000;
    }
}

bitflags::bitflags! {
    /// Flags byte of a field descriptor
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u8 {
        const ARRAY_ELEMENT = 0x80;
        const LOB_LOCATOR = 0x40;
    }
}

/// Parameter direction of a field descriptor
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input = 0xF0,
    Output = 0xF1,
    InputOutput = 0xF2,
}

impl Direction {
    /// Result-set fields carry 0x00; they behave as output fields
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xF0 => Some(Self::Input),
            0x00 | 0xF1 => Some(Self::Output),
            0xF2 => Some(Self::InputOutput),
            _ => None,
        }
    }

    pub fn is_output(self) -> bool {
        !matches!(self, Self::Input)
    }
}

/// Host SQL type codes, without the nullable bit
#[allow(non_camel_case_types)]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    DATE = 384,
    TIME = 388,
    TIMESTAMP = 392,
    VARCHAR = 448,
    CHAR = 452,
    LONG_VARCHAR = 456,
    VARGRAPHIC = 464,
    GRAPHIC = 468,
    LONG_VARGRAPHIC = 472,
    FLOAT = 480,
    DECIMAL = 484,
    NUMERIC = 488,
    BIGINT = 492,
    INTEGER = 496,
    SMALLINT = 500,
    ROWID = 904,
    VARBINARY = 908,
    BINARY = 912,
    BLOB_LOCATOR = 960,
    CLOB_LOCATOR = 964,
    DBCLOB_LOCATOR = 968,
}

impl SqlType {
    /// Decode a wire type code, ignoring the nullable bit
    pub fn from_u16(value: u16) -> Option<Self> {
        match value & !1 {
            384 => Some(Self::DATE),
            388 => Some(Self::TIME),
            392 => Some(Self::TIMESTAMP),
            448 => Some(Self::VARCHAR),
            452 => Some(Self::CHAR),
            456 => Some(Self::LONG_VARCHAR),
            464 => Some(Self::VARGRAPHIC),
            468 => Some(Self::GRAPHIC),
            472 => Some(Self::LONG_VARGRAPHIC),
            480 => Some(Self::FLOAT),
            484 => Some(Self::DECIMAL),
            488 => Some(Self::NUMERIC),
            492 => Some(Self::BIGINT),
            496 => Some(Self::INTEGER),
            500 => Some(Self::SMALLINT),
            904 => Some(Self::ROWID),
            908 => Some(Self::VARBINARY),
            912 => Some(Self::BINARY),
            960 => Some(Self::BLOB_LOCATOR),
            964 => Some(Self::CLOB_LOCATOR),
            968 => Some(Self::DBCLOB_LOCATOR),
            _ => None,
        }
    }

    /// Types whose wire value starts with a 2-byte length prefix
    pub fn is_varying(self) -> bool {
        matches!(
            self,
            Self::VARCHAR
                | Self::LONG_VARCHAR
                | Self::VARGRAPHIC
                | Self::LONG_VARGRAPHIC
                | Self::VARBINARY
                | Self::ROWID
        )
    }

    /// Bytes per unit counted by the length prefix
    pub fn prefix_unit(self) -> usize {
        match self {
            Self::VARGRAPHIC | Self::LONG_VARGRAPHIC => 2,
            _ => 1,
        }
    }
}

/// Binary CCSID: character data is not converted
pub const CCSID_BINARY: u16 = 65535;

pub const CCSID_UTF8: u16 = 1208;

pub const CCSID_UTF16: u16 = 1200;

pub const CCSID_UCS2: u16 = 13488;
