use crate::constant::{Direction, FieldFlags, SqlType};
use crate::error::{Error, Result};

/// Field descriptor from a data-format section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Raw wire type code, low bit set when nullable
    pub type_code: u16,
    /// Static byte length, including the prefix of varying types
    pub length: u32,
    pub scale: u16,
    pub precision: u16,
    pub ccsid: u16,
    pub direction: Direction,
    pub flags: FieldFlags,
    pub lob_locator: Option<u32>,
    pub lob_max_size: u32,
}

impl FieldDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        type_code: u16,
        length: u32,
        scale: u16,
        precision: u16,
        ccsid: u16,
        direction: Direction,
        flags: FieldFlags,
    ) -> Self {
        Self {
            name,
            type_code,
            length,
            scale,
            precision,
            ccsid,
            direction,
            flags,
            lob_locator: None,
            lob_max_size: 0,
        }
    }

    pub fn sql_type(&self) -> Result<SqlType> {
        SqlType::from_u16(self.type_code).ok_or(Error::UnsupportedSqlType(self.type_code))
    }

    pub fn is_nullable(&self) -> bool {
        self.type_code & 1 == 1
    }

    pub fn is_output(&self) -> bool {
        self.direction.is_output()
    }

    pub fn is_array_element(&self) -> bool {
        self.flags.contains(FieldFlags::ARRAY_ELEMENT)
    }

    pub fn static_length(&self) -> usize {
        self.length as usize
    }
}
