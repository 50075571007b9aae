use zerocopy::byteorder::big_endian::{U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::ccsid::ConverterTable;
use crate::col::FieldDescriptor;
use crate::constant::{Direction, FieldFlags};
use crate::error::{Error, Result, eyre};
use crate::protocol::primitive::{read_int_2, read_int_4, read_string_fix};

/// Data-format header (zero-copy)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct DataFormatHeader {
    pub consistency_token: U32BE,
    pub field_count: U32BE,
    pub reserved: U32BE,
    pub record_size: U32BE,
}

/// Fixed part of one field descriptor (zero-copy), followed by the name
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct FieldDescriptorBytes {
    pub descriptor_length: U32BE,
    pub sql_type: U16BE,
    pub length: U32BE,
    pub scale: U16BE,
    pub precision: U16BE,
    pub ccsid: U16BE,
    pub direction: u8,
    pub flags: u8,
    pub lob_locator: U32BE,
    pub lob_max_size: U32BE,
    pub name_ccsid: U16BE,
    pub reserved: U16BE,
    pub name_length: U16BE,
}

pub const DATA_FORMAT_HEADER_LENGTH: usize = 16;
pub const FIELD_DESCRIPTOR_LENGTH: usize = 32;

/// Decoded data-format section
#[derive(Debug, Clone)]
pub struct DataFormat {
    pub consistency_token: u32,
    pub record_size: u32,
    pub fields: Vec<FieldDescriptor>,
}

impl DataFormat {
    pub fn parse(payload: &[u8], converters: &ConverterTable) -> Result<Self> {
        let (head, mut rest) = read_string_fix(payload, DATA_FORMAT_HEADER_LENGTH)?;
        let header = DataFormatHeader::ref_from_bytes(head).map_err(Error::from_debug)?;
        let field_count = header.field_count.get() as usize;

        let mut fields = Vec::with_capacity(field_count.min(1024));
        for index in 0..field_count {
            let (fixed, _) = read_string_fix(rest, FIELD_DESCRIPTOR_LENGTH)?;
            let desc = FieldDescriptorBytes::ref_from_bytes(fixed).map_err(Error::from_debug)?;

            let descriptor_length = desc.descriptor_length.get() as usize;
            let name_length = desc.name_length.get() as usize;
            if descriptor_length < FIELD_DESCRIPTOR_LENGTH + name_length {
                return Err(Error::InvalidPacket);
            }
            let (descriptor, next) = read_string_fix(rest, descriptor_length)?;
            let name_bytes =
                &descriptor[FIELD_DESCRIPTOR_LENGTH..FIELD_DESCRIPTOR_LENGTH + name_length];
            let name = if name_bytes.is_empty() {
                String::new()
            } else {
                converters.decode(desc.name_ccsid.get(), name_bytes)?
            };

            let direction = Direction::from_u8(desc.direction).ok_or_else(|| {
                Error::LibraryBug(eyre!(
                    "field {} has unknown direction 0x{:02X}",
                    index,
                    desc.direction
                ))
            })?;
            let flags = FieldFlags::from_bits_truncate(desc.flags);

            let mut field = FieldDescriptor::new(
                name,
                desc.sql_type.get(),
                desc.length.get(),
                desc.scale.get(),
                desc.precision.get(),
                desc.ccsid.get(),
                direction,
                flags,
            );
            if flags.contains(FieldFlags::LOB_LOCATOR) {
                field.lob_locator = Some(desc.lob_locator.get());
            }
            field.lob_max_size = desc.lob_max_size.get();
            fields.push(field);
            rest = next;
        }

        Ok(Self {
            consistency_token: header.consistency_token.get(),
            record_size: header.record_size.get(),
            fields,
        })
    }
}

/// One entry of the extended column descriptor section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedColumn<'a> {
    pub flags: u16,
    pub ccsid: u16,
    pub label: &'a [u8],
}

pub fn parse_extended_columns(payload: &[u8]) -> Result<Vec<ExtendedColumn<'_>>> {
    let (count, mut rest) = read_int_4(payload)?;
    let mut columns = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let (flags, r) = read_int_2(rest)?;
        let (ccsid, r) = read_int_2(r)?;
        let (len, r) = read_int_2(r)?;
        let (label, r) = read_string_fix(r, len as usize)?;
        columns.push(ExtendedColumn {
            flags,
            ccsid,
            label,
        });
        rest = r;
    }
    Ok(columns)
}
