use crate::ccsid::ConverterTable;
use crate::col::FieldDescriptor;
use crate::constant::{CCSID_BINARY, SqlType};
use crate::error::{Error, Result};
use crate::protocol::primitive::{read_int_2, read_int_4, read_string_fix};

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    /// Packed, zoned and scaled binary numbers in canonical decimal form
    Decimal(String),
    Char(String),
    Binary(Vec<u8>),
    Date(String),
    Time(String),
    Timestamp(String),
    LobLocator(u32),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Char(s) | Self::Decimal(s) | Self::Date(s) | Self::Time(s) | Self::Timestamp(s) => {
                Some(s)
            }
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::SmallInt(v) => Some(v as i64),
            Self::Integer(v) => Some(v as i64),
            Self::BigInt(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Decode the wire bytes of one non-null field
    ///
    /// `bytes` spans the field's slot; varying types still carry their prefix.
    pub fn decode(field: &FieldDescriptor, bytes: &[u8], converters: &ConverterTable) -> Result<Self> {
        let sql_type = field.sql_type()?;
        let scale = field.scale as usize;
        match sql_type {
            SqlType::SMALLINT => {
                let (raw, _) = read_int_2(bytes)?;
                let v = raw as i16;
                Ok(if scale > 0 {
                    Self::Decimal(scaled(v as i64, scale))
                } else {
                    Self::SmallInt(v)
                })
            }
            SqlType::INTEGER => {
                let (raw, _) = read_int_4(bytes)?;
                let v = raw as i32;
                Ok(if scale > 0 {
                    Self::Decimal(scaled(v as i64, scale))
                } else {
                    Self::Integer(v)
                })
            }
            SqlType::BIGINT => {
                let (raw, _) = read_string_fix(bytes, 8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                let v = i64::from_be_bytes(buf);
                Ok(if scale > 0 {
                    Self::Decimal(scaled(v, scale))
                } else {
                    Self::BigInt(v)
                })
            }
            SqlType::FLOAT => match field.length {
                4 => {
                    let (raw, _) = read_int_4(bytes)?;
                    Ok(Self::Real(f32::from_bits(raw)))
                }
                8 => {
                    let (raw, _) = read_string_fix(bytes, 8)?;
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(raw);
                    Ok(Self::Double(f64::from_be_bytes(buf)))
                }
                _ => Err(Error::InvalidPacket),
            },
            SqlType::DECIMAL => {
                let len = field.precision as usize / 2 + 1;
                let (raw, _) = read_string_fix(bytes, len)?;
                Ok(Self::Decimal(unpack_packed(raw, scale)?))
            }
            SqlType::NUMERIC => {
                let (raw, _) = read_string_fix(bytes, field.precision as usize)?;
                Ok(Self::Decimal(unpack_zoned(raw, scale)?))
            }
            SqlType::CHAR | SqlType::GRAPHIC => {
                let (raw, _) = read_string_fix(bytes, field.static_length())?;
                text_or_binary(field, raw, converters)
            }
            SqlType::VARCHAR
            | SqlType::LONG_VARCHAR
            | SqlType::VARGRAPHIC
            | SqlType::LONG_VARGRAPHIC => {
                let raw = varying(bytes, sql_type)?;
                text_or_binary(field, raw, converters)
            }
            SqlType::VARBINARY | SqlType::ROWID => Ok(Self::Binary(varying(bytes, sql_type)?.to_vec())),
            SqlType::BINARY => {
                let (raw, _) = read_string_fix(bytes, field.static_length())?;
                Ok(Self::Binary(raw.to_vec()))
            }
            SqlType::DATE | SqlType::TIME | SqlType::TIMESTAMP => {
                let (raw, _) = read_string_fix(bytes, field.static_length())?;
                let text = converters.decode(field.ccsid, raw)?;
                Ok(match sql_type {
                    SqlType::DATE => Self::Date(text),
                    SqlType::TIME => Self::Time(text),
                    _ => Self::Timestamp(text),
                })
            }
            SqlType::BLOB_LOCATOR | SqlType::CLOB_LOCATOR | SqlType::DBCLOB_LOCATOR => {
                let (handle, _) = read_int_4(bytes)?;
                Ok(Self::LobLocator(handle))
            }
        }
    }
}

/// Actual bytes of a varying field: 2-byte prefix counting characters
fn varying(bytes: &[u8], sql_type: SqlType) -> Result<&[u8]> {
    let (count, rest) = read_int_2(bytes)?;
    let (data, _) = read_string_fix(rest, count as usize * sql_type.prefix_unit())?;
    Ok(data)
}

fn text_or_binary(field: &FieldDescriptor, raw: &[u8], converters: &ConverterTable) -> Result<Value> {
    if field.ccsid == CCSID_BINARY {
        return Ok(Value::Binary(raw.to_vec()));
    }
    converters.decode(field.ccsid, raw).map(Value::Char)
}

/// Render `digits` with `scale` fractional digits
fn place_point(negative: bool, digits: &str, scale: usize) -> String {
    let digits = if digits.len() <= scale {
        format!("{:0>width$}", digits, width = scale + 1)
    } else {
        digits.to_string()
    };
    let (int, frac) = digits.split_at(digits.len() - scale);
    let int = int.trim_start_matches('0');
    let int = if int.is_empty() { "0" } else { int };
    let sign = if negative { "-" } else { "" };
    if scale == 0 {
        format!("{sign}{int}")
    } else {
        format!("{sign}{int}.{frac}")
    }
}

fn scaled(value: i64, scale: usize) -> String {
    let negative = value < 0;
    place_point(negative, &value.unsigned_abs().to_string(), scale)
}

fn is_negative_sign(nibble: u8) -> bool {
    matches!(nibble, 0x0B | 0x0D)
}

/// Packed decimal: two digits per byte, sign in the last low nibble
fn unpack_packed(raw: &[u8], scale: usize) -> Result<String> {
    let Some((&last, head)) = raw.split_last() else {
        return Err(Error::InvalidPacket);
    };
    let mut digits = String::with_capacity(raw.len() * 2);
    for nibble in head.iter().flat_map(|b| [b >> 4, b & 0x0F]).chain([last >> 4]) {
        if nibble > 9 {
            return Err(Error::InvalidPacket);
        }
        digits.push((b'0' + nibble) as char);
    }
    let negative = is_negative_sign(last & 0x0F) && digits.bytes().any(|d| d != b'0');
    Ok(place_point(negative, &digits, scale))
}

/// Zoned decimal: one digit per byte in the low nibble, sign in the last high nibble
fn unpack_zoned(raw: &[u8], scale: usize) -> Result<String> {
    let Some(&last) = raw.last() else {
        return Err(Error::InvalidPacket);
    };
    let mut digits = String::with_capacity(raw.len());
    for b in raw {
        let nibble = b & 0x0F;
        if nibble > 9 {
            return Err(Error::InvalidPacket);
        }
        digits.push((b'0' + nibble) as char);
    }
    let negative = is_negative_sign(last >> 4) && digits.bytes().any(|d| d != b'0');
    Ok(place_point(negative, &digits, scale))
}
