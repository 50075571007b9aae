use crate::error::{Error, Result};
use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I16 as I16BE, I32 as I32BE, U16 as U16BE, U32 as U32BE};

/// Read 1-byte integer
pub fn read_int_1(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((&value, rest)) => Ok((value, rest)),
        None => Err(Error::UnexpectedEof),
    }
}

/// Read 2-byte big-endian integer
pub fn read_int_2(data: &[u8]) -> Result<(u16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::UnexpectedEof);
    }
    let value = U16BE::ref_from_bytes(&data[..2])
        .map_err(Error::from_debug)?
        .get();
    Ok((value, &data[2..]))
}

/// Read 2-byte big-endian signed integer
pub fn read_sint_2(data: &[u8]) -> Result<(i16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::UnexpectedEof);
    }
    let value = I16BE::ref_from_bytes(&data[..2])
        .map_err(Error::from_debug)?
        .get();
    Ok((value, &data[2..]))
}

/// Read 4-byte big-endian integer
pub fn read_int_4(data: &[u8]) -> Result<(u32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::UnexpectedEof);
    }
    let value = U32BE::ref_from_bytes(&data[..4])
        .map_err(Error::from_debug)?
        .get();
    Ok((value, &data[4..]))
}

/// Read 4-byte big-endian signed integer
pub fn read_sint_4(data: &[u8]) -> Result<(i32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::UnexpectedEof);
    }
    let value = I32BE::ref_from_bytes(&data[..4])
        .map_err(Error::from_debug)?
        .get();
    Ok((value, &data[4..]))
}

/// Read 8-byte big-endian integer
pub fn read_int_8(data: &[u8]) -> Result<(u64, &[u8])> {
    if data.len() < 8 {
        return Err(Error::UnexpectedEof);
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[..8]);
    Ok((u64::from_be_bytes(bytes), &data[8..]))
}

/// Read fixed-length bytes
pub fn read_string_fix(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::UnexpectedEof);
    }
    Ok((&data[..len], &data[len..]))
}

/// Read 2-byte length-prefixed bytes
pub fn read_string_var(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = read_int_2(data)?;
    read_string_fix(rest, len as usize)
}

/// Read a big-endian u16 at an absolute offset
pub fn get_u16(data: &[u8], offset: usize) -> Result<u16> {
    let slice = data.get(offset..).ok_or(Error::UnexpectedEof)?;
    Ok(read_int_2(slice)?.0)
}

/// Read a big-endian u32 at an absolute offset
pub fn get_u32(data: &[u8], offset: usize) -> Result<u32> {
    let slice = data.get(offset..).ok_or(Error::UnexpectedEof)?;
    Ok(read_int_4(slice)?.0)
}

/// Write 1-byte integer
pub fn write_int_1(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write 2-byte big-endian integer
pub fn write_int_2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian integer
pub fn write_int_4(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 4-byte big-endian signed integer
pub fn write_sint_4(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write 8-byte big-endian integer
pub fn write_int_8(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write fixed-length bytes
pub fn write_bytes_fix(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Overwrite a big-endian u16 at an absolute offset
pub fn put_u16(out: &mut [u8], offset: usize, value: u16) {
    out[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// Overwrite a big-endian u32 at an absolute offset
pub fn put_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}
