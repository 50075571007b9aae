//! Run-length encoding used to compress the variable-data region of a frame.
//!
//! Encoded stream:
//! - any byte other than [`RLE_ESCAPE`] is a literal
//! - `ESC value count_hi count_lo` expands to `count` copies of `value`
//!
//! Every escape byte in the source is emitted as a repeater token, so the
//! decoder never has to guess whether an escape is data.

use crate::constant::{COMPRESSION_HEADER_LENGTH, RLE_SCHEME, VARIABLE_DATA_OFFSET};
use crate::error::{Error, Result};
use crate::protocol::header::RequestTemplate;
use crate::protocol::primitive::{get_u16, get_u32, put_u32, write_int_2, write_int_4};

pub const RLE_ESCAPE: u8 = 0x1B;

/// Token length: escape, value, 2-byte count
const TOKEN_LENGTH: usize = 4;

/// Shortest run that is cheaper as a token than as literals
const MIN_RUN: usize = TOKEN_LENGTH + 1;

/// Most output one input byte can stand for (a maximal token)
const MAX_EXPANSION: usize = u16::MAX as usize / TOKEN_LENGTH + 1;

/// Append the RLE encoding of `src` to `out`
pub fn compress_rle(src: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < src.len() {
        let value = src[i];
        let mut run = 1;
        while i + run < src.len() && src[i + run] == value && run < u16::MAX as usize {
            run += 1;
        }

        if value == RLE_ESCAPE || run >= MIN_RUN {
            out.push(RLE_ESCAPE);
            out.push(value);
            out.extend_from_slice(&(run as u16).to_be_bytes());
        } else {
            out.extend(std::iter::repeat_n(value, run));
        }
        i += run;
    }
}

/// Append the expansion of `src` to `out`, at most `limit` bytes
///
/// A token cut short by the end of input is a framing error, as is a
/// zero-length run or output that would pass `limit`.
pub fn decompress_rle(src: &[u8], out: &mut Vec<u8>, limit: usize) -> Result<()> {
    let end = out.len().saturating_add(limit);
    let mut i = 0;
    while i < src.len() {
        let byte = src[i];
        if byte != RLE_ESCAPE {
            if out.len() >= end {
                return Err(Error::InvalidPacket);
            }
            out.push(byte);
            i += 1;
            continue;
        }

        let token = src.get(i..i + TOKEN_LENGTH).ok_or(Error::UnexpectedEof)?;
        let value = token[1];
        let count = u16::from_be_bytes([token[2], token[3]]) as usize;
        if count == 0 || count > end - out.len() {
            return Err(Error::InvalidPacket);
        }
        out.extend(std::iter::repeat_n(value, count));
        i += TOKEN_LENGTH;
    }
    Ok(())
}

/// Write the compressed form of a whole frame into `out`
///
/// Header and template are copied as-is; the variable region is replaced by
/// `LL | CP | decompressed length | RLE payload`. Returns `false` and leaves
/// `out` unspecified when the encoding is not smaller than the original.
pub fn compress_frame(frame: &[u8], out: &mut Vec<u8>) -> Result<bool> {
    let region = frame
        .get(VARIABLE_DATA_OFFSET..)
        .ok_or(Error::UnexpectedEof)?;

    out.clear();
    out.extend_from_slice(&frame[..VARIABLE_DATA_OFFSET]);
    write_int_4(out, 0);
    write_int_2(out, RLE_SCHEME);
    write_int_4(out, region.len() as u32);
    compress_rle(region, out);

    let compressed_len = out.len() - VARIABLE_DATA_OFFSET;
    if compressed_len >= region.len() {
        return Ok(false);
    }

    put_u32(out, VARIABLE_DATA_OFFSET, compressed_len as u32);
    let total = out.len() as u32;
    put_u32(out, 0, total);
    RequestTemplate::from_bytes_mut(out)?.set_compressed(true);
    Ok(true)
}

/// Write the decompressed form of a whole frame into `out`
///
/// The total length in the copied header is patched to the expanded size and
/// the compressed bit is cleared.
pub fn expand_frame(frame: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let ll = get_u32(frame, VARIABLE_DATA_OFFSET)? as usize;
    let scheme = get_u16(frame, VARIABLE_DATA_OFFSET + 4)?;
    let decompressed_len = get_u32(frame, VARIABLE_DATA_OFFSET + 6)? as usize;
    if scheme != RLE_SCHEME {
        return Err(Error::UnsupportedCompression(scheme));
    }
    if ll < COMPRESSION_HEADER_LENGTH {
        return Err(Error::InvalidPacket);
    }
    let payload = frame
        .get(VARIABLE_DATA_OFFSET + COMPRESSION_HEADER_LENGTH..VARIABLE_DATA_OFFSET + ll)
        .ok_or(Error::InvalidPacket)?;

    // the declared length is untrusted until the payload backs it
    let reserve = decompressed_len.min(payload.len().saturating_mul(MAX_EXPANSION));
    out.clear();
    out.reserve(VARIABLE_DATA_OFFSET + reserve);
    out.extend_from_slice(&frame[..VARIABLE_DATA_OFFSET]);
    decompress_rle(payload, out, decompressed_len)?;
    if out.len() - VARIABLE_DATA_OFFSET != decompressed_len {
        return Err(Error::InvalidPacket);
    }

    let total = out.len() as u32;
    put_u32(out, 0, total);
    RequestTemplate::from_bytes_mut(out)?.set_compressed(false);
    Ok(())
}
