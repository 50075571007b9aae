//! Result row data in its three wire shapes.
//!
//! All shapes start with the same 20-byte header. Offsets held by
//! [`ResultData`] are absolute positions in the reply frame, so the decoded
//! view stays valid for as long as the frame bytes are not replaced.

use std::ops::Range;

use zerocopy::byteorder::big_endian::{U16 as U16BE, U32 as U32BE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::primitive::{get_u32, read_sint_2};

pub const RESULT_DATA_HEADER_LENGTH: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape {
    /// Every field at its static length
    Static,
    /// Varying fields carry only their actual bytes; one length word per row
    VariableCompressed,
    /// Element lengths sent once, ahead of the indicators
    Array,
}

/// Result data header (zero-copy)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct ResultDataHeader {
    pub consistency_token: U32BE,
    pub row_count: U32BE,
    pub column_count: U16BE,
    pub indicator_size: U16BE,
    pub reserved: U32BE,
    pub row_size: U32BE,
}

#[derive(Debug, Clone)]
pub struct ResultData {
    pub shape: RowShape,
    pub consistency_token: u32,
    pub column_count: usize,
    pub indicator_size: usize,
    pub row_size: usize,
    indicators: Range<usize>,
    rows: Vec<Range<usize>>,
    element_lengths: Vec<u32>,
}

impl ResultData {
    /// Locate rows and indicators of a result data section
    ///
    /// `payload` is the section's payload range within `frame`.
    pub fn parse(frame: &[u8], payload: Range<usize>, shape: RowShape) -> Result<Self> {
        let end = payload.end;
        let frame = frame.get(..end).ok_or(Error::UnexpectedEof)?;
        let head = frame
            .get(payload.start..payload.start + RESULT_DATA_HEADER_LENGTH)
            .ok_or(Error::UnexpectedEof)?;
        let header = ResultDataHeader::ref_from_bytes(head).map_err(Error::from_debug)?;
        let row_count = header.row_count.get() as usize;
        let column_count = header.column_count.get() as usize;
        let indicator_size = header.indicator_size.get() as usize;
        let mut row_size = header.row_size.get() as usize;
        let mut offset = payload.start + RESULT_DATA_HEADER_LENGTH;

        let mut element_lengths = Vec::new();
        if shape == RowShape::Array {
            element_lengths.reserve(column_count);
            for _ in 0..column_count {
                element_lengths.push(get_u32(frame, offset)?);
                offset += 4;
            }
            row_size = element_lengths.iter().map(|&l| l as usize).sum();
        }

        let indicator_len = row_count
            .checked_mul(column_count)
            .and_then(|n| n.checked_mul(indicator_size))
            .ok_or(Error::InvalidPacket)?;
        let indicators = offset..offset + indicator_len;
        if indicators.end > end {
            return Err(Error::UnexpectedEof);
        }
        offset = indicators.end;

        let mut rows = Vec::with_capacity(row_count.min(4096));
        for _ in 0..row_count {
            let len = match shape {
                RowShape::VariableCompressed => {
                    let len = get_u32(frame, offset)? as usize;
                    offset += 4;
                    len
                }
                RowShape::Static | RowShape::Array => row_size,
            };
            if offset + len > end {
                return Err(Error::UnexpectedEof);
            }
            rows.push(offset..offset + len);
            offset += len;
        }

        Ok(Self {
            shape,
            consistency_token: header.consistency_token.get(),
            column_count,
            indicator_size,
            row_size,
            indicators,
            rows,
            element_lengths,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, index: usize) -> Option<Range<usize>> {
        self.rows.get(index).cloned()
    }

    /// Per-output-field element lengths of the array shape
    pub fn element_lengths(&self) -> &[u32] {
        &self.element_lengths
    }

    /// Indicator of `column` in `row`; rows without indicators are all values
    pub fn indicator(&self, frame: &[u8], row: usize, column: usize) -> Result<i16> {
        if self.indicator_size == 0 {
            return Ok(0);
        }
        if row >= self.rows.len() || column >= self.column_count {
            return Err(Error::InvalidPacket);
        }
        let at = self.indicators.start + (row * self.column_count + column) * self.indicator_size;
        let bytes = frame
            .get(at..at + self.indicator_size)
            .ok_or(Error::UnexpectedEof)?;
        Ok(read_sint_2(bytes)?.0)
    }
}
