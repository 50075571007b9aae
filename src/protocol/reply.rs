use std::io::Read;
use std::ops::Range;

use tracing::trace;

use crate::ccsid::ConverterTable;
use crate::constant::{
    CursorAttributes, FIELD_HEADER_LENGTH, HEADER_LENGTH, VARIABLE_DATA_OFFSET, reply_cp,
};
use crate::error::{Error, Result};
use crate::protocol::compression::expand_frame;
use crate::protocol::data_format::{DataFormat, ExtendedColumn, parse_extended_columns};
use crate::protocol::header::{FrameHeader, ReplyTemplate};
use crate::protocol::primitive::{get_u32, read_int_2, read_int_4, read_string_fix, read_string_var};
use crate::protocol::result_data::{ResultData, RowShape};
use crate::protocol::sqlca::Sqlca;

/// One `(length, code point, payload)` optional field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub length: u32,
    pub code_point: u16,
    /// Absolute payload range within the frame
    pub payload: Range<usize>,
}

/// Iterator over the optional fields of a frame, request or reply
///
/// Stops exactly at the frame's declared total length.
pub struct RawFields<'a> {
    data: &'a [u8],
    offset: usize,
    end: usize,
}

impl<'a> RawFields<'a> {
    pub fn new(frame: &'a [u8]) -> Result<Self> {
        let end = FrameHeader::from_bytes(frame)?.total_length();
        if end < VARIABLE_DATA_OFFSET || end > frame.len() {
            return Err(Error::InvalidPacket);
        }
        Ok(Self {
            data: frame,
            offset: VARIABLE_DATA_OFFSET,
            end,
        })
    }

    fn read_field(&mut self) -> Result<RawField> {
        let (length, rest) = read_int_4(&self.data[self.offset..self.end])?;
        let (code_point, _) = read_int_2(rest)?;
        let len = length as usize;
        if len < FIELD_HEADER_LENGTH || self.offset + len > self.end {
            return Err(Error::InvalidPacket);
        }
        let payload = self.offset + FIELD_HEADER_LENGTH..self.offset + len;
        self.offset += len;
        Ok(RawField {
            length,
            code_point,
            payload,
        })
    }
}

impl Iterator for RawFields<'_> {
    type Item = Result<RawField>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset == self.end {
            return None;
        }
        let field = self.read_field();
        if field.is_err() {
            // stop after the first framing error
            self.offset = self.end;
        }
        Some(field)
    }
}

/// Reply sections the parser understands, one per code point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyField {
    MessageId,
    FirstLevelText,
    SecondLevelText,
    ServerAttributes,
    DataFormat,
    ResultData(RowShape),
    Sqlca,
    PackageInfo,
    LobData,
    CursorAttributes,
    ExtendedColumnDescriptors,
    Unknown(u16),
}

impl ReplyField {
    pub fn from_code_point(code_point: u16) -> Self {
        match code_point {
            reply_cp::MESSAGE_ID => Self::MessageId,
            reply_cp::FIRST_LEVEL_TEXT => Self::FirstLevelText,
            reply_cp::SECOND_LEVEL_TEXT => Self::SecondLevelText,
            reply_cp::SERVER_ATTRIBUTES => Self::ServerAttributes,
            reply_cp::DATA_FORMAT => Self::DataFormat,
            reply_cp::RESULT_DATA => Self::ResultData(RowShape::Static),
            reply_cp::VARIABLE_RESULT_DATA => Self::ResultData(RowShape::VariableCompressed),
            reply_cp::ARRAY_RESULT_DATA => Self::ResultData(RowShape::Array),
            reply_cp::SQLCA => Self::Sqlca,
            reply_cp::PACKAGE_INFO => Self::PackageInfo,
            reply_cp::LOB_DATA => Self::LobData,
            reply_cp::CURSOR_ATTRIBUTES => Self::CursorAttributes,
            reply_cp::EXTENDED_COLUMN_DESCRIPTORS => Self::ExtendedColumnDescriptors,
            other => Self::Unknown(other),
        }
    }
}

/// Payload ranges of the sections present in the current reply
#[derive(Debug, Clone, Default)]
struct ReplySections {
    message_id: Option<Range<usize>>,
    first_level_text: Option<Range<usize>>,
    second_level_text: Option<Range<usize>>,
    server_attributes: Option<Range<usize>>,
    data_format: Option<Range<usize>>,
    result_data: Option<(RowShape, Range<usize>)>,
    sqlca: Option<Range<usize>>,
    package_info: Option<Range<usize>>,
    lob_data: Option<Range<usize>>,
    cursor_attributes: Option<Range<usize>>,
    extended_column_descriptors: Option<Range<usize>>,
}

impl ReplySections {
    fn record(&mut self, field: ReplyField, payload: Range<usize>) {
        let slot = match field {
            ReplyField::MessageId => &mut self.message_id,
            ReplyField::FirstLevelText => &mut self.first_level_text,
            ReplyField::SecondLevelText => &mut self.second_level_text,
            ReplyField::ServerAttributes => &mut self.server_attributes,
            ReplyField::DataFormat => &mut self.data_format,
            ReplyField::ResultData(shape) => {
                self.result_data = Some((shape, payload));
                return;
            }
            ReplyField::Sqlca => &mut self.sqlca,
            ReplyField::PackageInfo => &mut self.package_info,
            ReplyField::LobData => &mut self.lob_data,
            ReplyField::CursorAttributes => &mut self.cursor_attributes,
            ReplyField::ExtendedColumnDescriptors => &mut self.extended_column_descriptors,
            ReplyField::Unknown(_) => return,
        };
        *slot = Some(payload);
    }
}

/// One parsed reply
///
/// Sections are held as ranges into the frame bytes and decoded on access.
/// `data` and `scratch` are storage lent by the owning pool.
#[derive(Debug, Default)]
pub struct ReplyFrame {
    data: Vec<u8>,
    scratch: Vec<u8>,
    sections: ReplySections,
    error_class: u16,
    return_code: i32,
    correlation_id: u32,
}

impl ReplyFrame {
    /// Read one frame from `reader` and parse it
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<()> {
        self.reset();
        self.data.resize(HEADER_LENGTH, 0);
        reader.read_exact(&mut self.data)?;
        let total = FrameHeader::from_bytes(&self.data)?.total_length();
        if total < VARIABLE_DATA_OFFSET {
            return Err(Error::InvalidPacket);
        }
        self.data.resize(total, 0);
        reader.read_exact(&mut self.data[HEADER_LENGTH..])?;
        self.parse()
    }

    /// Copy a complete frame and parse it
    pub fn load(&mut self, frame: &[u8]) -> Result<()> {
        self.reset();
        self.data.extend_from_slice(frame);
        self.parse()
    }

    fn parse(&mut self) -> Result<()> {
        let header = FrameHeader::from_bytes(&self.data)?;
        if header.total_length() != self.data.len() {
            return Err(Error::InvalidPacket);
        }
        self.correlation_id = header.correlation_id();

        let template = ReplyTemplate::from_bytes(&self.data)?;
        self.error_class = template.error_class();
        self.return_code = template.return_code();
        if template.is_compressed() {
            expand_frame(&self.data, &mut self.scratch)?;
            std::mem::swap(&mut self.data, &mut self.scratch);
            self.scratch.clear();
        }

        for field in RawFields::new(&self.data)? {
            let field = field?;
            if field.payload.is_empty() {
                // declared length 6: nothing to record
                continue;
            }
            match ReplyField::from_code_point(field.code_point) {
                ReplyField::Unknown(cp) => {
                    trace!(code_point = cp, length = field.length, "skip unknown reply field");
                }
                known => self.sections.record(known, field.payload),
            }
        }
        Ok(())
    }

    /// Clear every section; storage capacity is kept
    pub fn reset(&mut self) {
        self.data.clear();
        self.scratch.clear();
        self.sections = ReplySections::default();
        self.error_class = 0;
        self.return_code = 0;
        self.correlation_id = 0;
    }

    pub(crate) fn attach_storage(&mut self, data: Vec<u8>, scratch: Vec<u8>) {
        self.data = data;
        self.scratch = scratch;
    }

    pub(crate) fn detach_storage(&mut self) -> (Vec<u8>, Vec<u8>) {
        (
            std::mem::take(&mut self.data),
            std::mem::take(&mut self.scratch),
        )
    }

    /// Frame bytes, decompressed
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn error_class(&self) -> u16 {
        self.error_class
    }

    pub fn return_code(&self) -> i32 {
        self.return_code
    }

    pub fn correlation_id(&self) -> u32 {
        self.correlation_id
    }

    fn section(&self, range: &Option<Range<usize>>) -> Option<&[u8]> {
        range.as_ref().map(|r| &self.data[r.clone()])
    }

    /// `ccsid u16 | bytes`
    pub fn message_id(&self, converters: &ConverterTable) -> Result<Option<String>> {
        let Some(payload) = self.section(&self.sections.message_id) else {
            return Ok(None);
        };
        let (ccsid, text) = read_int_2(payload)?;
        converters.decode(ccsid, text).map(Some)
    }

    pub fn first_level_text(&self, converters: &ConverterTable) -> Result<Option<String>> {
        self.text(&self.sections.first_level_text, converters)
    }

    pub fn second_level_text(&self, converters: &ConverterTable) -> Result<Option<String>> {
        self.text(&self.sections.second_level_text, converters)
    }

    fn text(
        &self,
        range: &Option<Range<usize>>,
        converters: &ConverterTable,
    ) -> Result<Option<String>> {
        let Some(payload) = self.section(range) else {
            return Ok(None);
        };
        let (ccsid, rest) = read_int_2(payload)?;
        let (text, _) = read_string_var(rest)?;
        converters.decode(ccsid, text).map(Some)
    }

    pub fn sqlca(&self) -> Result<Option<&Sqlca>> {
        self.section(&self.sections.sqlca)
            .map(Sqlca::from_bytes)
            .transpose()
    }

    pub fn data_format_bytes(&self) -> Option<&[u8]> {
        self.section(&self.sections.data_format)
    }

    pub fn data_format(&self, converters: &ConverterTable) -> Result<Option<DataFormat>> {
        self.data_format_bytes()
            .map(|payload| DataFormat::parse(payload, converters))
            .transpose()
    }

    pub fn has_result_data(&self) -> bool {
        self.sections.result_data.is_some()
    }

    /// Row layout of the result data section; offsets index [`Self::bytes`]
    pub fn result_data(&self) -> Result<Option<ResultData>> {
        let Some((shape, range)) = &self.sections.result_data else {
            return Ok(None);
        };
        ResultData::parse(&self.data, range.clone(), *shape).map(Some)
    }

    pub fn cursor_attributes(&self) -> Result<Option<CursorAttributes>> {
        let Some(payload) = self.section(&self.sections.cursor_attributes) else {
            return Ok(None);
        };
        let bits = get_u32(payload, 0)?;
        Ok(Some(CursorAttributes::from_bits_retain(bits)))
    }

    /// `(ccsid, bytes)` of an inline LOB payload
    pub fn lob_data(&self) -> Result<Option<(u16, &[u8])>> {
        let Some(payload) = self.section(&self.sections.lob_data) else {
            return Ok(None);
        };
        let (ccsid, rest) = read_int_2(payload)?;
        let (len, rest) = read_int_4(rest)?;
        let (bytes, _) = read_string_fix(rest, len as usize)?;
        Ok(Some((ccsid, bytes)))
    }

    pub fn extended_columns(&self) -> Result<Option<Vec<ExtendedColumn<'_>>>> {
        self.section(&self.sections.extended_column_descriptors)
            .map(parse_extended_columns)
            .transpose()
    }

    pub fn package_info(&self) -> Option<&[u8]> {
        self.section(&self.sections.package_info)
    }

    pub fn server_attributes(&self) -> Option<&[u8]> {
        self.section(&self.sections.server_attributes)
    }

    /// SQLSTATE and message text for a server diagnostic
    ///
    /// Missing sections yield empty strings; an undecodable text is replaced
    /// by the message id.
    pub fn diagnostic(&self, converters: &ConverterTable) -> (String, String) {
        let sql_state = match self.sqlca() {
            Ok(Some(sqlca)) => sqlca.sqlstate(),
            _ => String::new(),
        };
        let message = match self.first_level_text(converters) {
            Ok(Some(text)) => text,
            _ => self
                .message_id(converters)
                .ok()
                .flatten()
                .unwrap_or_default(),
        };
        (sql_state, message)
    }
}
