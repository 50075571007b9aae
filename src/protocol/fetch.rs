use crate::ccsid::ConverterTable;
use crate::constant::{
    OrsBitmap, VARIABLE_FIELD_COMPRESSION_ON, request_cp, sentinel,
};
use crate::error::{Result, ServerError, ServerWarning};
use crate::protocol::reply::ReplyFrame;
use crate::protocol::request::RequestFrame;

/// Scroll direction of a fetch, with its wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOrientation {
    Next,
    Previous,
    First,
    Last,
    BeforeFirst,
    AfterLast,
    Current,
    Relative(i32),
    Direct(i32),
}

impl ScrollOrientation {
    pub fn code(self) -> u16 {
        match self {
            Self::Next => 0,
            Self::Previous => 1,
            Self::First => 2,
            Self::Last => 3,
            Self::BeforeFirst => 4,
            Self::AfterLast => 5,
            Self::Current => 6,
            Self::Relative(_) => 7,
            Self::Direct(_) => 8,
        }
    }

    pub fn distance(self) -> i32 {
        match self {
            Self::Relative(n) | Self::Direct(n) => n,
            _ => 0,
        }
    }
}

/// How much data a fetch asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAmount {
    /// Blocking factor
    Rows(u32),
    /// Server buffer cap in bytes
    BufferSize(u32),
    Single,
    /// Move the server cursor without returning rows
    Positioning,
}

#[derive(Debug, Clone, Copy)]
pub struct FetchRequest {
    pub orientation: ScrollOrientation,
    pub amount: FetchAmount,
    pub rpb_handle: u16,
    pub ors_handle: u16,
    pub want_format: bool,
    pub variable_field_compression: bool,
    pub reply_compression: bool,
}

impl FetchRequest {
    pub fn returns_rows(&self) -> bool {
        self.amount != FetchAmount::Positioning
    }

    pub fn write(&self, frame: &mut RequestFrame) {
        let mut ors = OrsBitmap::SEND_REPLY_IMMEDIATELY
            | OrsBitmap::SQLCA
            | OrsBitmap::MESSAGE_ID
            | OrsBitmap::FIRST_LEVEL_TEXT;
        if self.returns_rows() {
            ors |= OrsBitmap::RESULT_DATA;
            if self.want_format {
                ors |= OrsBitmap::DATA_FORMAT;
            }
        }
        if self.reply_compression {
            ors |= OrsBitmap::REPLY_RLE_COMPRESSION;
        }
        frame.set_ors_bitmap(ors);
        frame.set_return_ors_handle(self.ors_handle);
        frame.set_fill_ors_handle(self.ors_handle);
        frame.set_rpb_handle(self.rpb_handle);

        frame.add_scroll(self.orientation.code(), self.orientation.distance());
        match self.amount {
            FetchAmount::Rows(n) => frame.add_u32(request_cp::BLOCKING_FACTOR, n),
            FetchAmount::Single => frame.add_u32(request_cp::BLOCKING_FACTOR, 1),
            FetchAmount::BufferSize(bytes) => frame.add_u32(request_cp::FETCH_BUFFER_SIZE, bytes),
            FetchAmount::Positioning => {}
        }
        if self.returns_rows() && self.variable_field_compression {
            frame.add_u8(
                request_cp::VARIABLE_FIELD_COMPRESSION,
                VARIABLE_FIELD_COMPRESSION_ON,
            );
        }
    }
}

/// Meaning of a fetch reply's `(error class, return code)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Rows,
    /// No more rows in the requested direction; rows may still be present
    EndOfData,
    CursorClosed,
    /// Rows may be present; the warning belongs to the cursor
    Warning(ServerWarning),
}

/// Classify a fetch reply; a negative return code becomes `ServerError`
pub fn classify(reply: &ReplyFrame, converters: &ConverterTable) -> Result<FetchStatus> {
    let pair = (reply.error_class(), reply.return_code());
    if pair.0 == 0 {
        return Ok(FetchStatus::Rows);
    }
    if pair == sentinel::END_OF_DATA || pair == sentinel::END_OF_SCROLL {
        return Ok(FetchStatus::EndOfData);
    }
    if pair == sentinel::CURSOR_CLOSED {
        return Ok(FetchStatus::CursorClosed);
    }

    let (sql_state, message) = reply.diagnostic(converters);
    if pair.1 < 0 {
        Err(ServerError {
            error_class: pair.0,
            return_code: pair.1,
            sql_state,
            message,
        }
        .into())
    } else {
        Ok(FetchStatus::Warning(ServerWarning {
            error_class: pair.0,
            return_code: pair.1,
            sql_state,
            message,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::constant::{OperationId, VARIABLE_DATA_OFFSET};
    use crate::error::Error;
    use crate::protocol::header::FrameHeader;
    use crate::protocol::primitive::{get_u32, put_u32};
    use crate::protocol::reply::RawFields;
    use std::sync::Arc;
    use zerocopy::IntoBytes;

    fn request(fetch: FetchRequest) -> Vec<u8> {
        let pool = Arc::new(BufferPool::new(2));
        let mut frame = RequestFrame::new(&pool, OperationId::Fetch);
        fetch.write(&mut frame);
        frame.encoded().unwrap().to_vec()
    }

    fn fetch(orientation: ScrollOrientation, amount: FetchAmount) -> FetchRequest {
        FetchRequest {
            orientation,
            amount,
            rpb_handle: 1,
            ors_handle: 1,
            want_format: false,
            variable_field_compression: true,
            reply_compression: false,
        }
    }

    fn reply(error_class: u16, return_code: i32) -> ReplyFrame {
        let mut bytes = FrameHeader::new(OperationId::Reply).as_bytes().to_vec();
        bytes.resize(VARIABLE_DATA_OFFSET, 0);
        put_u32(&mut bytes, 0, VARIABLE_DATA_OFFSET as u32);
        bytes[34..36].copy_from_slice(&error_class.to_be_bytes());
        bytes[36..40].copy_from_slice(&return_code.to_be_bytes());
        let mut reply = ReplyFrame::default();
        reply.load(&bytes).unwrap();
        reply
    }

    #[test]
    fn test_orientation_codes() {
        assert_eq!(ScrollOrientation::Next.code(), 0);
        assert_eq!(ScrollOrientation::AfterLast.code(), 5);
        assert_eq!(ScrollOrientation::Relative(-4).code(), 7);
        assert_eq!(ScrollOrientation::Relative(-4).distance(), -4);
        assert_eq!(ScrollOrientation::Direct(9).code(), 8);
    }

    #[test]
    fn test_block_fetch_parameters() {
        let bytes = request(fetch(ScrollOrientation::Next, FetchAmount::Rows(10)));
        let ors = OrsBitmap::from_bits_retain(get_u32(&bytes, 20).unwrap());
        assert!(ors.contains(OrsBitmap::RESULT_DATA));

        let fields: Vec<_> = RawFields::new(&bytes)
            .unwrap()
            .map(|f| f.unwrap())
            .collect();
        let cps: Vec<u16> = fields.iter().map(|f| f.code_point).collect();
        assert_eq!(
            cps,
            [
                request_cp::SCROLL_ORIENTATION,
                request_cp::BLOCKING_FACTOR,
                request_cp::VARIABLE_FIELD_COMPRESSION
            ]
        );
        assert_eq!(&bytes[fields[1].payload.clone()], &[0, 0, 0, 10]);
    }

    #[test]
    fn test_positioning_fetch_has_no_result_data() {
        let bytes = request(fetch(
            ScrollOrientation::Direct(12),
            FetchAmount::Positioning,
        ));
        let ors = OrsBitmap::from_bits_retain(get_u32(&bytes, 20).unwrap());
        assert!(!ors.contains(OrsBitmap::RESULT_DATA));
        let fields: Vec<_> = RawFields::new(&bytes)
            .unwrap()
            .map(|f| f.unwrap())
            .collect();
        assert_eq!(fields.len(), 1);
        assert_eq!(&bytes[fields[0].payload.clone()], &[0, 8, 0, 0, 0, 12]);
    }

    #[test]
    fn test_buffer_size_fetch() {
        let bytes = request(fetch(ScrollOrientation::Next, FetchAmount::BufferSize(32768)));
        let cps: Vec<u16> = RawFields::new(&bytes)
            .unwrap()
            .map(|f| f.unwrap().code_point)
            .collect();
        assert!(cps.contains(&request_cp::FETCH_BUFFER_SIZE));
        assert!(!cps.contains(&request_cp::BLOCKING_FACTOR));
    }

    #[test]
    fn test_classify() {
        let converters = ConverterTable::default();
        assert_eq!(classify(&reply(0, 0), &converters).unwrap(), FetchStatus::Rows);
        assert_eq!(
            classify(&reply(2, 700), &converters).unwrap(),
            FetchStatus::EndOfData
        );
        assert_eq!(
            classify(&reply(2, 701), &converters).unwrap(),
            FetchStatus::EndOfData
        );
        assert_eq!(
            classify(&reply(2, -501), &converters).unwrap(),
            FetchStatus::CursorClosed
        );
        assert!(matches!(
            classify(&reply(1, 466), &converters).unwrap(),
            FetchStatus::Warning(ServerWarning { return_code: 466, .. })
        ));
        let err = classify(&reply(2, -204), &converters).unwrap_err();
        assert!(matches!(
            err,
            Error::ServerError(ServerError { return_code: -204, .. })
        ));
    }
}
