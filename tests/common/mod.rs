//! In-memory database host speaking the fetch subset of the wire protocol

#![allow(dead_code)]

use std::sync::{Arc, Once};

use zero_hostdb::buffer_pool::{BufferPool, PooledReply, ReplyPool};
use zero_hostdb::ccsid::ConverterTable;
use zero_hostdb::constant::{
    CCSID_UTF8, FIELD_HEADER_LENGTH, OperationId, OrsBitmap, VARIABLE_DATA_OFFSET, reply_cp,
    request_cp, sentinel,
};
use zero_hostdb::error::{Error, Result, ServerWarning};
use zero_hostdb::protocol::Exchange;
use zero_hostdb::protocol::compression::compress_frame;
use zero_hostdb::protocol::header::FrameHeader;
use zero_hostdb::protocol::primitive::{
    get_u32, put_u32, read_int_2, read_int_4, read_sint_4, write_bytes_fix, write_int_1,
    write_int_2, write_int_4, write_sint_4,
};
use zero_hostdb::protocol::reply::RawFields;
use zero_hostdb::protocol::request::RequestFrame;
use zero_hostdb::sync::{CursorSettings, RowCache};
use zerocopy::IntoBytes;

/// Static length of the NAME column, prefix included
pub const NAME_LENGTH: u32 = 18;

/// Every `NULL_EVERY`th row has a null NAME
pub const NULL_EVERY: i64 = 7;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// One fetch as seen by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchLog {
    pub orientation: u16,
    pub distance: i32,
    pub rows_wanted: bool,
    pub format_wanted: bool,
    pub compression_wanted: bool,
    pub blocking_factor: Option<u32>,
    pub buffer_size: Option<u32>,
}

/// Host with one open cursor over `row_count` rows of `(ID INTEGER, NAME VARCHAR(16))`
///
/// The server cursor position `position` runs from 0 (before first) to
/// `row_count + 1` (after last). Rows returned by a fetch leave it on the
/// last row sent; a fetch that finds nothing leaves it on the sentinel.
pub struct MockHost {
    pub row_count: i64,
    pub position: i64,
    pub variable_shape: bool,
    pub cursor_closed: bool,
    /// RLE-compress every other reply that carries rows, when asked to
    pub compress_replies: bool,
    pub compressed_replies: usize,
    /// Fetch numbers (0-based) answered with a positive warning
    pub warn_on: Vec<usize>,
    pub log: Vec<FetchLog>,
    pub connection_warnings: Vec<ServerWarning>,
    buffers: Arc<BufferPool>,
    replies: Arc<ReplyPool>,
    converters: ConverterTable,
}

impl MockHost {
    pub fn new(row_count: i64) -> Self {
        init_tracing();
        let buffers = Arc::new(BufferPool::new(16));
        Self {
            row_count,
            position: 0,
            variable_shape: false,
            cursor_closed: false,
            compress_replies: false,
            compressed_replies: 0,
            warn_on: Vec::new(),
            log: Vec::new(),
            connection_warnings: Vec::new(),
            replies: Arc::new(ReplyPool::new(8, Arc::clone(&buffers))),
            buffers,
            converters: ConverterTable::default(),
        }
    }

    pub fn variable(mut self) -> Self {
        self.variable_shape = true;
        self
    }

    pub fn compressing(mut self) -> Self {
        self.compress_replies = true;
        self
    }

    pub fn reply_pool(&self) -> &Arc<ReplyPool> {
        &self.replies
    }

    pub fn fetch_count(&self) -> usize {
        self.log.len()
    }

    pub fn name_of(row: i64) -> String {
        format!("row {}", row)
    }

    fn target(&self, orientation: u16, distance: i32) -> i64 {
        let distance = distance as i64;
        match orientation {
            0 => self.position + 1,
            1 => self.position - 1,
            2 => 1,
            3 => self.row_count,
            4 => 0,
            5 => self.row_count + 1,
            6 => self.position,
            7 => self.position + distance,
            _ if distance > 0 => distance,
            _ if distance < 0 => self.row_count + 1 + distance,
            _ => 0,
        }
    }

    fn parse_request(request: &[u8]) -> Result<FetchLog> {
        let ors = OrsBitmap::from_bits_retain(get_u32(request, 20)?);
        let mut log = FetchLog {
            orientation: 0,
            distance: 0,
            rows_wanted: ors.contains(OrsBitmap::RESULT_DATA),
            format_wanted: ors.contains(OrsBitmap::DATA_FORMAT),
            compression_wanted: ors.contains(OrsBitmap::REPLY_RLE_COMPRESSION),
            blocking_factor: None,
            buffer_size: None,
        };
        for field in RawFields::new(request)? {
            let field = field?;
            let payload = &request[field.payload];
            match field.code_point {
                request_cp::SCROLL_ORIENTATION => {
                    let (code, rest) = read_int_2(payload)?;
                    log.orientation = code;
                    log.distance = read_sint_4(rest)?.0;
                }
                request_cp::BLOCKING_FACTOR => log.blocking_factor = Some(read_int_4(payload)?.0),
                request_cp::FETCH_BUFFER_SIZE => log.buffer_size = Some(read_int_4(payload)?.0),
                _ => {}
            }
        }
        Ok(log)
    }

    fn static_row_size() -> u32 {
        4 + NAME_LENGTH
    }

    fn answer(&mut self, fetch: &FetchLog) -> Vec<u8> {
        if self.cursor_closed {
            return reply_frame(sentinel::CURSOR_CLOSED, &[]);
        }
        let target = self.target(fetch.orientation, fetch.distance);
        let in_range = (1..=self.row_count).contains(&target);
        let sentinel_position = if target < 1 { 0 } else { self.row_count + 1 };

        if !fetch.rows_wanted {
            self.position = if in_range { target } else { sentinel_position };
            let status = if in_range || matches!(fetch.orientation, 4 | 5) {
                (0, 0)
            } else {
                sentinel::END_OF_DATA
            };
            return reply_frame(status, &[]);
        }

        if !in_range {
            self.position = sentinel_position;
            return reply_frame(sentinel::END_OF_DATA, &[]);
        }

        let wanted = match (fetch.blocking_factor, fetch.buffer_size) {
            (Some(n), _) => n as i64,
            (None, Some(bytes)) => (bytes / Self::static_row_size()).max(1) as i64,
            (None, None) => 1,
        };
        let last = (target + wanted - 1).min(self.row_count);
        self.position = last;

        let mut sections = Vec::new();
        if fetch.format_wanted {
            sections.push((reply_cp::DATA_FORMAT, data_format()));
        }
        let (cp, payload) = self.result_data(target..=last);
        sections.push((cp, payload));

        let status = if last == self.row_count {
            sentinel::END_OF_DATA
        } else if self.warn_on.contains(&(self.log.len() - 1)) {
            (1, 466)
        } else {
            (0, 0)
        };
        let sections: Vec<(u16, &[u8])> = sections.iter().map(|(c, p)| (*c, p.as_slice())).collect();
        let plain = reply_frame(status, &sections);

        let fetch_number = self.log.len() - 1;
        if self.compress_replies && fetch.compression_wanted && fetch_number % 2 == 0 {
            let mut compressed = Vec::new();
            if compress_frame(&plain, &mut compressed).unwrap_or(false) {
                self.compressed_replies += 1;
                return compressed;
            }
        }
        plain
    }

    fn result_data(&self, rows: std::ops::RangeInclusive<i64>) -> (u16, Vec<u8>) {
        let count = (rows.end() - rows.start() + 1) as u32;
        let mut out = Vec::new();
        write_int_4(&mut out, 1);
        write_int_4(&mut out, count);
        write_int_2(&mut out, 2);
        write_int_2(&mut out, 2);
        write_int_4(&mut out, 0);
        write_int_4(&mut out, Self::static_row_size());

        for row in rows.clone() {
            write_int_2(&mut out, 0);
            let null_name = row % NULL_EVERY == 0;
            write_int_2(&mut out, if null_name { 0xFFFF } else { 0 });
        }
        for row in rows {
            let name = Self::name_of(row);
            let mut bytes = Vec::new();
            write_sint_4(&mut bytes, row as i32);
            write_int_2(&mut bytes, name.len() as u16);
            write_bytes_fix(&mut bytes, name.as_bytes());
            if self.variable_shape {
                write_int_4(&mut out, bytes.len() as u32);
            } else {
                bytes.resize(Self::static_row_size() as usize, 0);
            }
            write_bytes_fix(&mut out, &bytes);
        }

        let cp = if self.variable_shape {
            reply_cp::VARIABLE_RESULT_DATA
        } else {
            reply_cp::RESULT_DATA
        };
        (cp, out)
    }
}

fn descriptor(out: &mut Vec<u8>, name: &str, sql_type: u16, length: u32, ccsid: u16) {
    write_int_4(out, 32 + name.len() as u32);
    write_int_2(out, sql_type);
    write_int_4(out, length);
    write_int_2(out, 0);
    write_int_2(out, 0);
    write_int_2(out, ccsid);
    write_int_1(out, 0);
    write_int_1(out, 0);
    write_int_4(out, 0);
    write_int_4(out, 0);
    write_int_2(out, CCSID_UTF8);
    write_int_2(out, 0);
    write_int_2(out, name.len() as u16);
    write_bytes_fix(out, name.as_bytes());
}

/// `ID INTEGER NOT NULL, NAME VARCHAR(16)` in UTF-8
pub fn data_format() -> Vec<u8> {
    let mut out = Vec::new();
    write_int_4(&mut out, 1);
    write_int_4(&mut out, 2);
    write_int_4(&mut out, 0);
    write_int_4(&mut out, 4 + NAME_LENGTH);
    descriptor(&mut out, "ID", 496, 4, 0);
    descriptor(&mut out, "NAME", 449, NAME_LENGTH, CCSID_UTF8);
    out
}

/// Reply frame with the given status pair and sections
pub fn reply_frame(status: (u16, i32), sections: &[(u16, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    write_bytes_fix(&mut out, FrameHeader::new(OperationId::Reply).as_bytes());
    out.resize(VARIABLE_DATA_OFFSET, 0);
    out[34..36].copy_from_slice(&status.0.to_be_bytes());
    out[36..40].copy_from_slice(&status.1.to_be_bytes());
    for (cp, payload) in sections {
        write_int_4(&mut out, (FIELD_HEADER_LENGTH + payload.len()) as u32);
        write_int_2(&mut out, *cp);
        write_bytes_fix(&mut out, payload);
    }
    let len = out.len() as u32;
    put_u32(&mut out, 0, len);
    out
}

impl Exchange for MockHost {
    fn new_request(&mut self, operation: OperationId) -> RequestFrame {
        RequestFrame::new(&self.buffers, operation)
    }

    fn exchange(&mut self, mut request: RequestFrame) -> Result<PooledReply> {
        if request.operation() != OperationId::Fetch {
            return Err(Error::BadUsageError("mock host only fetches".to_string()));
        }
        let fetch = Self::parse_request(request.encoded()?)?;
        self.log.push(fetch.clone());
        let bytes = self.answer(&fetch);
        let mut reply = self.replies.get_reply();
        reply.load(&bytes)?;
        Ok(reply)
    }

    fn converters(&self) -> &ConverterTable {
        &self.converters
    }

    fn connection_warning(&mut self, warning: ServerWarning) {
        self.connection_warnings.push(warning);
    }
}

pub fn scrollable(blocking_factor: u32) -> CursorSettings {
    CursorSettings {
        blocking_factor,
        scrollable: true,
        ..Default::default()
    }
}

pub fn forward_only(blocking_factor: u32) -> CursorSettings {
    CursorSettings {
        blocking_factor,
        ..Default::default()
    }
}

/// ID of the current row, read through the decoded value
pub fn current_id(cache: &mut RowCache<&mut MockHost>) -> i64 {
    cache
        .value(0)
        .expect("decode ID")
        .as_i64()
        .expect("ID is an integer")
}
