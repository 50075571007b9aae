use std::io::Write;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::buffer_pool::{BufferPool, PooledBuffer};
use crate::ccsid::CharConverter;
use crate::constant::{
    COMPRESSION_THRESHOLD, OperationId, OrsBitmap, VARIABLE_DATA_OFFSET,
    request_cp,
};
use crate::error::{Error, Result, eyre};
use crate::protocol::compression::compress_frame;
use crate::protocol::header::{FrameHeader, RequestTemplate};
use crate::protocol::primitive::{
    put_u16, put_u32, write_bytes_fix, write_int_1, write_int_2, write_int_4, write_sint_4,
};
use zerocopy::IntoBytes;

const TOTAL_LENGTH_OFFSET: usize = 0;
const INSTANCE_ID_OFFSET: usize = 8;
const CORRELATION_ID_OFFSET: usize = 12;
const ORS_BITMAP_OFFSET: usize = 20;
const RETURN_ORS_HANDLE_OFFSET: usize = 28;
const FILL_ORS_HANDLE_OFFSET: usize = 30;
const BASED_ON_ORS_HANDLE_OFFSET: usize = 32;
const RPB_HANDLE_OFFSET: usize = 34;
const PMD_HANDLE_OFFSET: usize = 36;
const PARAMETER_COUNT_OFFSET: usize = 38;

/// Library-list entry: indicator byte plus library name
#[derive(Debug, Clone, Copy)]
pub struct LibraryEntry<'a> {
    pub indicator: u8,
    pub name: &'a str,
}

/// One outgoing operation message
///
/// The frame owns a pooled buffer holding `header | template | parameters`.
/// Parameters are appended in call order; [`RequestFrame::finalize`] writes
/// the total length and parameter count.
pub struct RequestFrame {
    pool: Arc<BufferPool>,
    buffer: PooledBuffer,
    compressed: Option<PooledBuffer>,
    operation: OperationId,
    parameter_count: u16,
    compress: bool,
}

impl RequestFrame {
    pub fn new(pool: &Arc<BufferPool>, operation: OperationId) -> Self {
        let mut buffer = pool.get_buffer();
        buffer.clear();
        buffer.extend_from_slice(FrameHeader::new(operation).as_bytes());
        buffer.extend_from_slice(RequestTemplate::new().as_bytes());
        Self {
            pool: Arc::clone(pool),
            buffer,
            compressed: None,
            operation,
            parameter_count: 0,
            compress: false,
        }
    }

    pub fn operation(&self) -> OperationId {
        self.operation
    }

    pub fn parameter_count(&self) -> u16 {
        self.parameter_count
    }

    /// Length of the uncompressed variable-data region
    pub fn variable_length(&self) -> usize {
        self.buffer.len() - VARIABLE_DATA_OFFSET
    }

    pub fn set_ors_bitmap(&mut self, bitmap: OrsBitmap) {
        put_u32(&mut self.buffer, ORS_BITMAP_OFFSET, bitmap.bits());
    }

    pub fn set_correlation_id(&mut self, id: u32) {
        put_u32(&mut self.buffer, CORRELATION_ID_OFFSET, id);
    }

    pub fn set_instance_id(&mut self, id: u32) {
        put_u32(&mut self.buffer, INSTANCE_ID_OFFSET, id);
    }

    pub fn set_return_ors_handle(&mut self, handle: u16) {
        put_u16(&mut self.buffer, RETURN_ORS_HANDLE_OFFSET, handle);
    }

    pub fn set_fill_ors_handle(&mut self, handle: u16) {
        put_u16(&mut self.buffer, FILL_ORS_HANDLE_OFFSET, handle);
    }

    pub fn set_based_on_ors_handle(&mut self, handle: u16) {
        put_u16(&mut self.buffer, BASED_ON_ORS_HANDLE_OFFSET, handle);
    }

    pub fn set_rpb_handle(&mut self, handle: u16) {
        put_u16(&mut self.buffer, RPB_HANDLE_OFFSET, handle);
    }

    pub fn set_pmd_handle(&mut self, handle: u16) {
        put_u16(&mut self.buffer, PMD_HANDLE_OFFSET, handle);
    }

    /// Append `(length, code point, payload)`; the length covers the 6-byte prefix
    pub fn add_parameter(&mut self, code_point: u16, payload: &[u8]) {
        self.add_parameter_with(code_point, |out| write_bytes_fix(out, payload));
    }

    fn add_parameter_with(&mut self, code_point: u16, write: impl FnOnce(&mut Vec<u8>)) {
        let start = self.buffer.len();
        write_int_4(&mut self.buffer, 0);
        write_int_2(&mut self.buffer, code_point);
        write(&mut *self.buffer);
        let length = (self.buffer.len() - start) as u32;
        put_u32(&mut self.buffer, start, length);
        self.parameter_count += 1;
    }

    pub fn add_u8(&mut self, code_point: u16, value: u8) {
        self.add_parameter_with(code_point, |out| write_int_1(out, value));
    }

    pub fn add_u16(&mut self, code_point: u16, value: u16) {
        self.add_parameter_with(code_point, |out| write_int_2(out, value));
    }

    pub fn add_u32(&mut self, code_point: u16, value: u32) {
        self.add_parameter_with(code_point, |out| write_int_4(out, value));
    }

    pub fn add_i32(&mut self, code_point: u16, value: i32) {
        self.add_parameter_with(code_point, |out| write_sint_4(out, value));
    }

    /// `code u16 | distance i32`
    pub fn add_scroll(&mut self, code: u16, distance: i32) {
        self.add_parameter_with(request_cp::SCROLL_ORIENTATION, |out| {
            write_int_2(out, code);
            write_sint_4(out, distance);
        });
    }

    /// `ccsid u16 | bytes`
    pub fn add_fixed_string(&mut self, code_point: u16, text: &str, converter: &dyn CharConverter) {
        let bytes = converter.to_host(text);
        self.add_parameter_with(code_point, |out| {
            write_int_2(out, converter.ccsid());
            write_bytes_fix(out, &bytes);
        });
    }

    /// `ccsid u16 | length u16 | bytes`
    pub fn add_var_string(
        &mut self,
        code_point: u16,
        text: &str,
        converter: &dyn CharConverter,
    ) -> Result<()> {
        let bytes = converter.to_host(text);
        let len = u16::try_from(bytes.len()).map_err(|_| {
            Error::BadUsageError(format!("string parameter too long: {} bytes", bytes.len()))
        })?;
        self.add_parameter_with(code_point, |out| {
            write_int_2(out, converter.ccsid());
            write_int_2(out, len);
            write_bytes_fix(out, &bytes);
        });
        Ok(())
    }

    /// `ccsid u16 | count u16 | { indicator u8 | length u16 | name }*`
    pub fn add_library_list(
        &mut self,
        libraries: &[LibraryEntry<'_>],
        converter: &dyn CharConverter,
    ) -> Result<()> {
        let count = u16::try_from(libraries.len())
            .map_err(|_| Error::BadUsageError("library list too long".to_string()))?;
        let mut encoded = Vec::with_capacity(libraries.len());
        for lib in libraries {
            let name = converter.to_host(lib.name);
            let len = u16::try_from(name.len()).map_err(|_| {
                Error::BadUsageError(format!("library name too long: {}", lib.name))
            })?;
            encoded.push((lib.indicator, len, name));
        }
        self.add_parameter_with(request_cp::LIBRARY_LIST, |out| {
            write_int_2(out, converter.ccsid());
            write_int_2(out, count);
            for (indicator, len, name) in &encoded {
                write_int_1(out, *indicator);
                write_int_2(out, *len);
                write_bytes_fix(out, name);
            }
        });
        Ok(())
    }

    /// Write total length and parameter count
    pub fn finalize(&mut self) {
        let len = self.buffer.len() as u32;
        put_u32(&mut self.buffer, TOTAL_LENGTH_OFFSET, len);
        put_u16(&mut self.buffer, PARAMETER_COUNT_OFFSET, self.parameter_count);
    }

    /// Mark the frame as a compression candidate
    pub fn compress(&mut self) {
        self.compress = true;
    }

    pub fn is_compression_candidate(&self) -> bool {
        self.compress
    }

    /// Finalize and return the bytes to put on the wire
    ///
    /// A candidate frame is RLE-compressed when its variable region reaches
    /// [`COMPRESSION_THRESHOLD`] and the encoding comes out smaller.
    pub fn encoded(&mut self) -> Result<&[u8]> {
        self.finalize();
        RequestTemplate::from_bytes_mut(&mut self.buffer)?.set_compressed(false);

        let var_len = self.variable_length();
        if !self.compress || var_len < COMPRESSION_THRESHOLD {
            return Ok(self.buffer.as_slice());
        }

        let mut out = match self.compressed.take() {
            Some(buf) => buf,
            None => self.pool.get_buffer(),
        };
        if compress_frame(&self.buffer, &mut out)? {
            debug!(var_len, compressed_len = out.len(), "request compressed");
            Ok(self.compressed.insert(out).as_slice())
        } else {
            debug!(var_len, "request compression abandoned");
            self.compressed = Some(out);
            Ok(self.buffer.as_slice())
        }
    }

    /// Encode and write the frame while holding the connection's write lock
    pub fn send<W: Write>(&mut self, writer: &Mutex<W>) -> Result<()> {
        let bytes = self.encoded()?;
        let mut writer = writer
            .lock()
            .map_err(|_| Error::LibraryBug(eyre!("connection writer lock poisoned")))?;
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for RequestFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFrame")
            .field("operation", &self.operation)
            .field("parameter_count", &self.parameter_count)
            .field("length", &self.buffer.len())
            .field("compress", &self.compress)
            .finish()
    }
}
