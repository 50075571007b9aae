use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::buffer_pool::{BufferPool, PooledReply, ReplyPool};
use crate::ccsid::{CharConverter, ConverterTable};
use crate::constant::OperationId;
use crate::error::{Error, Result, ServerWarning};
use crate::opts::Opts;
use crate::protocol::request::RequestFrame;
use crate::protocol::r#trait::Exchange;
use crate::sync::row_cache::{CursorSettings, RowCache};

const REPLY_POOL_CAPACITY: usize = 8;

/// Blocking connection to the database host server
///
/// The write half sits behind a shared lock so request frames from several
/// owners of one socket are never interleaved.
pub struct Conn<R: Read = TcpStream, W: Write = TcpStream> {
    reader: BufReader<R>,
    writer: Arc<Mutex<W>>,
    buffer_pool: Arc<BufferPool>,
    reply_pool: Arc<ReplyPool>,
    opts: Opts,
    correlation_id: u32,
    warnings: Vec<ServerWarning>,
    converters: ConverterTable,
}

impl Conn {
    /// Open a TCP connection from connection options
    ///
    /// Sign-on and server attribute exchange belong to the session layer.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts: Opts = opts.try_into()?;
        let host = opts.host.as_ref().ok_or_else(|| {
            Error::BadConfigError("Missing host in connection options".to_string())
        })?;

        let stream = TcpStream::connect((host.as_str(), opts.port))?;
        stream.set_nodelay(opts.tcp_nodelay)?;
        let writer = stream.try_clone()?;
        Ok(Self::from_parts(stream, Arc::new(Mutex::new(writer)), opts))
    }
}

impl<R: Read, W: Write> Conn<R, W> {
    pub fn from_parts(reader: R, writer: Arc<Mutex<W>>, opts: Opts) -> Self {
        let buffer_pool = Arc::clone(&opts.buffer_pool);
        let reply_pool = Arc::new(ReplyPool::new(
            REPLY_POOL_CAPACITY,
            Arc::clone(&buffer_pool),
        ));
        Self {
            reader: BufReader::new(reader),
            writer,
            buffer_pool,
            reply_pool,
            opts,
            correlation_id: 0,
            warnings: Vec::new(),
            converters: ConverterTable::default(),
        }
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// The shared write half, for other users of the same socket
    pub fn writer(&self) -> &Arc<Mutex<W>> {
        &self.writer
    }

    pub fn converters_mut(&mut self) -> &mut ConverterTable {
        &mut self.converters
    }

    /// Converter for client strings sent to the host, chosen by `Opts::ccsid`
    pub fn string_converter(&self) -> Result<&dyn CharConverter> {
        self.converters.get(self.opts.ccsid)
    }

    /// Append a variable-length string parameter in the connection's CCSID
    pub fn add_string(&self, request: &mut RequestFrame, code_point: u16, text: &str) -> Result<()> {
        request.add_var_string(code_point, text, self.string_converter()?)
    }

    /// Warnings not owned by any cursor
    pub fn warnings(&self) -> &[ServerWarning] {
        &self.warnings
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    /// Cursor settings derived from the connection options
    pub fn cursor_settings(&self, rpb_handle: u16, ors_handle: u16) -> Result<CursorSettings> {
        let buffer_size = if self.opts.variable_field_compression {
            Some(self.opts.block_size_bytes()?)
        } else {
            None
        };
        Ok(CursorSettings {
            rpb_handle,
            ors_handle,
            blocking_factor: self.opts.blocking_factor,
            buffer_size,
            variable_field_compression: self.opts.variable_field_compression,
            reply_compression: self.opts.data_compression,
            ..Default::default()
        })
    }

    /// Row cache over a cursor opened by an earlier open/describe/fetch
    ///
    /// `initial` is that reply; its data format and rows seed the cache.
    pub fn row_cache(
        &mut self,
        settings: CursorSettings,
        initial: Option<PooledReply>,
    ) -> Result<RowCache<&mut Self>> {
        RowCache::new(self, settings, initial)
    }
}

impl<R: Read, W: Write> Exchange for Conn<R, W> {
    fn new_request(&mut self, operation: OperationId) -> RequestFrame {
        let mut request = RequestFrame::new(&self.buffer_pool, operation);
        if self.opts.data_compression {
            request.compress();
        }
        request
    }

    #[tracing::instrument(skip_all, fields(operation = ?request.operation()))]
    fn exchange(&mut self, mut request: RequestFrame) -> Result<PooledReply> {
        self.correlation_id = self.correlation_id.wrapping_add(1);
        let id = self.correlation_id;
        request.set_correlation_id(id);
        request.send(&self.writer)?;
        drop(request);

        let mut reply = self.reply_pool.get_reply();
        reply.read_from(&mut self.reader)?;
        if reply.correlation_id() != id {
            warn!(
                expected = id,
                actual = reply.correlation_id(),
                "reply correlation id mismatch"
            );
            return Err(Error::InvalidPacket);
        }
        Ok(reply)
    }

    fn converters(&self) -> &ConverterTable {
        &self.converters
    }

    fn connection_warning(&mut self, warning: ServerWarning) {
        warn!(%warning, "server warning");
        self.warnings.push(warning);
    }
}
