use auto_impl::auto_impl;
use tracing::warn;

use crate::buffer_pool::PooledReply;
use crate::ccsid::ConverterTable;
use crate::constant::OperationId;
use crate::error::{Result, ServerWarning};
use crate::protocol::request::RequestFrame;

/// One synchronous request/reply round trip on a host connection
///
/// Cursors talk to the session only through this trait, so a row cache can
/// be driven by a live [`crate::sync::Conn`] or by an in-memory host.
#[auto_impl(&mut, Box)]
pub trait Exchange {
    /// Start a request backed by the connection's buffer pool
    fn new_request(&mut self, operation: OperationId) -> RequestFrame;

    /// Send `request` and block until its reply is read and parsed
    fn exchange(&mut self, request: RequestFrame) -> Result<PooledReply>;

    fn converters(&self) -> &ConverterTable;

    /// Warning with no cursor to attach to
    fn connection_warning(&mut self, warning: ServerWarning) {
        warn!(%warning, "server warning");
    }
}
