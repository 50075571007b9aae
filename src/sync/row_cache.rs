//! Scrollable, blocked cursor over fetched rows.
//!
//! The cache holds at most one block of rows (one pooled reply) and knows
//! where that block sits in the result set only as far as the fetches that
//! produced it allow. The server cursor sits on the last row of the cached
//! block, or on the matching sentinel when the block is empty. Local moves
//! inside the block leave the server cursor where it is, so a fetch that
//! depends on the current row first repositions the server when more than
//! one row is cached.

use smart_default::SmartDefault;
use tracing::debug;

use crate::buffer_pool::PooledReply;
use crate::constant::OperationId;
use crate::error::{Error, Result, ServerWarning, eyre};
use crate::protocol::fetch::{FetchAmount, FetchRequest, FetchStatus, ScrollOrientation, classify};
use crate::protocol::result_data::ResultData;
use crate::protocol::r#trait::Exchange;
use crate::row::RowFormat;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    #[default]
    ReadOnly,
    Updatable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sensitivity {
    #[default]
    Insensitive,
    Sensitive,
}

/// Who receives server warnings raised by fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarningTarget {
    #[default]
    Cursor,
    Connection,
}

#[derive(Debug, Clone, SmartDefault)]
pub struct CursorSettings {
    pub rpb_handle: u16,
    pub ors_handle: u16,
    /// Rows per forward block fetch
    #[default = 32]
    pub blocking_factor: u32,
    /// Server buffer cap in bytes; replaces the blocking factor when set
    pub buffer_size: Option<u32>,
    pub concurrency: Concurrency,
    pub sensitivity: Sensitivity,
    pub scrollable: bool,
    pub variable_field_compression: bool,
    pub reply_compression: bool,
    pub warning_target: WarningTarget,
}

/// Row number of the first cached row
///
/// With an empty block at after-last, `Row(n)` names the sentinel itself:
/// one past the last row of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstRowPosition {
    Unknown,
    BeforeFirst,
    Row(u64),
}

impl FirstRowPosition {
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    fn row(n: i64) -> Self {
        if n >= 1 {
            Self::Row(n as u64)
        } else {
            Self::Unknown
        }
    }
}

/// Observable cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheState {
    pub index: isize,
    pub count: usize,
    pub first_block: bool,
    pub last_block: bool,
    pub first_row: FirstRowPosition,
}

struct RowBlock {
    reply: PooledReply,
    data: ResultData,
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Fetched {
    rows: usize,
    end: bool,
}

pub struct RowCache<E: Exchange> {
    exchange: E,
    settings: CursorSettings,
    block: Option<RowBlock>,
    format: Option<RowFormat>,
    /// -1 before the block's first row, `count` after its last
    index: isize,
    first_block: bool,
    last_block: bool,
    first_row: FirstRowPosition,
    server_closed: bool,
    known_empty: bool,
    saw_rows: bool,
    generation: u64,
    fetch_count: usize,
    closed: bool,
    warnings: Vec<ServerWarning>,
}

impl<E: Exchange> RowCache<E> {
    /// Cache for a freshly opened cursor
    ///
    /// `initial` is the reply of the open, if it carried rows; without it the
    /// server cursor is before the first row.
    pub fn new(exchange: E, settings: CursorSettings, initial: Option<PooledReply>) -> Result<Self> {
        let mut cache = Self {
            exchange,
            settings,
            block: None,
            format: None,
            index: -1,
            first_block: true,
            last_block: false,
            first_row: FirstRowPosition::BeforeFirst,
            server_closed: false,
            known_empty: false,
            saw_rows: false,
            generation: 0,
            fetch_count: 0,
            closed: false,
            warnings: Vec::new(),
        };
        if let Some(reply) = initial {
            let fetched = cache.accept(reply, true)?;
            if fetched.rows > 0 {
                cache.first_row = FirstRowPosition::Row(1);
                cache.last_block = fetched.end;
            } else {
                cache.known_empty = fetched.end;
                cache.last_block = fetched.end;
            }
        }
        Ok(cache)
    }

    /// Use a format described before the first fetch
    pub fn set_format(&mut self, format: RowFormat) {
        self.format = Some(format);
    }

    pub fn format(&self) -> Option<&RowFormat> {
        self.format.as_ref()
    }

    pub fn exchange(&mut self) -> &mut E {
        &mut self.exchange
    }

    pub fn settings(&self) -> &CursorSettings {
        &self.settings
    }

    fn count(&self) -> usize {
        self.block.as_ref().map_or(0, |b| b.data.row_count())
    }

    pub fn state(&self) -> CacheState {
        CacheState {
            index: self.index,
            count: self.count(),
            first_block: self.first_block,
            last_block: self.last_block,
            first_row: self.first_row,
        }
    }

    pub fn first_row_position(&self) -> FirstRowPosition {
        self.first_row
    }

    /// Round trips issued so far, positioning included
    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }

    pub fn warnings(&self) -> &[ServerWarning] {
        &self.warnings
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_before_first(&self) -> bool {
        self.index == -1
    }

    pub fn is_after_last(&self) -> bool {
        self.index >= 0 && self.index as usize == self.count()
    }

    /// 1-based row number of the current row, when known
    pub fn current_row(&self) -> Option<u64> {
        let index = self.row_index()?;
        match self.first_row {
            FirstRowPosition::Row(p) => Some(p + index as u64),
            _ => None,
        }
    }

    fn row_index(&self) -> Option<usize> {
        (self.index >= 0 && (self.index as usize) < self.count()).then_some(self.index as usize)
    }

    fn has_row(&self) -> bool {
        self.row_index().is_some()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::BadUsageError("row cache is closed".to_string()));
        }
        Ok(())
    }

    fn ensure_scrollable(&self, operation: &str) -> Result<()> {
        self.ensure_open()?;
        if !self.settings.scrollable {
            return Err(Error::BadUsageError(format!(
                "{} on a forward-only cursor",
                operation
            )));
        }
        Ok(())
    }

    fn block_amount(&self) -> FetchAmount {
        match self.settings.buffer_size {
            Some(bytes) => FetchAmount::BufferSize(bytes),
            None => FetchAmount::Rows(self.settings.blocking_factor),
        }
    }

    fn replace_block(&mut self, block: Option<RowBlock>) {
        if let Some(format) = self.format.as_mut() {
            format.unbind();
        }
        self.block = block;
    }

    fn route_warning(&mut self, warning: ServerWarning) {
        match self.settings.warning_target {
            WarningTarget::Cursor => self.warnings.push(warning),
            WarningTarget::Connection => self.exchange.connection_warning(warning),
        }
    }

    #[tracing::instrument(skip_all, fields(orientation = ?orientation, amount = ?amount))]
    fn fetch(&mut self, orientation: ScrollOrientation, amount: FetchAmount) -> Result<Fetched> {
        if self.server_closed {
            debug!("server cursor closed, fetch skipped");
            if amount != FetchAmount::Positioning {
                self.replace_block(None);
            }
            return Ok(Fetched { rows: 0, end: true });
        }

        let request = FetchRequest {
            orientation,
            amount,
            rpb_handle: self.settings.rpb_handle,
            ors_handle: self.settings.ors_handle,
            want_format: self.format.is_none(),
            variable_field_compression: self.settings.variable_field_compression,
            reply_compression: self.settings.reply_compression,
        };
        let mut frame = self.exchange.new_request(OperationId::Fetch);
        request.write(&mut frame);
        let reply = self.exchange.exchange(frame)?;
        self.fetch_count += 1;

        self.accept(reply, request.returns_rows())
    }

    /// Classify a fetch reply and install its rows as the new block
    fn accept(&mut self, reply: PooledReply, returns_rows: bool) -> Result<Fetched> {
        let end = match classify(&reply, self.exchange.converters())? {
            FetchStatus::Rows => false,
            FetchStatus::EndOfData => true,
            FetchStatus::CursorClosed => {
                debug!("server cursor already closed");
                self.server_closed = true;
                true
            }
            FetchStatus::Warning(warning) => {
                self.route_warning(warning);
                false
            }
        };
        if !returns_rows {
            return Ok(Fetched { rows: 0, end });
        }

        if self.format.is_none()
            && let Some(format) = reply.data_format(self.exchange.converters())?
        {
            self.format = Some(RowFormat::from_descriptor(format.fields));
        }

        let Some(data) = reply.result_data()? else {
            self.replace_block(None);
            return Ok(Fetched { rows: 0, end: true });
        };
        let rows = data.row_count();
        if rows == 0 {
            self.replace_block(None);
            return Ok(Fetched { rows: 0, end: true });
        }
        if self.format.is_none() {
            return Err(Error::LibraryBug(eyre!(
                "result data arrived before any data format"
            )));
        }

        self.generation += 1;
        self.saw_rows = true;
        let block = RowBlock {
            reply,
            data,
            generation: self.generation,
        };
        self.replace_block(Some(block));
        Ok(Fetched { rows, end })
    }

    fn set_before_first(&mut self) {
        self.replace_block(None);
        self.index = -1;
        self.first_row = FirstRowPosition::BeforeFirst;
        self.first_block = true;
        self.last_block = self.known_empty;
    }

    fn set_after_last(&mut self, sentinel: FirstRowPosition) {
        self.replace_block(None);
        self.index = 0;
        self.first_row = sentinel;
        self.first_block = self.known_empty;
        self.last_block = true;
    }

    /// A single-row block just arrived at `position`
    fn set_single_row(&mut self, position: FirstRowPosition) {
        self.index = 0;
        self.first_row = position;
        self.first_block = position == FirstRowPosition::Row(1);
        self.last_block = false;
    }

    /// Move the server cursor to the cached row at `anchor` when it may have drifted
    fn resync(&mut self, anchor: usize, operation: &str) -> Result<()> {
        let count = self.count();
        if count <= 1 {
            return Ok(());
        }
        let FirstRowPosition::Row(p) = self.first_row else {
            return Err(Error::LibraryBug(eyre!(
                "{}: {} rows cached at an unknown position",
                operation,
                count
            )));
        };
        let target = p + anchor as u64;
        debug!(target, "resynchronize server cursor");
        self.fetch(
            ScrollOrientation::Direct(target as i32),
            FetchAmount::Positioning,
        )?;
        Ok(())
    }

    /// Advance to the next row; `false` once after-last
    pub fn next(&mut self) -> Result<bool> {
        self.ensure_open()?;
        let count = self.count() as isize;
        if self.index < count - 1 {
            self.index += 1;
            return Ok(true);
        }
        if self.last_block {
            self.index = count;
            return Ok(false);
        }

        let prior = self.first_row;
        let amount = if prior.is_known() {
            self.block_amount()
        } else {
            FetchAmount::Single
        };
        let fetched = self.fetch(ScrollOrientation::Next, amount)?;
        let advanced = match prior {
            FirstRowPosition::Row(p) => FirstRowPosition::Row(p + count as u64),
            FirstRowPosition::BeforeFirst => FirstRowPosition::Row(1),
            FirstRowPosition::Unknown => FirstRowPosition::Unknown,
        };

        if fetched.rows == 0 {
            if prior == FirstRowPosition::BeforeFirst && !self.saw_rows {
                self.known_empty = true;
            }
            self.set_after_last(advanced);
            return Ok(false);
        }
        self.index = 0;
        self.first_row = advanced;
        self.first_block = advanced == FirstRowPosition::Row(1);
        self.last_block = fetched.end;
        Ok(true)
    }

    /// Step back one row; `false` once before-first
    pub fn previous(&mut self) -> Result<bool> {
        self.ensure_scrollable("previous")?;
        if self.index > 0 {
            self.index -= 1;
            return Ok(true);
        }
        if self.first_block {
            self.index = -1;
            return Ok(false);
        }

        let was_after_last = self.is_after_last();
        self.resync(0, "previous")?;
        let fetched = self.fetch(ScrollOrientation::Previous, FetchAmount::Single)?;
        if fetched.rows == 0 {
            self.set_before_first();
            return Ok(false);
        }
        let position = match self.first_row {
            FirstRowPosition::Row(p) => FirstRowPosition::row(p as i64 - 1),
            _ => FirstRowPosition::Unknown,
        };
        self.set_single_row(position);
        self.last_block = was_after_last;
        Ok(true)
    }

    /// Move to row `n`, counting from the end when negative; 0 is before-first
    pub fn absolute(&mut self, n: i64) -> Result<bool> {
        self.ensure_scrollable("absolute")?;
        if n == 0 {
            self.before_first(false)?;
            return Ok(false);
        }

        let count = self.count() as i64;
        if let FirstRowPosition::Row(p) = self.first_row {
            let p = p as i64;
            if n > 0 && p <= n && n < p + count {
                self.index = (n - p) as isize;
                return Ok(true);
            }
        }
        if n < 0 && self.last_block && -n <= count {
            self.index = (count + n) as isize;
            return Ok(true);
        }

        let direct = self.settings.concurrency == Concurrency::ReadOnly
            && self.settings.sensitivity == Sensitivity::Insensitive;
        let distance = i32::try_from(n)
            .map_err(|_| Error::BadUsageError(format!("row {} out of range", n)))?;
        let fetched = if direct {
            self.fetch(ScrollOrientation::Direct(distance), FetchAmount::Single)?
        } else if n > 0 {
            self.fetch(ScrollOrientation::First, FetchAmount::Positioning)?;
            self.fetch(ScrollOrientation::Relative(distance - 1), FetchAmount::Single)?
        } else {
            self.fetch(ScrollOrientation::Last, FetchAmount::Positioning)?;
            self.fetch(ScrollOrientation::Relative(distance + 1), FetchAmount::Single)?
        };

        if fetched.rows == 0 {
            if n > 0 {
                self.set_after_last(FirstRowPosition::Unknown);
            } else {
                self.set_before_first();
            }
            return Ok(false);
        }
        self.set_single_row(FirstRowPosition::row(n));
        self.last_block = n == -1;
        Ok(true)
    }

    /// Move `n` rows from the current position
    pub fn relative(&mut self, n: i64) -> Result<bool> {
        self.ensure_open()?;
        if n == 0 {
            return Ok(self.has_row());
        }
        self.ensure_scrollable("relative")?;

        let count = self.count() as i64;
        let target = self.index as i64 + n;
        if (0..count).contains(&target) {
            self.index = target as isize;
            return Ok(true);
        }
        if target >= count && self.last_block {
            self.index = count as isize;
            return Ok(false);
        }
        if target < 0 && self.first_block {
            self.index = -1;
            return Ok(false);
        }

        // base: row number the server will move from
        let (base, delta) = if count > 0 {
            let anchor = (self.index as i64).clamp(0, count - 1);
            self.resync(anchor as usize, "relative")?;
            let delta = if self.index < 0 {
                n - 1
            } else if self.index as i64 >= count {
                n + 1
            } else {
                n
            };
            let base = match self.first_row {
                FirstRowPosition::Row(p) => Some(p as i64 + anchor),
                _ => None,
            };
            (base, delta)
        } else {
            let base = match self.first_row {
                FirstRowPosition::Row(q) => Some(q as i64),
                FirstRowPosition::BeforeFirst => Some(0),
                FirstRowPosition::Unknown => None,
            };
            (base, n)
        };

        let distance = i32::try_from(delta)
            .map_err(|_| Error::BadUsageError(format!("distance {} out of range", n)))?;
        let fetched = self.fetch(ScrollOrientation::Relative(distance), FetchAmount::Single)?;
        if fetched.rows == 0 {
            if delta > 0 {
                self.set_after_last(FirstRowPosition::Unknown);
            } else {
                self.set_before_first();
            }
            return Ok(false);
        }
        let position = base.map_or(FirstRowPosition::Unknown, |b| FirstRowPosition::row(b + delta));
        self.set_single_row(position);
        Ok(true)
    }

    /// Move to the first row
    ///
    /// Without `force`, a cached first block is reused.
    pub fn first(&mut self, force: bool) -> Result<bool> {
        self.ensure_scrollable("first")?;
        if !force {
            if self.first_block && self.count() > 0 {
                self.index = 0;
                return Ok(true);
            }
            if self.known_empty {
                self.set_before_first();
                return Ok(false);
            }
        }

        let fetched = self.fetch(ScrollOrientation::First, FetchAmount::Single)?;
        if fetched.rows == 0 {
            self.known_empty = true;
            self.set_before_first();
            return Ok(false);
        }
        self.set_single_row(FirstRowPosition::Row(1));
        Ok(true)
    }

    /// Move to the last row
    ///
    /// Without `force`, a cached last block is reused.
    pub fn last(&mut self, force: bool) -> Result<bool> {
        self.ensure_scrollable("last")?;
        if !force {
            let count = self.count();
            if self.last_block && count > 0 {
                self.index = count as isize - 1;
                return Ok(true);
            }
            if self.known_empty {
                self.set_before_first();
                return Ok(false);
            }
        }

        let fetched = self.fetch(ScrollOrientation::Last, FetchAmount::Single)?;
        if fetched.rows == 0 {
            self.known_empty = true;
            self.set_before_first();
            return Ok(false);
        }
        self.set_single_row(FirstRowPosition::Unknown);
        self.last_block = true;
        Ok(true)
    }

    /// Position before the first row
    pub fn before_first(&mut self, force: bool) -> Result<()> {
        self.ensure_scrollable("before_first")?;
        if !force && self.first_block {
            self.index = -1;
            return Ok(());
        }
        self.fetch(ScrollOrientation::BeforeFirst, FetchAmount::Positioning)?;
        self.set_before_first();
        Ok(())
    }

    /// Position after the last row
    pub fn after_last(&mut self, force: bool) -> Result<()> {
        self.ensure_scrollable("after_last")?;
        if !force && self.last_block {
            self.index = self.count() as isize;
            return Ok(());
        }
        self.fetch(ScrollOrientation::AfterLast, FetchAmount::Positioning)?;
        self.set_after_last(FirstRowPosition::Unknown);
        Ok(())
    }

    /// Whether the result set has no rows
    ///
    /// Probes the server until a row has been seen or emptiness confirmed.
    /// An answer from an earlier positioning fetch that found no row proves
    /// nothing, so a scrollable cursor asks for row 1. The probe leaves the
    /// cursor before the first row.
    pub fn is_empty(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if self.count() > 0 || self.saw_rows {
            return Ok(false);
        }
        if self.known_empty {
            return Ok(true);
        }
        if !self.settings.scrollable {
            let found = self.next()?;
            if found {
                self.index = -1;
            }
            return Ok(!found);
        }

        let fetched = self.fetch(ScrollOrientation::First, FetchAmount::Single)?;
        if fetched.rows == 0 {
            self.known_empty = true;
            self.set_before_first();
            return Ok(true);
        }
        self.set_single_row(FirstRowPosition::Row(1));
        self.last_block = fetched.end;
        self.index = -1;
        Ok(false)
    }

    fn current_index(&self) -> Result<usize> {
        self.ensure_open()?;
        self.row_index()
            .ok_or_else(|| Error::BadUsageError("no current row".to_string()))
    }

    /// Decoded value of `field` in the current row
    pub fn value(&mut self, field: usize) -> Result<&Value> {
        let row = self.current_index()?;
        let block = self
            .block
            .as_ref()
            .ok_or_else(|| Error::LibraryBug(eyre!("current row without a cached block")))?;
        let format = self
            .format
            .as_mut()
            .ok_or_else(|| Error::LibraryBug(eyre!("cached rows without a data format")))?;
        format.bind((block.generation, row), &block.data, block.reply.bytes())?;
        format.decode(field, &block.data, block.reply.bytes(), self.exchange.converters())
    }

    pub fn is_null(&mut self, field: usize) -> Result<bool> {
        let row = self.current_index()?;
        let block = self
            .block
            .as_ref()
            .ok_or_else(|| Error::LibraryBug(eyre!("current row without a cached block")))?;
        let format = self
            .format
            .as_mut()
            .ok_or_else(|| Error::LibraryBug(eyre!("cached rows without a data format")))?;
        format.bind((block.generation, row), &block.data, block.reply.bytes())?;
        format.is_null(field, &block.data, block.reply.bytes())
    }

    pub fn find_field(&mut self, name: &str) -> Option<usize> {
        self.format.as_mut()?.find_field(name)
    }

    /// Release the cached block; later calls fail with `BadUsageError`
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.replace_block(None);
        self.index = -1;
        self.closed = true;
    }
}

impl<E: Exchange> std::fmt::Debug for RowCache<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowCache")
            .field("state", &self.state())
            .field("server_closed", &self.server_closed)
            .field("known_empty", &self.known_empty)
            .field("fetch_count", &self.fetch_count)
            .field("closed", &self.closed)
            .finish()
    }
}
