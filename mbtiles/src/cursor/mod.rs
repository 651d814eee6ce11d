use crate::codec::Decodable;
use crate::coord::{DataTile, TmsCoord};
use crate::error::{MbtilesError, Result};
use crate::handle::MbtilesHandle;
use crate::schema::{SCAN_TILES_PAGE, SELECT_TILE};
use rusqlite::{named_params, Statement};
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::marker::PhantomData;

pub const DEFAULT_PAGE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Positioned before the first row.
    Created,
    /// At least one tile has been returned since the last reset.
    Open,
    /// The scan has run out; `next` keeps returning `None` until reset.
    Exhausted,
}

/// Ordered, resumable scan over every tile in a file.
///
/// Walks the `tiles` table in ascending `(zoom_level, tile_column, tile_row)`
/// order, the row being the stored TMS row. Rows are pulled one page at a
/// time, each page bounded by the last position seen, so no engine iterator
/// is held between calls. A page never splits the rows stored at one
/// coordinate, so tables without a unique index stream every row.
///
/// The cursor borrows its handle, so the handle cannot be closed while the
/// cursor is alive. [`TileCursor::end`] finalizes the scan early.
pub struct TileCursor<'h, T> {
    stmt: Statement<'h>,
    /// Reads every row stored at one coordinate.
    group_stmt: Statement<'h>,
    page: VecDeque<(TmsCoord, Vec<u8>)>,
    /// Last coordinate fetched from the engine; the next page starts after it.
    position: Option<TmsCoord>,
    /// The last page came back short, so the engine has nothing further.
    drained: bool,
    page_size: usize,
    state: CursorState,
    _payload: PhantomData<fn() -> T>,
}

impl MbtilesHandle {
    /// Start an ordered scan over all tiles. The cursor must be ended (or
    /// dropped) before this handle can be closed.
    pub fn start_stream<T: Decodable>(&self) -> Result<TileCursor<'_, T>> {
        let stmt = self.connection().prepare(SCAN_TILES_PAGE)?;
        let group_stmt = self.connection().prepare(SELECT_TILE)?;
        log::debug!("Started tile stream over {}", self.path().display());
        Ok(TileCursor {
            stmt,
            group_stmt,
            page: VecDeque::new(),
            position: None,
            drained: false,
            page_size: DEFAULT_PAGE_SIZE,
            state: CursorState::Created,
            _payload: PhantomData,
        })
    }
}

impl<'h, T: Decodable> TileCursor<'h, T> {
    /// Number of rows fetched per engine round trip. Values below 1 are
    /// raised to 1.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Advance one tile. Returns `Ok(None)` once the scan is exhausted, and
    /// keeps doing so until [`reset`](Self::reset).
    pub fn next_tile(&mut self) -> Result<Option<DataTile<T>>> {
        if self.state == CursorState::Exhausted {
            return Ok(None);
        }

        if self.page.is_empty() && !self.drained {
            self.fetch_page()?;
        }

        let Some((tms, bytes)) = self.page.pop_front() else {
            self.state = CursorState::Exhausted;
            return Ok(None);
        };
        self.state = CursorState::Open;

        let coord = tms.to_xyz();
        let data = T::decode(bytes).map_err(|source| MbtilesError::Decode { coord, source })?;
        Ok(Some(DataTile::new(coord, data)))
    }

    /// Reposition before the first row. The next call to
    /// [`next_tile`](Self::next_tile) replays the scan from the start.
    pub fn reset(&mut self) {
        self.page.clear();
        self.position = None;
        self.drained = false;
        self.state = CursorState::Created;
    }

    /// Finalize the scan statements.
    pub fn end(self) -> Result<()> {
        self.stmt.finalize()?;
        self.group_stmt.finalize()?;
        Ok(())
    }

    fn fetch_page(&mut self) -> Result<()> {
        // Stored coordinates are non-negative, so (-1, -1, -1) precedes them all.
        let (zoom, column, row) = match self.position {
            Some(p) => (i64::from(p.zoom), i64::from(p.column), i64::from(p.row)),
            None => (-1, -1, -1),
        };
        let page_size = i64::try_from(self.page_size).unwrap_or(i64::MAX);

        let mut rows = self.stmt.query(named_params! {
            ":zoom_level": zoom,
            ":tile_column": column,
            ":tile_row": row,
            ":page_size": page_size,
        })?;

        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            let tms = TmsCoord::new(row.get(0)?, row.get(1)?, row.get(2)?);
            let data: Option<Vec<u8>> = row.get(3)?;
            self.page.push_back((tms, data.unwrap_or_default()));
            fetched += 1;
        }
        drop(rows);

        let Some(&(last, _)) = self.page.back() else {
            self.drained = true;
            return Ok(());
        };
        self.position = Some(last);
        self.drained = fetched < self.page_size;

        // A full page may have cut the rows at its last coordinate short.
        // Re-read that coordinate whole, since the next page starts after it.
        if !self.drained {
            while self.page.back().is_some_and(|(tms, _)| *tms == last) {
                self.page.pop_back();
            }
            let mut rows = self.group_stmt.query(named_params! {
                ":zoom_level": last.zoom,
                ":tile_column": last.column,
                ":tile_row": last.row,
            })?;
            while let Some(row) = rows.next()? {
                let data: Option<Vec<u8>> = row.get(0)?;
                self.page.push_back((last, data.unwrap_or_default()));
            }
        }
        Ok(())
    }
}

impl<'h, T: Decodable> Iterator for TileCursor<'h, T> {
    type Item = Result<DataTile<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tile().transpose()
    }
}

impl<'h, T: Decodable> FusedIterator for TileCursor<'h, T> {}
