use crate::codec::{Decodable, Encodable};
use crate::coord::{DataTile, TileCoord};
use crate::error::{MbtilesError, Result};
use crate::handle::MbtilesHandle;
use crate::schema::{INSERT_TILE, SELECT_TILE, UPDATE_TILE};
use rusqlite::{named_params, CachedStatement, OptionalExtension};

/// Point and batch tile access. Every coordinate is flipped to the storage
/// convention exactly once, when it is bound. Coordinates outside their zoom
/// level's grid are never read and are rejected by writes and updates.
impl MbtilesHandle {
    /// Read and decode the tile at `coord`. `Ok(None)` means no such tile.
    /// A NULL `tile_data` is decoded as an empty payload.
    pub fn get_tile<T: Decodable>(&self, coord: TileCoord) -> Result<Option<T>> {
        if !coord.is_valid() {
            return Ok(None);
        }
        let tms = coord.to_tms();
        let mut stmt = self.connection().prepare_cached(SELECT_TILE)?;
        let bytes: Option<Option<Vec<u8>>> = stmt
            .query_row(
                named_params! {
                    ":zoom_level": tms.zoom,
                    ":tile_column": tms.column,
                    ":tile_row": tms.row,
                },
                |row| row.get(0),
            )
            .optional()?;

        match bytes {
            Some(bytes) => T::decode(bytes.unwrap_or_default())
                .map(Some)
                .map_err(|source| MbtilesError::Decode { coord, source }),
            None => Ok(None),
        }
    }

    pub fn contains_tile(&self, coord: TileCoord) -> Result<bool> {
        if !coord.is_valid() {
            return Ok(false);
        }
        let tms = coord.to_tms();
        let mut stmt = self.connection().prepare_cached(
            "SELECT 1 FROM tiles \
             WHERE zoom_level = :zoom_level AND tile_column = :tile_column AND tile_row = :tile_row",
        )?;
        let found = stmt.exists(named_params! {
            ":zoom_level": tms.zoom,
            ":tile_column": tms.column,
            ":tile_row": tms.row,
        })?;
        Ok(found)
    }

    pub fn count_tiles(&self) -> Result<u64> {
        let count: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    // ── Inserts ──────────────────────────────────────────────────────

    /// Insert a new tile. The coordinate must not already hold a tile; with
    /// the standard `tile_index` a duplicate surfaces as a SQLite constraint
    /// error. A coordinate outside the grid fails with
    /// [`MbtilesError::InvalidCoord`].
    pub fn write_tile<T: Encodable>(&self, tile: &DataTile<T>) -> Result<()> {
        let mut stmt = self.connection().prepare_cached(INSERT_TILE)?;
        bind_and_execute(&mut stmt, tile.coord, &tile.data.encode())?;
        Ok(())
    }

    /// Insert many tiles in one transaction: either all land or none do.
    pub fn write_tiles<T: Encodable>(&self, tiles: &[DataTile<T>]) -> Result<()> {
        self.execute_batch(INSERT_TILE, tiles)?;
        log::debug!("Inserted {} tiles into {}", tiles.len(), self.path().display());
        Ok(())
    }

    // ── Updates ──────────────────────────────────────────────────────

    /// Overwrite the tile at the given coordinate. Returns the number of rows
    /// changed, which is zero when no tile exists there.
    pub fn update_tile<T: Encodable>(&self, tile: &DataTile<T>) -> Result<usize> {
        let mut stmt = self.connection().prepare_cached(UPDATE_TILE)?;
        bind_and_execute(&mut stmt, tile.coord, &tile.data.encode())
    }

    /// Overwrite many tiles in one transaction, returning the total number of
    /// rows changed.
    pub fn update_tiles<T: Encodable>(&self, tiles: &[DataTile<T>]) -> Result<usize> {
        let changed = self.execute_batch(UPDATE_TILE, tiles)?;
        log::debug!(
            "Updated {changed} of {} tiles in {}",
            tiles.len(),
            self.path().display()
        );
        Ok(changed)
    }

    fn execute_batch<T: Encodable>(&self, sql: &str, tiles: &[DataTile<T>]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare_cached(sql)?;
            for tile in tiles {
                changed += bind_and_execute(&mut stmt, tile.coord, &tile.data.encode())?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }
}

fn bind_and_execute(stmt: &mut CachedStatement<'_>, coord: TileCoord, data: &[u8]) -> Result<usize> {
    if !coord.is_valid() {
        return Err(MbtilesError::InvalidCoord(coord));
    }
    let tms = coord.to_tms();
    let changed = stmt.execute(named_params! {
        ":zoom_level": tms.zoom,
        ":tile_column": tms.column,
        ":tile_row": tms.row,
        ":tile_data": data,
    })?;
    Ok(changed)
}
