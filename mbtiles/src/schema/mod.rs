use crate::error::{MbtilesError, Result};
use crate::handle::MbtilesHandle;
use crate::metadata::Metadata;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;

pub const TILES_TABLE: &str = "tiles";
pub const METADATA_TABLE: &str = "metadata";

/// Columns the `tiles` table must expose.
pub const TILES_COLUMNS: [&str; 4] = ["zoom_level", "tile_column", "tile_row", "tile_data"];

/// Columns the `metadata` table must expose.
pub const METADATA_COLUMNS: [&str; 2] = ["name", "value"];

pub(crate) const SELECT_TILE: &str = "SELECT tile_data FROM tiles \
     WHERE zoom_level = :zoom_level AND tile_column = :tile_column AND tile_row = :tile_row";

pub(crate) const INSERT_TILE: &str = "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) \
     VALUES (:zoom_level, :tile_column, :tile_row, :tile_data)";

pub(crate) const UPDATE_TILE: &str = "UPDATE tiles SET tile_data = :tile_data \
     WHERE zoom_level = :zoom_level AND tile_column = :tile_column AND tile_row = :tile_row";

/// One page of the ordered full scan, strictly after the given position.
/// Rows sharing a coordinate come back in no particular order.
pub(crate) const SCAN_TILES_PAGE: &str = "SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles \
     WHERE (zoom_level, tile_column, tile_row) > (:zoom_level, :tile_column, :tile_row) \
     ORDER BY zoom_level, tile_column, tile_row \
     LIMIT :page_size";

const CREATE_TABLES: &str = "
    CREATE TABLE metadata (
        name TEXT NOT NULL,
        value TEXT
    );

    CREATE UNIQUE INDEX name ON metadata (name);

    CREATE TABLE tiles (
        zoom_level INTEGER NOT NULL,
        tile_column INTEGER NOT NULL,
        tile_row INTEGER NOT NULL,
        tile_data BLOB
    );

    CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row);
";

/// Create a new, empty MBTiles file at `path` holding `metadata`, then open it
/// through the normal validation path.
pub fn create(path: &Path, metadata: &Metadata) -> Result<MbtilesHandle> {
    if path.exists() {
        return Err(MbtilesError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }

    let mut conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.execute_batch(CREATE_TABLES)?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO metadata (name, value) VALUES (?1, ?2)")?;
        for (name, value) in metadata.iter() {
            stmt.execute(params![name, value])?;
        }
    }
    tx.commit()?;

    conn.close().map_err(|(_, e)| e)?;
    log::debug!("Created MBTiles file {}", path.display());

    MbtilesHandle::open(path)
}
