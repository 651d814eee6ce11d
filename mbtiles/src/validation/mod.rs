use crate::error::{MbtilesError, Result};
use crate::metadata::Metadata;
use crate::schema::{METADATA_COLUMNS, METADATA_TABLE, TILES_COLUMNS, TILES_TABLE};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// How the underlying file is opened. Neither mode creates a missing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl OpenMode {
    pub(crate) fn flags(self) -> OpenFlags {
        let access = match self {
            OpenMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            OpenMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
        };
        access | OpenFlags::SQLITE_OPEN_NO_MUTEX
    }
}

/// Run the full pipeline against `path`, returning the open connection and
/// the metadata it holds.
///
/// Stages run cheapest first and stop at the first failure: existence, open,
/// table presence, `tiles` columns, `metadata` columns, then the required
/// metadata keys. Nothing here writes to the file.
pub fn validate(path: &Path, mode: OpenMode) -> Result<(Connection, Metadata)> {
    let conn = open_checked(path, mode)?;
    let metadata = read_metadata(&conn)?;
    log::debug!(
        "Validated {} ({} metadata entries)",
        path.display(),
        metadata.len()
    );
    Ok((conn, metadata))
}

/// Existence, open, and structural checks, without reading metadata rows.
fn open_checked(path: &Path, mode: OpenMode) -> Result<Connection> {
    if !path.exists() {
        return Err(MbtilesError::DoesNotExist {
            path: path.to_path_buf(),
        });
    }

    let conn = Connection::open_with_flags(path, mode.flags())?;
    check_schema(&conn)?;
    Ok(conn)
}

/// Table presence and column checks for both required tables.
pub fn check_schema(conn: &Connection) -> Result<()> {
    for table in [TILES_TABLE, METADATA_TABLE] {
        if !table_exists(conn, table)? {
            return Err(MbtilesError::InvalidSchema(format!(
                "missing '{table}' table"
            )));
        }
    }

    let missing = missing_columns(conn, TILES_TABLE, &TILES_COLUMNS)?;
    if !missing.is_empty() {
        return Err(MbtilesError::InvalidTiles(format!(
            "'tiles' is missing column(s): {}",
            missing.join(", ")
        )));
    }

    let missing = missing_columns(conn, METADATA_TABLE, &METADATA_COLUMNS)?;
    if !missing.is_empty() {
        return Err(MbtilesError::InvalidMetadata(format!(
            "'metadata' is missing column(s): {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

/// Read every metadata row. Rows with a NULL name or value are skipped.
pub fn read_metadata(conn: &Connection) -> Result<Metadata> {
    let mut stmt = conn.prepare("SELECT name, value FROM metadata")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        match row? {
            (Some(name), Some(value)) => entries.push((name, value)),
            (name, _) => log::debug!("Skipping metadata row with NULL field: {name:?}"),
        }
    }
    Metadata::new(entries)
}

/// Whether a table or view with this name exists.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Column names of a table or view.
pub fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let rows = stmt.query_map(params![table], |row| row.get::<_, String>(0))?;

    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }
    Ok(columns)
}

fn missing_columns(conn: &Connection, table: &str, expected: &[&str]) -> Result<Vec<String>> {
    let columns = table_columns(conn, table)?;
    Ok(expected
        .iter()
        .filter(|col| !columns.contains(**col))
        .map(|col| col.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_metadata, write_raw_mbtiles, write_sample_mbtiles};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_valid_file_passes() {
        let tmp = TempDir::new().unwrap();
        let path = write_sample_mbtiles(&tmp);

        let (_conn, metadata) = validate(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(metadata, sample_metadata());
    }

    #[test]
    fn test_paths_are_never_read_as_uris() {
        for mode in [OpenMode::ReadWrite, OpenMode::ReadOnly] {
            let flags = mode.flags();
            assert!(!flags.contains(OpenFlags::SQLITE_OPEN_URI), "{mode:?}");
            assert!(!flags.contains(OpenFlags::SQLITE_OPEN_CREATE), "{mode:?}");
        }
    }

    #[test]
    fn test_validation_is_repeatable() {
        let tmp = TempDir::new().unwrap();
        let path = write_sample_mbtiles(&tmp);

        let (_a, first) = validate(&path, OpenMode::ReadWrite).unwrap();
        let (_b, second) = validate(&path, OpenMode::ReadWrite).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = validate(&tmp.path().join("nope.mbtiles"), OpenMode::ReadWrite).unwrap_err();
        assert!(matches!(err, MbtilesError::DoesNotExist { .. }));
    }

    #[test]
    fn test_missing_tiles_table() {
        let tmp = TempDir::new().unwrap();
        let path = write_raw_mbtiles(
            &tmp,
            "CREATE TABLE metadata (name TEXT, value TEXT);",
        );
        let err = validate(&path, OpenMode::ReadWrite).unwrap_err();
        assert!(matches!(err, MbtilesError::InvalidSchema(_)));
    }

    #[test]
    fn test_missing_metadata_table() {
        let tmp = TempDir::new().unwrap();
        let path = write_raw_mbtiles(
            &tmp,
            "CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);",
        );
        let err = validate(&path, OpenMode::ReadWrite).unwrap_err();
        assert!(matches!(err, MbtilesError::InvalidSchema(_)));
    }

    #[test]
    fn test_missing_tile_data_column() {
        let tmp = TempDir::new().unwrap();
        let path = write_raw_mbtiles(
            &tmp,
            "CREATE TABLE metadata (name TEXT, value TEXT);
             CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER);",
        );
        let err = validate(&path, OpenMode::ReadWrite).unwrap_err();
        assert!(matches!(err, MbtilesError::InvalidTiles(ref msg) if msg.contains("tile_data")));
    }

    #[test]
    fn test_bad_metadata_columns() {
        let tmp = TempDir::new().unwrap();
        let path = write_raw_mbtiles(
            &tmp,
            "CREATE TABLE metadata (key TEXT, value TEXT);
             CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);",
        );
        let err = validate(&path, OpenMode::ReadWrite).unwrap_err();
        assert!(matches!(err, MbtilesError::InvalidMetadata(ref msg) if msg.contains("name")));
    }

    #[test]
    fn test_metadata_without_format() {
        let tmp = TempDir::new().unwrap();
        let path = write_raw_mbtiles(
            &tmp,
            "CREATE TABLE metadata (name TEXT, value TEXT);
             CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);
             INSERT INTO metadata VALUES ('name', 'n'), ('type', 'overlay'), ('version', '1'),
                                         ('description', 'd');",
        );
        let err = validate(&path, OpenMode::ReadWrite).unwrap_err();
        assert!(matches!(err, MbtilesError::InvalidMetadata(ref msg) if msg.contains("format")));
    }

    #[test]
    fn test_tiles_view_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let path = write_raw_mbtiles(
            &tmp,
            "CREATE TABLE metadata (name TEXT, value TEXT);
             INSERT INTO metadata VALUES ('name', 'n'), ('type', 'overlay'), ('version', '1'),
                                         ('description', 'd'), ('format', 'png');
             CREATE TABLE map (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_id TEXT);
             CREATE TABLE images (tile_id TEXT, tile_data BLOB);
             CREATE VIEW tiles AS
                 SELECT map.zoom_level AS zoom_level, map.tile_column AS tile_column,
                        map.tile_row AS tile_row, images.tile_data AS tile_data
                 FROM map JOIN images ON map.tile_id = images.tile_id;",
        );
        assert!(validate(&path, OpenMode::ReadOnly).is_ok());
    }

    #[test]
    fn test_extra_columns_are_allowed() {
        let tmp = TempDir::new().unwrap();
        let path = write_raw_mbtiles(
            &tmp,
            "CREATE TABLE metadata (name TEXT, value TEXT);
             INSERT INTO metadata VALUES ('name', 'n'), ('type', 'overlay'), ('version', '1'),
                                         ('description', 'd'), ('format', 'png');
             CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER,
                                 tile_data BLOB, updated_at TEXT);",
        );
        let (conn, _) = validate(&path, OpenMode::ReadOnly).unwrap();
        assert!(table_columns(&conn, "tiles").unwrap().contains("updated_at"));
    }
}
