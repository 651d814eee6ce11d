use crate::error::Result;
use crate::metadata::Metadata;
use crate::pool::TileConnectionManager;
use crate::schema::SELECT_TILE;
use crate::validation::{self, OpenMode};
use r2d2::PooledConnection;
use rusqlite::Connection;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const STATEMENT_CACHE_CAPACITY: usize = 16;

/// Size the statement cache and prepare the point-read statement into it.
pub(crate) fn prepare_statements(conn: &Connection) -> rusqlite::Result<()> {
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    conn.prepare_cached(SELECT_TILE)?;
    Ok(())
}

enum HandleConnection {
    Owned(Connection),
    Pooled(PooledConnection<TileConnectionManager>),
}

impl Deref for HandleConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            HandleConnection::Owned(conn) => conn,
            HandleConnection::Pooled(conn) => conn.connection(),
        }
    }
}

/// An open, validated MBTiles file.
///
/// Holds one connection and the metadata snapshot taken when the file was
/// validated. The point-read statement is prepared at open time and lives in
/// the connection's statement cache, so it never outlives the connection.
///
/// A handle is `Send` but not `Sync`: one statement cannot be stepped by two
/// callers at once. Callers sharing a handle between threads must wrap it in
/// a mutex themselves, or use [`MbtilesPool`](crate::MbtilesPool) to get one
/// handle per caller.
pub struct MbtilesHandle {
    conn: HandleConnection,
    metadata: Arc<Metadata>,
    path: PathBuf,
}

impl MbtilesHandle {
    /// Validate and open the file at `path` for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenMode::ReadWrite)
    }

    pub fn open_with(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let (conn, metadata) = validation::validate(path, mode)?;
        prepare_statements(&conn)?;
        log::debug!("Opened MBTiles handle for {}", path.display());

        Ok(MbtilesHandle {
            conn: HandleConnection::Owned(conn),
            metadata: Arc::new(metadata),
            path: path.to_path_buf(),
        })
    }

    /// Wrap a pooled connection, which the pool has already checked and
    /// prepared, with the pool's metadata snapshot.
    pub(crate) fn pooled(
        conn: PooledConnection<TileConnectionManager>,
        metadata: Arc<Metadata>,
        path: &Path,
    ) -> Self {
        MbtilesHandle {
            conn: HandleConnection::Pooled(conn),
            metadata,
            path: path.to_path_buf(),
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Release the prepared statements, then close the connection.
    ///
    /// Statement finalization cannot fail from the caller's point of view, so
    /// the connection close is always attempted and its error, if any, is
    /// the one reported. A pooled connection goes back to its pool instead.
    pub fn close(self) -> Result<()> {
        let MbtilesHandle { conn, path, .. } = self;
        match conn {
            HandleConnection::Owned(conn) => {
                conn.flush_prepared_statement_cache();
                conn.close().map_err(|(_conn, e)| {
                    log::warn!("Failed to close {}: {e}", path.display());
                    e
                })?;
                log::debug!("Closed MBTiles handle for {}", path.display());
            }
            HandleConnection::Pooled(conn) => drop(conn),
        }
        Ok(())
    }
}

impl fmt::Debug for MbtilesHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MbtilesHandle")
            .field("path", &self.path)
            .field("name", &self.metadata.name())
            .finish_non_exhaustive()
    }
}
