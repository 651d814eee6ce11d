use crate::error::{MbtilesError, Result};
use crate::handle;
use crate::validation::{self, OpenMode};
use parking_lot::{Condvar, Mutex};
use r2d2::{CustomizeConnection, ManageConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Caps the physical connections open against one file. A connection holds
/// its slot from just before it is opened until just after it has closed.
pub(crate) struct ConnectionSlots {
    max: usize,
    counts: Mutex<SlotCounts>,
    freed: Condvar,
}

#[derive(Default)]
struct SlotCounts {
    open: usize,
    peak: usize,
}

impl ConnectionSlots {
    pub(crate) fn new(max: usize) -> Arc<Self> {
        Arc::new(ConnectionSlots {
            max,
            counts: Mutex::new(SlotCounts::default()),
            freed: Condvar::new(),
        })
    }

    /// Block until a slot is free, then take it.
    pub(crate) fn acquire(self: &Arc<Self>) -> SlotGuard {
        let mut counts = self.counts.lock();
        while counts.open >= self.max {
            self.freed.wait(&mut counts);
        }
        counts.open += 1;
        counts.peak = counts.peak.max(counts.open);
        SlotGuard {
            slots: Arc::clone(self),
        }
    }

    pub(crate) fn open(&self) -> usize {
        self.counts.lock().open
    }

    /// Highest number of slots ever held at once.
    #[cfg(test)]
    pub(crate) fn peak(&self) -> usize {
        self.counts.lock().peak
    }
}

pub(crate) struct SlotGuard {
    slots: Arc<ConnectionSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.counts.lock().open -= 1;
        self.slots.freed.notify_one();
    }
}

/// A pooled SQLite connection tied to its slot.
pub(crate) struct TileConnection {
    conn: Connection,
    // Fields drop in order: the connection closes before the slot frees.
    _slot: SlotGuard,
}

impl TileConnection {
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Opens pooled connections through [`SqliteConnectionManager`], gating each
/// one on a free slot and checking the file's structure before handing it
/// to the pool.
pub(crate) struct TileConnectionManager {
    sqlite: SqliteConnectionManager,
    path: PathBuf,
    slots: Arc<ConnectionSlots>,
}

impl TileConnectionManager {
    pub(crate) fn new(path: &Path, mode: OpenMode, slots: Arc<ConnectionSlots>) -> Self {
        TileConnectionManager {
            sqlite: SqliteConnectionManager::file(path).with_flags(mode.flags()),
            path: path.to_path_buf(),
            slots,
        }
    }
}

impl ManageConnection for TileConnectionManager {
    type Connection = TileConnection;
    type Error = MbtilesError;

    fn connect(&self) -> Result<TileConnection> {
        let slot = self.slots.acquire();
        let conn = self.sqlite.connect()?;
        validation::check_schema(&conn)?;
        log::debug!("Opened pooled connection to {}", self.path.display());
        Ok(TileConnection { conn, _slot: slot })
    }

    fn is_valid(&self, conn: &mut TileConnection) -> Result<()> {
        self.sqlite.is_valid(&mut conn.conn)?;
        Ok(())
    }

    /// A connection handed back inside an open transaction is closed instead
    /// of being reused.
    fn has_broken(&self, conn: &mut TileConnection) -> bool {
        let broken = !conn.conn.is_autocommit();
        if broken {
            log::warn!(
                "Discarding pooled connection to {} left inside a transaction",
                self.path.display()
            );
        }
        broken
    }
}

/// Prepares the point-read statement on every new pooled connection.
#[derive(Debug)]
pub(crate) struct PrepareTileStatements;

impl CustomizeConnection<TileConnection, MbtilesError> for PrepareTileStatements {
    fn on_acquire(&self, conn: &mut TileConnection) -> Result<()> {
        handle::prepare_statements(&conn.conn)?;
        Ok(())
    }
}
