mod connection;

pub(crate) use connection::TileConnectionManager;

use crate::error::{MbtilesError, Result};
use crate::handle::MbtilesHandle;
use crate::metadata::Metadata;
use crate::validation::{self, OpenMode};
use connection::{ConnectionSlots, PrepareTileStatements};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Connections kept open even when idle. Opened eagerly at pool creation.
    pub min_idle: u32,
    /// How long a connection may sit idle before it is closed. Idle
    /// connections are reaped periodically, so one may outlive this by up to
    /// the reaper's interval.
    #[serde(with = "duration_secs")]
    pub max_idle_time: Duration,
    /// Upper bound on physical connections open at once, including ones that
    /// are still closing.
    pub max_size: u32,
    /// How long `checkout` waits for a free connection.
    #[serde(with = "duration_secs")]
    pub checkout_timeout: Duration,
    pub open_mode: OpenMode,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            min_idle: 1,
            max_idle_time: Duration::from_secs(300),
            max_size: 10,
            checkout_timeout: Duration::from_secs(30),
            open_mode: OpenMode::ReadWrite,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(MbtilesError::InvalidConfig(
                "max_size must be at least 1".into(),
            ));
        }
        if self.min_idle > self.max_size {
            return Err(MbtilesError::InvalidConfig(format!(
                "min_idle ({}) exceeds max_size ({})",
                self.min_idle, self.max_size
            )));
        }
        if self.max_idle_time.is_zero() {
            return Err(MbtilesError::InvalidConfig(
                "max_idle_time must be positive".into(),
            ));
        }
        if self.checkout_timeout.is_zero() {
            return Err(MbtilesError::InvalidConfig(
                "checkout_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Counts reported by [`MbtilesPool::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Physical connections open, idle or checked out. A connection counts
    /// from just before it opens until its close has returned.
    pub open: usize,
    pub idle: usize,
}

/// A cheaply cloneable pool of [`MbtilesHandle`]s over one file.
///
/// The file is validated once, at creation, and that metadata snapshot is
/// shared by every handle for the pool's lifetime. Each physical connection
/// is structurally checked and gets its own prepared statements when it is
/// opened. A checked-out handle belongs to exactly one caller until its
/// [`PooledHandle`] is dropped.
#[derive(Clone)]
pub struct MbtilesPool {
    pool: r2d2::Pool<TileConnectionManager>,
    slots: Arc<ConnectionSlots>,
    metadata: Arc<Metadata>,
    path: PathBuf,
    config: PoolConfig,
}

impl MbtilesPool {
    /// Validate the file once, then open `min_idle` connections up front.
    pub fn new(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref();

        let (conn, metadata) = validation::validate(path, config.open_mode)?;
        conn.close().map_err(|(_conn, e)| e)?;

        let slots = ConnectionSlots::new(config.max_size as usize);
        let manager = TileConnectionManager::new(path, config.open_mode, Arc::clone(&slots));
        let pool = r2d2::Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .idle_timeout(Some(config.max_idle_time))
            .max_lifetime(None)
            .connection_timeout(config.checkout_timeout)
            .connection_customizer(Box::new(PrepareTileStatements))
            .build(manager)?;

        log::debug!(
            "Created pool for {} with {} open connection(s)",
            path.display(),
            slots.open()
        );

        Ok(MbtilesPool {
            pool,
            slots,
            metadata: Arc::new(metadata),
            path: path.to_path_buf(),
            config,
        })
    }

    /// Create a pool with [`PoolConfig::default`] except for the three
    /// sizing parameters.
    pub fn with_limits(
        path: impl AsRef<Path>,
        min_idle: u32,
        max_idle_time: Duration,
        max_size: u32,
    ) -> Result<Self> {
        Self::new(
            path,
            PoolConfig {
                min_idle,
                max_idle_time,
                max_size,
                ..PoolConfig::default()
            },
        )
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            open: self.slots.open(),
            idle: self.pool.state().idle_connections as usize,
        }
    }

    /// Take a handle, reusing an idle connection, opening a new one while
    /// under `max_size`, or else waiting up to `checkout_timeout` for another
    /// caller to check one in.
    pub fn checkout(&self) -> Result<PooledHandle> {
        let conn = self.pool.get()?;
        Ok(PooledHandle {
            handle: MbtilesHandle::pooled(conn, Arc::clone(&self.metadata), &self.path),
        })
    }

    /// Run `f` with a checked-out handle, checking it back in afterwards.
    pub fn with_handle<R>(&self, f: impl FnOnce(&MbtilesHandle) -> Result<R>) -> Result<R> {
        let handle = self.checkout()?;
        f(&handle)
    }
}

impl fmt::Debug for MbtilesPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MbtilesPool")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

/// A handle checked out of an [`MbtilesPool`]. Dereferences to
/// [`MbtilesHandle`] and returns its connection to the pool when dropped.
#[derive(Debug)]
pub struct PooledHandle {
    handle: MbtilesHandle,
}

impl Deref for PooledHandle {
    type Target = MbtilesHandle;

    fn deref(&self) -> &MbtilesHandle {
        &self.handle
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
