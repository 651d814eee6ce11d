use crate::codec::DecodeError;
use crate::coord::TileCoord;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MbtilesError {
    #[error("MBTiles file does not exist: {}", path.display())]
    DoesNotExist { path: PathBuf },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid tiles table: {0}")]
    InvalidTiles(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("Failed to decode tile {coord}: {source}")]
    Decode {
        coord: TileCoord,
        #[source]
        source: DecodeError,
    },

    #[error("Refusing to overwrite existing file: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Tile coordinate {0} lies outside its zoom level's grid")]
    InvalidCoord(TileCoord),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl MbtilesError {
    /// True for the errors raised while validating a file on open.
    /// These are terminal: the file has to be fixed before opening again.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            MbtilesError::DoesNotExist { .. }
                | MbtilesError::InvalidSchema(_)
                | MbtilesError::InvalidTiles(_)
                | MbtilesError::InvalidMetadata(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MbtilesError>;
