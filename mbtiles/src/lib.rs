pub mod codec;
pub mod coord;
pub mod cursor;
pub mod error;
pub mod handle;
pub mod metadata;
pub mod pool;
pub mod schema;
mod tiles;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use codec::{DecodeError, Decodable, Encodable, GzipTile};
pub use coord::{flip_row, DataTile, TileCoord, TmsCoord};
pub use cursor::{CursorState, TileCursor};
pub use error::{MbtilesError, Result};
pub use handle::MbtilesHandle;
pub use metadata::{Bounds, Metadata, TileFormat};
pub use pool::{MbtilesPool, PoolConfig, PoolStatus, PooledHandle};
pub use schema::create;
pub use validation::OpenMode;
