use std::fmt;

/// Deepest zoom whose grid still fits a `u32` row or column.
pub const MAX_ZOOM: u8 = 32;

/// Flip a row between the XYZ and TMS conventions at `zoom`.
///
/// Computes `2^zoom - 1 - row`. Zoom is clamped to [`MAX_ZOOM`] and rows
/// outside the grid wrap, so the function is total and always its own inverse.
pub fn flip_row(zoom: u8, row: u32) -> u32 {
    let last = (1u64 << u32::from(zoom.min(MAX_ZOOM))) - 1;
    last.wrapping_sub(u64::from(row)) as u32
}

/// Number of tiles along one edge of the grid at `zoom`.
pub fn grid_size(zoom: u8) -> u64 {
    1u64 << u32::from(zoom.min(MAX_ZOOM))
}

/// A client-facing tile address (XYZ, north-origin rows).
///
/// MBTiles stores rows in the TMS convention (row 0 at the south edge), so a
/// row only crosses into storage through [`TileCoord::to_tms`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, column: u32, row: u32) -> Self {
        TileCoord { zoom, column, row }
    }

    /// Whether the zoom is at most [`MAX_ZOOM`] and column and row both lie
    /// inside the grid for that zoom.
    pub fn is_valid(&self) -> bool {
        let size = grid_size(self.zoom);
        self.zoom <= MAX_ZOOM && u64::from(self.column) < size && u64::from(self.row) < size
    }

    /// Convert to the storage convention.
    pub fn to_tms(self) -> TmsCoord {
        TmsCoord {
            zoom: self.zoom,
            column: self.column,
            row: flip_row(self.zoom, self.row),
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// A storage-side tile address (TMS, south-origin rows), exactly as it
/// appears in the `tiles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TmsCoord {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl TmsCoord {
    pub fn new(zoom: u8, column: u32, row: u32) -> Self {
        TmsCoord { zoom, column, row }
    }

    /// Convert back to the client convention.
    pub fn to_xyz(self) -> TileCoord {
        TileCoord {
            zoom: self.zoom,
            column: self.column,
            row: flip_row(self.zoom, self.row),
        }
    }
}

/// A tile payload paired with its client-facing coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTile<T> {
    pub coord: TileCoord,
    pub data: T,
}

impl<T> DataTile<T> {
    pub fn new(coord: TileCoord, data: T) -> Self {
        DataTile { coord, data }
    }

    /// Transform the payload, keeping the coordinate.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> DataTile<U> {
        DataTile {
            coord: self.coord,
            data: f(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_row_is_involution() {
        for zoom in 0..=10u8 {
            for row in 0..(1u32 << zoom) {
                assert_eq!(flip_row(zoom, flip_row(zoom, row)), row);
            }
        }
    }

    #[test]
    fn test_flip_row_at_zoom_zero() {
        assert_eq!(flip_row(0, 0), 0);
    }

    #[test]
    fn test_flip_row_known_values() {
        assert_eq!(flip_row(1, 0), 1);
        assert_eq!(flip_row(1, 1), 0);
        assert_eq!(flip_row(3, 5), 2);
        assert_eq!(flip_row(32, 0), u32::MAX);
    }

    #[test]
    fn test_flip_row_total_outside_grid() {
        // Out-of-grid rows and oversized zooms still round-trip.
        for (zoom, row) in [(0u8, 5u32), (2, 100), (40, 7), (255, u32::MAX)] {
            assert_eq!(flip_row(zoom, flip_row(zoom, row)), row);
        }
    }

    #[test]
    fn test_coord_round_trip_through_tms() {
        let coord = TileCoord::new(3, 2, 5);
        let tms = coord.to_tms();
        assert_eq!(tms, TmsCoord::new(3, 2, 2));
        assert_eq!(tms.to_xyz(), coord);
    }

    #[test]
    fn test_is_valid() {
        assert!(TileCoord::new(0, 0, 0).is_valid());
        assert!(!TileCoord::new(0, 1, 0).is_valid());
        assert!(TileCoord::new(2, 3, 3).is_valid());
        assert!(!TileCoord::new(2, 3, 4).is_valid());
        assert!(TileCoord::new(32, u32::MAX, u32::MAX).is_valid());
        assert!(!TileCoord::new(33, 0, 0).is_valid());
    }

    #[test]
    fn test_display() {
        assert_eq!(TileCoord::new(3, 2, 5).to_string(), "3/2/5");
    }

    #[test]
    fn test_data_tile_map() {
        let tile = DataTile::new(TileCoord::new(1, 0, 1), "abc".to_string());
        let mapped = tile.map(|s| s.len());
        assert_eq!(mapped.coord, TileCoord::new(1, 0, 1));
        assert_eq!(mapped.data, 3);
    }
}
