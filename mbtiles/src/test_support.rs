use crate::metadata::Metadata;
use crate::schema;
use rusqlite::Connection;
use std::path::PathBuf;
use tempfile::TempDir;

pub fn sample_metadata() -> Metadata {
    Metadata::new([
        ("name", "sample"),
        ("type", "baselayer"),
        ("version", "1.1"),
        ("description", "Fixture tileset"),
        ("format", "png"),
        ("minzoom", "0"),
        ("maxzoom", "4"),
    ])
    .unwrap()
}

/// Write an empty, conforming MBTiles file and return its path.
pub fn write_sample_mbtiles(tmp: &TempDir) -> PathBuf {
    let path = tmp.path().join("sample.mbtiles");
    schema::create(&path, &sample_metadata())
        .unwrap()
        .close()
        .unwrap();
    path
}

/// Write a file built from arbitrary SQL, for schemas the validator should
/// reject.
pub fn write_raw_mbtiles(tmp: &TempDir, sql: &str) -> PathBuf {
    let path = tmp.path().join("raw.mbtiles");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(sql).unwrap();
    path
}
