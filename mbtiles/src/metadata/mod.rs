use crate::error::{MbtilesError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Keys every valid file must carry in its `metadata` table.
pub const REQUIRED_KEYS: [&str; 5] = ["name", "type", "version", "description", "format"];

/// Snapshot of the `metadata` table: one entry per row.
///
/// A `Metadata` value always holds every key in [`REQUIRED_KEYS`], so the
/// accessors for those keys cannot fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, String>,
}

impl Metadata {
    /// Build metadata from key/value pairs, rejecting any set that lacks a
    /// required key.
    pub fn new<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: BTreeMap<String, String> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| !entries.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            return Err(MbtilesError::InvalidMetadata(format!(
                "missing required key(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Metadata { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn required(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    // ── Required keys ────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        self.required("name")
    }

    /// The `type` key: `overlay` or `baselayer` in conforming files.
    pub fn layer_type(&self) -> &str {
        self.required("type")
    }

    pub fn version(&self) -> &str {
        self.required("version")
    }

    pub fn description(&self) -> &str {
        self.required("description")
    }

    /// The raw `format` key.
    pub fn format_str(&self) -> &str {
        self.required("format")
    }

    pub fn tile_format(&self) -> TileFormat {
        TileFormat::from_name(self.format_str())
    }

    // ── Optional keys ────────────────────────────────────────────────

    pub fn attribution(&self) -> Option<&str> {
        self.get("attribution")
    }

    pub fn minzoom(&self) -> Option<u8> {
        self.parse_optional("minzoom")
    }

    pub fn maxzoom(&self) -> Option<u8> {
        self.parse_optional("maxzoom")
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.parse_optional("bounds")
    }

    /// The `center` key as `(longitude, latitude, zoom)`.
    pub fn center(&self) -> Option<(f64, f64, u8)> {
        let value = self.get("center")?;
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        let parsed = match parts.as_slice() {
            [lon, lat, zoom] => match (lon.parse(), lat.parse(), zoom.parse()) {
                (Ok(lon), Ok(lat), Ok(zoom)) => Some((lon, lat, zoom)),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            log::warn!("Unable to parse metadata center value '{value}'");
        }
        parsed
    }

    /// The `json` key, which vector tilesets use to describe their layers.
    pub fn json(&self) -> Option<serde_json::Value> {
        let value = self.get("json")?;
        match serde_json::from_str(value) {
            Ok(json) => Some(json),
            Err(e) => {
                log::warn!("Unable to parse metadata json value: {e}");
                None
            }
        }
    }

    fn parse_optional<T>(&self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let value = self.get(key)?;
        match value.trim().parse() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("Unable to parse metadata {key} value '{value}': {e}");
                None
            }
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for Metadata {
    type Error = MbtilesError;

    fn try_from(entries: BTreeMap<String, String>) -> Result<Self> {
        Metadata::new(entries)
    }
}

/// Tile image/data format named by the `format` metadata key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileFormat {
    Png,
    Jpg,
    Webp,
    Pbf,
    Other(String),
}

impl TileFormat {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "png" => TileFormat::Png,
            "jpg" | "jpeg" => TileFormat::Jpg,
            "webp" => TileFormat::Webp,
            "pbf" | "mvt" => TileFormat::Pbf,
            _ => TileFormat::Other(name.to_string()),
        }
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            TileFormat::Png => Some("image/png"),
            TileFormat::Jpg => Some("image/jpeg"),
            TileFormat::Webp => Some("image/webp"),
            TileFormat::Pbf => Some("application/x-protobuf"),
            TileFormat::Other(_) => None,
        }
    }
}

/// Geographic extent in WGS84 degrees, from the `bounds` metadata key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl FromStr for Bounds {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        match values.as_slice() {
            [west, south, east, north] => Ok(Bounds {
                west: *west,
                south: *south,
                east: *east,
                north: *north,
            }),
            _ => Err(format!("expected 4 comma-separated numbers, got {}", values.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base_entries() -> Vec<(&'static str, &'static str)> {
        vec![
            ("name", "world"),
            ("type", "baselayer"),
            ("version", "1.0"),
            ("description", "test tiles"),
            ("format", "png"),
        ]
    }

    #[test]
    fn test_required_accessors() {
        let meta = Metadata::new(base_entries()).unwrap();
        assert_eq!(meta.name(), "world");
        assert_eq!(meta.layer_type(), "baselayer");
        assert_eq!(meta.version(), "1.0");
        assert_eq!(meta.description(), "test tiles");
        assert_eq!(meta.tile_format(), TileFormat::Png);
        assert_eq!(meta.len(), 5);
    }

    #[test]
    fn test_missing_format_is_rejected() {
        let entries = base_entries().into_iter().filter(|(k, _)| *k != "format");
        let err = Metadata::new(entries).unwrap_err();
        assert!(matches!(err, MbtilesError::InvalidMetadata(ref msg) if msg.contains("format")));
    }

    #[test]
    fn test_optional_keys() {
        let mut entries = base_entries();
        entries.push(("minzoom", "0"));
        entries.push(("maxzoom", "14"));
        entries.push(("bounds", "-180,-85.0511,180,85.0511"));
        entries.push(("center", "0,0,2"));
        entries.push(("json", r#"{"vector_layers":[]}"#));
        let meta = Metadata::new(entries).unwrap();

        assert_eq!(meta.minzoom(), Some(0));
        assert_eq!(meta.maxzoom(), Some(14));
        assert_eq!(
            meta.bounds(),
            Some(Bounds {
                west: -180.0,
                south: -85.0511,
                east: 180.0,
                north: 85.0511,
            })
        );
        assert_eq!(meta.center(), Some((0.0, 0.0, 2)));
        assert_eq!(meta.json().unwrap()["vector_layers"], serde_json::json!([]));
        assert_eq!(meta.attribution(), None);
    }

    #[test]
    fn test_unparseable_optional_is_none() {
        let mut entries = base_entries();
        entries.push(("maxzoom", "deep"));
        entries.push(("bounds", "1,2,3"));
        let meta = Metadata::new(entries).unwrap();
        assert_eq!(meta.maxzoom(), None);
        assert_eq!(meta.bounds(), None);
    }

    #[test]
    fn test_tile_format_names() {
        assert_eq!(TileFormat::from_name("JPEG"), TileFormat::Jpg);
        assert_eq!(TileFormat::from_name("mvt"), TileFormat::Pbf);
        assert_eq!(
            TileFormat::from_name("tiff"),
            TileFormat::Other("tiff".to_string())
        );
        assert_eq!(TileFormat::Pbf.mime_type(), Some("application/x-protobuf"));
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let meta = Metadata::new(base_entries()).unwrap();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["name"], "world");
        assert_eq!(json["format"], "png");
    }
}
