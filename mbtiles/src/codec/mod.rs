use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Read;

/// Boxed error returned by [`Decodable::decode`].
pub type DecodeError = Box<dyn std::error::Error + Send + Sync>;

/// Converts a tile payload into the raw bytes stored in `tile_data`.
pub trait Encodable {
    fn encode(&self) -> Vec<u8>;
}

/// Converts the raw bytes stored in `tile_data` back into a tile payload.
pub trait Decodable: Sized {
    fn decode(bytes: Vec<u8>) -> Result<Self, DecodeError>;
}

impl Encodable for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }
}

impl Decodable for Vec<u8> {
    fn decode(bytes: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(bytes)
    }
}

impl Encodable for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Decodable for String {
    fn decode(bytes: Vec<u8>) -> Result<Self, DecodeError> {
        Ok(String::from_utf8(bytes)?)
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A gzip-compressed payload, the usual storage form of vector (`pbf`) tiles.
///
/// Compression happens up front in [`GzipTile::compress`], so encoding is just
/// handing over the stored bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipTile {
    compressed: Vec<u8>,
}

impl GzipTile {
    /// Gzip `raw` at the default compression level.
    pub fn compress(raw: &[u8]) -> std::io::Result<Self> {
        let mut compressed = Vec::new();
        GzEncoder::new(raw, Compression::default()).read_to_end(&mut compressed)?;
        Ok(GzipTile { compressed })
    }

    pub fn decompress(&self) -> std::io::Result<Vec<u8>> {
        let mut raw = Vec::new();
        GzDecoder::new(self.compressed.as_slice()).read_to_end(&mut raw)?;
        Ok(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.compressed
    }
}

impl Encodable for GzipTile {
    fn encode(&self) -> Vec<u8> {
        self.compressed.clone()
    }
}

impl Decodable for GzipTile {
    fn decode(bytes: Vec<u8>) -> Result<Self, DecodeError> {
        if !bytes.starts_with(&GZIP_MAGIC) {
            return Err("tile data is not gzip-compressed".into());
        }
        Ok(GzipTile { compressed: bytes })
    }
}
