//! # Tile archive access
//!
//! Raw vector tiles live in a single content-addressed PMTiles archive
//! answering `(z, x, y)` lookups via HTTP byte-range reads (or plain file
//! reads for local archives). This module decomposes the configured source
//! URL, opens the archive, and serves tile bytes through a small LRU so
//! repeated reads within one campaign don't touch the archive twice.

use crate::tile_id::TileId;
use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use pmtiles::{AsyncPmTilesReader, HashMapCache, HttpBackend, MmapBackend, TileCoord};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

/// Decoded tiles kept in memory per store.
pub const DEFAULT_CACHED_TILES: usize = 64;

#[derive(Debug, Error)]
pub enum TileStoreError {
    #[error("invalid tile source: {0}")]
    InvalidSource(String),
    #[error("unsupported tile source scheme: {0}")]
    UnsupportedScheme(String),
    #[error("tile archive error: {0}")]
    Archive(#[from] pmtiles::PmtError),
    #[error("tile cache lock is poisoned: {0}")]
    PoisonedCacheLock(String),
}

/// Where the archive bytes actually come from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ArchiveLocation {
    Path(PathBuf),
    Url(String),
}

/// A parsed tile source URL.
///
/// The archive name decomposes into a *bucket* (scheme + host + directory)
/// and a *tileset* (the basename without extension). Object-store schemes
/// carry the directory in a separate `prefix` because those stores do not
/// admit path-as-bucket; they resolve to their public HTTPS endpoints so a
/// single range-read backend serves every remote scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileSource {
    pub bucket: String,
    pub prefix: Option<String>,
    pub tileset: String,
    location: ArchiveLocation,
}

impl TileSource {
    /// Parses a source URL such as `file:///data/tiles/taipei.pmtiles`,
    /// `https://tiles.example.com/city/taipei.pmtiles`, or
    /// `s3://tile-bucket/city/taipei.pmtiles`.
    ///
    /// # Errors
    ///
    /// Fails when the URL has no scheme, names no object, or uses a scheme
    /// this store does not recognize.
    pub fn parse(source: &str) -> Result<Self, TileStoreError> {
        let (scheme, rest) = source
            .split_once("://")
            .ok_or_else(|| TileStoreError::InvalidSource(format!("no scheme in {source:?}")))?;

        let (dir, object) = match rest.rsplit_once('/') {
            Some((dir, object)) => (dir, object),
            None => ("", rest),
        };
        if object.is_empty() {
            return Err(TileStoreError::InvalidSource(format!(
                "no archive object in {source:?}"
            )));
        }
        let tileset = object
            .rsplit_once('.')
            .map_or(object, |(stem, _ext)| stem)
            .to_string();

        match scheme {
            "file" => Ok(Self {
                bucket: format!("file://{dir}"),
                prefix: None,
                tileset,
                location: ArchiveLocation::Path(PathBuf::from(rest)),
            }),
            "http" | "https" => Ok(Self {
                bucket: format!("{scheme}://{dir}"),
                prefix: None,
                tileset,
                location: ArchiveLocation::Url(source.to_string()),
            }),
            "s3" | "gs" => {
                let (bucket_name, key) = rest.split_once('/').ok_or_else(|| {
                    TileStoreError::InvalidSource(format!("no key under bucket in {source:?}"))
                })?;
                let prefix = match key.rsplit_once('/') {
                    Some((dir, _)) if !dir.is_empty() => Some(dir.to_string()),
                    _ => None,
                };
                let url = if scheme == "s3" {
                    format!("https://{bucket_name}.s3.amazonaws.com/{key}")
                } else {
                    format!("https://storage.googleapis.com/{bucket_name}/{key}")
                };
                Ok(Self {
                    bucket: format!("{scheme}://{bucket_name}"),
                    prefix,
                    tileset,
                    location: ArchiveLocation::Url(url),
                })
            }
            other => Err(TileStoreError::UnsupportedScheme(other.to_string())),
        }
    }
}

enum ArchiveReader {
    File(Box<AsyncPmTilesReader<MmapBackend, HashMapCache>>),
    Http(Box<AsyncPmTilesReader<HttpBackend, HashMapCache>>),
}

/// Read access to one tile archive, with an in-process LRU of tile bytes.
pub struct TileStore {
    reader: ArchiveReader,
    cache: Mutex<LruCache<TileId, Bytes>>,
}

impl TileStore {
    /// Opens the archive named by `source` and validates its header.
    ///
    /// # Errors
    ///
    /// Fails when the archive cannot be reached or is not a PMTiles file.
    pub async fn open(source: &TileSource) -> Result<Self, TileStoreError> {
        Self::open_with_capacity(
            source,
            NonZeroUsize::new(DEFAULT_CACHED_TILES).expect("default capacity is nonzero"),
        )
        .await
    }

    /// As [`TileStore::open`], with an explicit LRU capacity.
    ///
    /// # Errors
    ///
    /// Fails when the archive cannot be reached or is not a PMTiles file.
    pub async fn open_with_capacity(
        source: &TileSource,
        cached_tiles: NonZeroUsize,
    ) -> Result<Self, TileStoreError> {
        let reader = match &source.location {
            ArchiveLocation::Path(path) => ArchiveReader::File(Box::new(
                AsyncPmTilesReader::new_with_cached_path(HashMapCache::default(), path).await?,
            )),
            ArchiveLocation::Url(url) => ArchiveReader::Http(Box::new(
                AsyncPmTilesReader::new_with_cached_url(
                    HashMapCache::default(),
                    pmtiles::reqwest::Client::new(),
                    url.as_str(),
                )
                .await?,
            )),
        };
        Ok(Self {
            reader,
            cache: Mutex::new(LruCache::new(cached_tiles)),
        })
    }

    /// Fetches the raw bytes of `tile`.
    ///
    /// Returns `Ok(None)` when the archive has no tile at this address
    /// (open water, unmapped areas); that is an ordinary outcome, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Fails on transport errors against the archive or a poisoned cache
    /// lock.
    pub async fn fetch(&self, tile: TileId) -> Result<Option<Bytes>, TileStoreError> {
        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|e| TileStoreError::PoisonedCacheLock(e.to_string()))?;
            if let Some(bytes) = cache.get(&tile) {
                return Ok(Some(bytes.clone()));
            }
        }

        let coord = TileCoord::new(tile.z, tile.x, tile.y)?;
        let data = match &self.reader {
            ArchiveReader::File(reader) => reader.get_tile(coord).await?,
            ArchiveReader::Http(reader) => reader.get_tile(coord).await?,
        };

        if let Some(bytes) = &data {
            let mut cache = self
                .cache
                .lock()
                .map_err(|e| TileStoreError::PoisonedCacheLock(e.to_string()))?;
            cache.put(tile, bytes.clone());
        }
        Ok(data)
    }
}

/// The fetch seam between the graph cache and a tile archive.
///
/// [`TileStore`] is the production implementation; tests substitute
/// in-memory fetchers.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    /// Fetches the raw bytes of `tile`; `Ok(None)` when the archive has no
    /// tile at this address.
    ///
    /// # Errors
    ///
    /// Fails on transport errors against the backing archive.
    async fn fetch(&self, tile: TileId) -> Result<Option<Bytes>, TileStoreError>;
}

#[async_trait]
impl TileFetcher for TileStore {
    async fn fetch(&self, tile: TileId) -> Result<Option<Bytes>, TileStoreError> {
        TileStore::fetch(self, tile).await
    }
}
