//! Incremental result cache.
//!
//! Entries map (unit path, unit fingerprint, configuration fingerprint, rule-set version) to the
//! final, sorted diagnostics of one unit. The path is part of the key because diagnostics carry
//! it and per-file ignores depend on it. A hit skips suppression scanning and dispatch entirely.
//!
//! # Disk layout
//! `<dir>/<aa>/<sha256(key)>.json`, where `<aa>` is the first two hex characters of the digest.
//! Each entry repeats its full key, so a digest collision or a stale rule-set reads as a miss.

use crate::diagnostics::Diagnostic;
use crate::utils::sha256_hex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Number of writer locks shared by all keys of a `DiskCache`.
const LOCK_STRIPES: usize = 64;

lazy_static::lazy_static! {
    static ref SHARD_NAME: Regex = Regex::new(r"^[0-9a-f]{2}$").unwrap();
    /// `<digest>.json` entries and `<digest>.<pid>.<n>.tmp` partial writes.
    static ref ENTRY_NAME: Regex =
        Regex::new(r"^([0-9a-f]{64})\.(?:json|[0-9]+\.[0-9]+\.tmp)$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub unit_path: String,
    pub unit_fingerprint: String,
    pub config_fingerprint: String,
    pub ruleset_version: String,
}

impl CacheKey {
    pub fn new(
        unit_path: &Path,
        unit_fingerprint: impl Into<String>,
        config_fingerprint: impl Into<String>,
        ruleset_version: impl Into<String>,
    ) -> Self {
        Self {
            unit_path: unit_path.to_string_lossy().into_owned(),
            unit_fingerprint: unit_fingerprint.into(),
            config_fingerprint: config_fingerprint.into(),
            ruleset_version: ruleset_version.into(),
        }
    }

    /// SHA-256 of the whole key tuple; names the on-disk entry.
    pub fn digest(&self) -> String {
        sha256_hex(
            format!(
                "{}\0{}\0{}\0{}",
                self.unit_path, self.unit_fingerprint, self.config_fingerprint, self.ruleset_version
            )
            .as_bytes(),
        )
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache directory {path} is unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A backing store for cached per-unit diagnostics.
///
/// Implementations allow concurrent reads and must never hand back an entry whose key differs
/// from the one requested.
pub trait CacheStore: Send + Sync {
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<Diagnostic>>, CacheError>;
    fn store(&self, key: &CacheKey, diagnostics: &[Diagnostic]) -> Result<(), CacheError>;
}

/// Run-scoped in-memory store.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Vec<Diagnostic>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<Diagnostic>>, CacheError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn store(&self, key: &CacheKey, diagnostics: &[Diagnostic]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.clone(), diagnostics.to_vec());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiskEntry {
    ruleset_version: String,
    unit_path: String,
    unit_fingerprint: String,
    config_fingerprint: String,
    diagnostics: Vec<Diagnostic>,
}

impl DiskEntry {
    fn matches(&self, key: &CacheKey) -> bool {
        self.ruleset_version == key.ruleset_version
            && self.unit_path == key.unit_path
            && self.unit_fingerprint == key.unit_fingerprint
            && self.config_fingerprint == key.config_fingerprint
    }
}

/// Persistent store: one JSON file per entry.
///
/// Writes go to a unique temp file that is renamed into place, so readers never observe a
/// partial entry. Writers of the same key are serialized through a fixed set of striped locks;
/// readers take no lock.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    locks: Vec<Mutex<()>>,
    temp_counter: AtomicU64,
}

impl DiskCache {
    /// Opens (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Unavailable {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            temp_counter: AtomicU64::new(0),
        })
    }

    fn entry_path(&self, digest: &str) -> PathBuf {
        self.dir.join(&digest[..2]).join(format!("{}.json", digest))
    }

    fn key_lock(&self, digest: &str) -> &Mutex<()> {
        let stripe = u8::from_str_radix(&digest[..2], 16).map_or(0, usize::from);
        &self.locks[stripe % LOCK_STRIPES]
    }

    /// Whether `path` (at depth 2 under the cache root) is laid out like an entry or temp file.
    fn is_cache_file(path: &Path) -> bool {
        let shard = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str());
        let name = path.file_name().and_then(|name| name.to_str());
        match (shard, name) {
            (Some(shard), Some(name)) if SHARD_NAME.is_match(shard) => ENTRY_NAME
                .captures(name)
                .is_some_and(|caps| caps[1].starts_with(shard)),
            _ => false,
        }
    }

    /// Deletes every entry under `dir`. Returns the number of entries removed.
    ///
    /// Only files in the cache layout are touched; anything else in `dir` is left alone.
    pub fn clear(dir: &Path) -> Result<usize, CacheError> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(2)
            .contents_first(true)
        {
            let entry = entry.map_err(|e| CacheError::Io {
                path: dir.to_path_buf(),
                source: e.into(),
            })?;
            let path = entry.path();
            if entry.file_type().is_dir() {
                let is_shard = entry.depth() == 1
                    && path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| SHARD_NAME.is_match(name));
                if is_shard {
                    // Only succeeds once the shard is empty.
                    let _ = fs::remove_dir(path);
                }
                continue;
            }
            if entry.depth() != 2 || !Self::is_cache_file(path) {
                continue;
            }
            fs::remove_file(path).map_err(|source| CacheError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if path.extension().is_some_and(|ext| ext == "json") {
                removed += 1;
            }
        }
        debug!(dir = %dir.display(), removed, "cleared cache");
        Ok(removed)
    }
}

impl CacheStore for DiskCache {
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<Diagnostic>>, CacheError> {
        let path = self.entry_path(&key.digest());
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let entry: DiskEntry =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?;
        if entry.matches(key) {
            Ok(Some(entry.diagnostics))
        } else {
            Ok(None)
        }
    }

    fn store(&self, key: &CacheKey, diagnostics: &[Diagnostic]) -> Result<(), CacheError> {
        let digest = key.digest();
        let path = self.entry_path(&digest);
        let entry = DiskEntry {
            ruleset_version: key.ruleset_version.clone(),
            unit_path: key.unit_path.clone(),
            unit_fingerprint: key.unit_fingerprint.clone(),
            config_fingerprint: key.config_fingerprint.clone(),
            diagnostics: diagnostics.to_vec(),
        };
        let body = serde_json::to_vec(&entry).map_err(|source| CacheError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let lock = self.key_lock(&digest);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let shard = path.parent().unwrap_or(self.dir.as_path()).to_path_buf();
        fs::create_dir_all(&shard).map_err(|source| CacheError::Io {
            path: shard.clone(),
            source,
        })?;

        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let temp_path = shard.join(format!("{}.{}.{}.tmp", digest, std::process::id(), n));
        let written = fs::File::create(&temp_path)
            .and_then(|mut file| file.write_all(&body))
            .and_then(|_| fs::rename(&temp_path, &path));
        if let Err(source) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(CacheError::Io { path, source });
        }
        Ok(())
    }
}

/// Hit/miss/failure counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub failures: usize,
}

/// Front end over an optional store. Every store error degrades to a miss.
pub struct Cache {
    store: Option<Box<dyn CacheStore>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    failures: AtomicUsize,
}

impl Cache {
    pub fn new(store: Box<dyn CacheStore>) -> Self {
        Self {
            store: Some(store),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// A cache that always misses and never stores.
    pub fn disabled() -> Self {
        Self {
            store: None,
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn memory() -> Self {
        Self::new(Box::new(MemoryCache::new()))
    }

    /// Disk-backed cache; falls back to a disabled cache if the directory cannot be opened.
    pub fn disk(dir: &Path) -> Self {
        match DiskCache::open(dir) {
            Ok(store) => Self::new(Box::new(store)),
            Err(e) => {
                warn!(error = %e, "caching disabled for this run");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<Vec<Diagnostic>> {
        let Some(store) = &self.store else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        match store.load(key) {
            Ok(Some(diagnostics)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(diagnostics)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as miss");
                self.failures.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn store(&self, key: &CacheKey, diagnostics: &[Diagnostic]) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.store(key, diagnostics) {
            warn!(error = %e, "cache write failed");
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("enabled", &self.is_enabled())
            .field("stats", &self.stats())
            .finish()
    }
}
