use crate::config::toml_config::CacheConfig;
use crate::core::metrics::PerformanceMetrics;
use crate::utils::error::{ErrorHandler, Result};
use crate::utils::logger::log_operation;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const CACHE_EXTENSION: &str = "cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Workbook,
    Sheet,
    Value,
    Processed,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [
        CacheKind::Workbook,
        CacheKind::Sheet,
        CacheKind::Value,
        CacheKind::Processed,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            CacheKind::Workbook => "wb_",
            CacheKind::Sheet => "df_",
            CacheKind::Value => "val_",
            CacheKind::Processed => "proc_",
        }
    }

    fn label(self) -> &'static str {
        match self {
            CacheKind::Workbook => "workbook",
            CacheKind::Sheet => "sheet",
            CacheKind::Value => "value",
            CacheKind::Processed => "processed",
        }
    }

    fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| name.starts_with(k.prefix()))
    }
}

/// Identifica o estado de um arquivo: caminho absoluto, tamanho e data de modificação.
/// `None` quando o arquivo não existe.
pub fn file_fingerprint(path: impl AsRef<Path>) -> Option<String> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path).ok()?;
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let content = format!("{}_{}_{}", absolute.display(), metadata.len(), mtime);
    Some(blake3::hash(content.as_bytes()).to_hex().to_string())
}

/// Chave estável para o resultado de uma operação com argumentos.
pub fn operation_key(name: &str, args: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    for arg in args {
        hasher.update(b"\x1f");
        hasher.update(arg.as_bytes());
    }
    format!("{}_{}", name, &hasher.finalize().to_hex()[..16])
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KindStats {
    pub files: usize,
    pub size_mb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub cache_dir: PathBuf,
    pub ttl_seconds: u64,
    pub total_files: usize,
    pub total_size_mb: f64,
    pub by_kind: BTreeMap<String, KindStats>,
}

/// Cache em disco com validade por tempo; o acesso aos arquivos passa por um único mutex.
pub struct FileCache {
    dir: PathBuf,
    ttl: Duration,
    enabled: AtomicBool,
    io_lock: Mutex<()>,
    metrics: Option<Arc<PerformanceMetrics>>,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ErrorHandler::file_error(e, &dir, "cache_init"))?;

        log_operation(
            "cache_init",
            "STARTED",
            &crate::details!("cache_dir" => dir.display().to_string(), "ttl_seconds" => ttl.as_secs()),
        );

        Ok(Self {
            dir,
            ttl,
            enabled: AtomicBool::new(true),
            io_lock: Mutex::new(()),
            metrics: None,
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let cache = Self::new(&config.dir, config.ttl())?;
        cache.set_enabled(config.enabled);
        Ok(cache)
    }

    pub fn with_metrics(mut self, metrics: Arc<PerformanceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.io_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn entry_path(&self, kind: CacheKind, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", kind.prefix(), key, CACHE_EXTENSION))
    }

    fn is_fresh(&self, path: &Path) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age < self.ttl)
            .unwrap_or(false)
    }

    pub fn get<T: DeserializeOwned>(&self, kind: CacheKind, key: &str) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }

        let path = self.entry_path(kind, key);
        let _guard = self.lock();
        if !self.is_fresh(&path) {
            return None;
        }

        let loaded = std::fs::read(&path)
            .map_err(crate::utils::error::DeskError::from)
            .and_then(|bytes| Ok(serde_json::from_slice::<T>(&bytes)?));
        match loaded {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Grava a entrada; falhas são registradas e resultam em `false`.
    pub fn set<T: Serialize>(&self, kind: CacheKind, key: &str, value: &T) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let path = self.entry_path(kind, key);
        let _guard = self.lock();
        let saved = serde_json::to_vec(value)
            .map_err(crate::utils::error::DeskError::from)
            .and_then(|bytes| Ok(std::fs::write(&path, bytes)?));
        match saved {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠️ Could not save cache entry {}: {}", path.display(), e);
                false
            }
        }
    }

    fn file_key(file: &Path, variant: &str) -> Option<String> {
        file_fingerprint(file).map(|hash| format!("{}_{}", hash, variant))
    }

    pub fn get_file_entry<T: DeserializeOwned>(
        &self,
        kind: CacheKind,
        file: impl AsRef<Path>,
        variant: &str,
    ) -> Option<T> {
        let key = Self::file_key(file.as_ref(), variant)?;
        self.get(kind, &key)
    }

    pub fn set_file_entry<T: Serialize>(
        &self,
        kind: CacheKind,
        file: impl AsRef<Path>,
        variant: &str,
        value: &T,
    ) -> bool {
        match Self::file_key(file.as_ref(), variant) {
            Some(key) => self.set(kind, &key, value),
            None => false,
        }
    }

    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(CacheKind::Value, key)
    }

    pub fn set_value<T: Serialize>(&self, key: &str, value: &T) -> bool {
        self.set(CacheKind::Value, key, value)
    }

    fn record(&self, outcome: &str, kind: CacheKind, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(
                &format!("cache_{}_{}", outcome, kind.label()),
                started.elapsed().as_secs_f64() * 1000.0,
                serde_json::Map::new(),
            );
        }
    }

    /// Devolve o valor do cache ou calcula, guarda e devolve.
    pub fn get_or_insert_with<T, F>(&self, kind: CacheKind, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let started = Instant::now();
        if let Some(hit) = self.get(kind, key) {
            self.record("hit", kind, started);
            return Ok(hit);
        }

        let value = compute()?;
        self.set(kind, key, &value);
        self.record("miss", kind, started);
        Ok(value)
    }

    /// Como `get_or_insert_with`, usando a impressão digital do arquivo na chave.
    pub fn get_or_insert_file_entry<T, F>(
        &self,
        kind: CacheKind,
        file: impl AsRef<Path>,
        variant: &str,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        match Self::file_key(file.as_ref(), variant) {
            Some(key) => self.get_or_insert_with(kind, &key, compute),
            None => compute(),
        }
    }

    fn cache_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(CACHE_EXTENSION))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove todas as entradas do estado atual do arquivo.
    pub fn invalidate_file(&self, file: impl AsRef<Path>) -> usize {
        let file = file.as_ref();
        let Some(hash) = file_fingerprint(file) else {
            return 0;
        };

        let _guard = self.lock();
        let removed = self
            .cache_files()
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(&hash))
            })
            .filter(|p| std::fs::remove_file(p).is_ok())
            .count();

        log_operation(
            "cache_invalidate",
            "SUCCESS",
            &crate::details!("file" => file.display().to_string(), "removed" => removed),
        );
        removed
    }

    /// Apaga as entradas (todas, ou só as mais antigas que `older_than`).
    pub fn clear(&self, older_than: Option<Duration>) -> usize {
        let _guard = self.lock();
        let now = SystemTime::now();

        let removed = self
            .cache_files()
            .into_iter()
            .filter(|p| match older_than {
                None => true,
                Some(limit) => std::fs::metadata(p)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .is_some_and(|age| age > limit),
            })
            .filter(|p| std::fs::remove_file(p).is_ok())
            .count();

        log_operation(
            "cache_clear",
            "SUCCESS",
            &crate::details!(
                "removed" => removed,
                "older_than_hours" => older_than.map(|d| d.as_secs() / 3600)
            ),
        );
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let _guard = self.lock();
        let mut by_kind: BTreeMap<String, KindStats> = BTreeMap::new();
        let mut total_files = 0;
        let mut total_bytes = 0u64;

        for path in self.cache_files() {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            total_files += 1;
            total_bytes += size;

            let kind = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(CacheKind::from_file_name)
                .map(|k| k.label())
                .unwrap_or("other");
            let entry = by_kind.entry(kind.to_string()).or_default();
            entry.files += 1;
            entry.size_mb += size as f64 / (1024.0 * 1024.0);
        }

        CacheStats {
            enabled: self.is_enabled(),
            cache_dir: self.dir.clone(),
            ttl_seconds: self.ttl.as_secs(),
            total_files,
            total_size_mb: total_bytes as f64 / (1024.0 * 1024.0),
            by_kind,
        }
    }
}
