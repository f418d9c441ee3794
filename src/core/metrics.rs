use crate::config::toml_config::MetricsConfig;
use crate::utils::error::{DeskError, Result};
use crate::utils::logger::{log_operation, log_performance};
use crate::utils::monitor::{SystemMonitor, SystemSample};
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const MAX_HISTORY_PER_OPERATION: usize = 100;
const HISTORY_KEEP_AFTER_TRIM: usize = 50;
const MAX_SLOW_OPERATIONS: usize = 100;
const MAX_SYSTEM_SAMPLES: usize = 1000;

/// Palavras-chave por categoria, testadas em ordem.
const OPERATION_CATEGORIES: [(&str, &[&str]); 6] = [
    ("excel", &["load_workbook", "read_excel", "save", "write"]),
    ("cache", &["cache_hit", "cache_miss", "cache_save", "cache_load"]),
    ("automation", &["autosystem", "emsys", "pyautogui", "ocr", "etapa", "external_command"]),
    ("file", &["file_read", "file_write", "file_copy", "backup"]),
    ("validation", &["validate", "convert", "check"]),
    ("system", &["startup", "shutdown", "login", "export"]),
];

pub fn categorize_operation(operation: &str) -> &'static str {
    let lower = operation.to_lowercase();
    OPERATION_CATEGORIES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or("other")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceLevel {
    Normal,
    Slow,
    VerySlow,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationRecord {
    pub timestamp: DateTime<Local>,
    pub operation: String,
    pub duration_ms: f64,
    pub category: &'static str,
    pub performance_level: PerformanceLevel,
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneralStats {
    pub total_operations: u64,
    pub slow_operations: u64,
    pub very_slow_operations: u64,
    pub average_duration_ms: f64,
    pub cache_hit_rate: f64,
}

impl GeneralStats {
    pub fn slow_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        self.slow_operations as f64 / self.total_operations as f64 * 100.0
    }

    pub fn very_slow_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        self.very_slow_operations as f64 / self.total_operations as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
    pub operation: String,
    pub metrics_count: usize,
    pub average_duration_ms: f64,
    pub median_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub std_deviation_ms: f64,
    pub slow_operations: usize,
    pub very_slow_operations: usize,
    pub category: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryStats {
    pub count: usize,
    pub total_duration: f64,
    pub avg_duration: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSummary {
    pub general_stats: GeneralStats,
    pub category_stats: BTreeMap<String, CategoryStats>,
    pub most_common_operations: Vec<(String, usize)>,
    pub slow_operations_count: usize,
    pub system_metrics_count: usize,
    pub collection_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ReportFormat {
    Json,
    Csv,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(DeskError::validation("format", other, "expected json or csv")),
        }
    }
}

#[derive(Default)]
struct MetricsState {
    operations: HashMap<String, Vec<OperationRecord>>,
    // ordem de primeira ocorrência, para os detalhes do relatório
    operation_order: Vec<String>,
    slow_operations: VecDeque<OperationRecord>,
    system_samples: VecDeque<SystemSample>,
    stats: GeneralStats,
    cache_operations: u64,
    cache_hits: u64,
}

/// Coletor de tempos de operação e amostras do sistema.
pub struct PerformanceMetrics {
    metrics_dir: PathBuf,
    slow_threshold_ms: f64,
    very_slow_threshold_ms: f64,
    collection_interval: Duration,
    enabled: AtomicBool,
    state: Mutex<MetricsState>,
    monitor: Arc<SystemMonitor>,
    collecting: Arc<AtomicBool>,
    collector: Mutex<Option<JoinHandle<()>>>,
}

impl PerformanceMetrics {
    pub fn new(metrics_dir: impl Into<PathBuf>) -> Self {
        Self::from_config(&MetricsConfig {
            dir: metrics_dir.into().display().to_string(),
            ..MetricsConfig::default()
        })
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self {
            metrics_dir: PathBuf::from(&config.dir),
            slow_threshold_ms: config.slow_threshold_ms,
            very_slow_threshold_ms: config.very_slow_threshold_ms,
            collection_interval: Duration::from_secs(config.collection_interval_seconds.max(1)),
            enabled: AtomicBool::new(config.enabled),
            state: Mutex::new(MetricsState::default()),
            monitor: Arc::new(SystemMonitor::new()),
            collecting: Arc::new(AtomicBool::new(false)),
            collector: Mutex::new(None),
        }
    }

    pub fn metrics_dir(&self) -> &Path {
        &self.metrics_dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    // Um painel com lock envenenado ainda serve para leitura
    fn state(&self) -> MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn level_for(&self, duration_ms: f64) -> PerformanceLevel {
        if duration_ms >= self.very_slow_threshold_ms {
            PerformanceLevel::VerySlow
        } else if duration_ms >= self.slow_threshold_ms {
            PerformanceLevel::Slow
        } else {
            PerformanceLevel::Normal
        }
    }

    pub fn record_operation(&self, operation: &str, duration_ms: f64, details: Map<String, Value>) {
        if !self.is_enabled() {
            return;
        }

        let record = OperationRecord {
            timestamp: Local::now(),
            operation: operation.to_string(),
            duration_ms,
            category: categorize_operation(operation),
            performance_level: self.level_for(duration_ms),
            details,
        };
        log_performance(operation, duration_ms, &record.details);

        let mut state = self.state();
        match record.performance_level {
            PerformanceLevel::VerySlow => state.stats.very_slow_operations += 1,
            PerformanceLevel::Slow => state.stats.slow_operations += 1,
            PerformanceLevel::Normal => {}
        }

        if record.performance_level != PerformanceLevel::Normal {
            if state.slow_operations.len() >= MAX_SLOW_OPERATIONS {
                state.slow_operations.pop_front();
            }
            state.slow_operations.push_back(record.clone());
        }

        let total = state.stats.total_operations + 1;
        state.stats.total_operations = total;
        state.stats.average_duration_ms =
            (state.stats.average_duration_ms * (total - 1) as f64 + duration_ms) / total as f64;

        if operation.starts_with("cache") {
            state.cache_operations += 1;
            if operation.contains("hit") {
                state.cache_hits += 1;
            }
            state.stats.cache_hit_rate =
                state.cache_hits as f64 / state.cache_operations as f64 * 100.0;
        }

        if !state.operations.contains_key(operation) {
            state.operation_order.push(operation.to_string());
        }
        let history = state.operations.entry(operation.to_string()).or_default();
        history.push(record);
        if history.len() > MAX_HISTORY_PER_OPERATION {
            let excess = history.len() - HISTORY_KEEP_AFTER_TRIM;
            history.drain(..excess);
        }
    }

    pub fn record_system_sample(&self, sample: SystemSample) {
        let mut state = self.state();
        if state.system_samples.len() >= MAX_SYSTEM_SAMPLES {
            state.system_samples.pop_front();
        }
        state.system_samples.push_back(sample);
    }

    pub fn general_stats(&self) -> GeneralStats {
        self.state().stats.clone()
    }

    pub fn operation_stats(&self, operation: &str) -> Option<OperationStats> {
        let state = self.state();
        let records = state.operations.get(operation).filter(|r| !r.is_empty())?;
        let mut durations: Vec<f64> = records.iter().map(|r| r.duration_ms).collect();
        durations.sort_by(|a, b| a.total_cmp(b));

        let count = durations.len();
        let mean = durations.iter().sum::<f64>() / count as f64;
        let median = if count % 2 == 0 {
            (durations[count / 2 - 1] + durations[count / 2]) / 2.0
        } else {
            durations[count / 2]
        };
        let std_deviation = if count > 1 {
            let variance =
                durations.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        } else {
            0.0
        };

        Some(OperationStats {
            operation: operation.to_string(),
            metrics_count: count,
            average_duration_ms: mean,
            median_duration_ms: median,
            min_duration_ms: durations[0],
            max_duration_ms: durations[count - 1],
            std_deviation_ms: std_deviation,
            slow_operations: records
                .iter()
                .filter(|r| r.performance_level == PerformanceLevel::Slow)
                .count(),
            very_slow_operations: records
                .iter()
                .filter(|r| r.performance_level == PerformanceLevel::VerySlow)
                .count(),
            category: records[0].category,
        })
    }

    /// Operações lentas, da mais demorada para a mais rápida.
    pub fn slow_operations(&self, limit: usize) -> Vec<OperationRecord> {
        let mut slow: Vec<OperationRecord> = self.state().slow_operations.iter().cloned().collect();
        slow.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        slow.truncate(limit);
        slow
    }

    pub fn system_metrics(&self, last_minutes: i64) -> Vec<SystemSample> {
        let cutoff = Local::now() - chrono::Duration::minutes(last_minutes);
        self.state()
            .system_samples
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> PerformanceSummary {
        let state = self.state();

        let mut category_stats: BTreeMap<String, CategoryStats> = BTreeMap::new();
        for record in state.operations.values().flatten() {
            let entry = category_stats.entry(record.category.to_string()).or_default();
            entry.count += 1;
            entry.total_duration += record.duration_ms;
        }
        for stats in category_stats.values_mut() {
            if stats.count > 0 {
                stats.avg_duration = stats.total_duration / stats.count as f64;
            }
        }

        let mut most_common: Vec<(String, usize)> = state
            .operations
            .iter()
            .map(|(name, records)| (name.clone(), records.len()))
            .collect();
        most_common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_common.truncate(10);

        PerformanceSummary {
            general_stats: state.stats.clone(),
            category_stats,
            most_common_operations: most_common,
            slow_operations_count: state.slow_operations.len(),
            system_metrics_count: state.system_samples.len(),
            collection_active: self.collecting.load(Ordering::Relaxed),
        }
    }

    fn operation_names(&self) -> Vec<String> {
        self.state().operation_order.clone()
    }

    pub fn report_json(&self) -> Value {
        let details: Map<String, Value> = self
            .operation_names()
            .into_iter()
            .take(20)
            .filter_map(|name| {
                let stats = self.operation_stats(&name)?;
                Some((name, serde_json::to_value(stats).ok()?))
            })
            .collect();

        json!({
            "generated_at": Local::now().to_rfc3339(),
            "summary": self.summary(),
            "slow_operations": self.slow_operations(50),
            "system_metrics": self.system_metrics(120),
            "operation_details": details,
        })
    }

    /// Grava o relatório em `metrics_dir`; sem nome usa `performance_report_<timestamp>`.
    pub fn export_report(&self, format: ReportFormat, filename: Option<&str>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.metrics_dir)?;
        let filename = filename.map(str::to_string).unwrap_or_else(|| {
            format!(
                "performance_report_{}.{}",
                Local::now().format("%Y%m%d_%H%M%S"),
                format.extension()
            )
        });
        let report_path = self.metrics_dir.join(filename);

        match format {
            ReportFormat::Json => {
                let content = serde_json::to_string_pretty(&self.report_json())?;
                std::fs::write(&report_path, content)?;
            }
            ReportFormat::Csv => {
                let mut writer = csv::Writer::from_path(&report_path)?;
                writer.write_record([
                    "operation",
                    "category",
                    "count",
                    "average_ms",
                    "median_ms",
                    "min_ms",
                    "max_ms",
                    "std_dev_ms",
                    "slow",
                    "very_slow",
                ])?;
                for name in self.operation_names() {
                    if let Some(s) = self.operation_stats(&name) {
                        writer.write_record([
                            s.operation.clone(),
                            s.category.to_string(),
                            s.metrics_count.to_string(),
                            format!("{:.2}", s.average_duration_ms),
                            format!("{:.2}", s.median_duration_ms),
                            format!("{:.2}", s.min_duration_ms),
                            format!("{:.2}", s.max_duration_ms),
                            format!("{:.2}", s.std_deviation_ms),
                            s.slow_operations.to_string(),
                            s.very_slow_operations.to_string(),
                        ])?;
                    }
                }
                writer.flush()?;
            }
        }

        let size_kb = std::fs::metadata(&report_path)
            .map(|m| m.len() as f64 / 1024.0)
            .unwrap_or(0.0);
        log_operation(
            "metrics_export",
            "SUCCESS",
            &crate::details!(
                "report_path" => report_path.display().to_string(),
                "report_size_kb" => size_kb
            ),
        );
        Ok(report_path)
    }

    /// Mede `f`; falhas são registradas como `{operation}_error`.
    pub fn measure<T, F>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let started = Instant::now();
        let result = f();
        self.record_measured(operation, started, &result);
        result
    }

    pub async fn measure_async<T, Fut>(&self, operation: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = fut.await;
        self.record_measured(operation, started, &result);
        result
    }

    fn record_measured<T>(&self, operation: &str, started: Instant, result: &Result<T>) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(_) => self.record_operation(
                operation,
                elapsed_ms,
                crate::details!("success" => true),
            ),
            Err(e) => self.record_operation(
                &format!("{}_error", operation),
                elapsed_ms,
                crate::details!("success" => false, "error" => e.to_string()),
            ),
        }
    }

    /// Coleta amostras do sistema em segundo plano. Precisa de um runtime tokio.
    pub fn start_collection(self: &Arc<Self>) {
        if self.collecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let metrics = Arc::clone(self);
        let interval = self.collection_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            while metrics.collecting.load(Ordering::SeqCst) {
                ticker.tick().await;
                let monitor = Arc::clone(&metrics.monitor);
                match tokio::task::spawn_blocking(move || monitor.sample()).await {
                    Ok(sample) => metrics.record_system_sample(sample),
                    Err(e) => tracing::warn!("⚠️ System sample failed: {}", e),
                }
            }
        });

        if let Ok(mut collector) = self.collector.lock() {
            *collector = Some(handle);
        }
        log_operation(
            "metrics_collection",
            "STARTED",
            &crate::details!("interval_seconds" => interval.as_secs()),
        );
    }

    pub fn stop_collection(&self) {
        if !self.collecting.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.collector.lock().ok().and_then(|mut c| c.take()) {
            handle.abort();
        }
        log_operation("metrics_collection", "STOPPED", &Map::new());
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::SeqCst)
    }

    /// Amostra imediata, também guardada no histórico.
    pub fn sample_now(&self) -> SystemSample {
        let sample = self.monitor.sample();
        self.record_system_sample(sample.clone());
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metrics() -> (TempDir, PerformanceMetrics) {
        let dir = TempDir::new().unwrap();
        let metrics = PerformanceMetrics::new(dir.path());
        (dir, metrics)
    }

    #[test]
    fn test_categorize_operation() {
        assert_eq!(categorize_operation("load_workbook_planilha"), "excel");
        assert_eq!(categorize_operation("cache_hit_wb"), "cache");
        assert_eq!(categorize_operation("etapa2_minimercado"), "automation");
        assert_eq!(categorize_operation("create_backup"), "file");
        assert_eq!(categorize_operation("validate_fuel"), "validation");
        assert_eq!(categorize_operation("system_login"), "system");
        assert_eq!(categorize_operation("something_else"), "other");
    }

    #[test]
    fn test_general_stats_and_levels() {
        let (_dir, metrics) = metrics();
        metrics.record_operation("op", 100.0, Map::new());
        metrics.record_operation("op", 1500.0, Map::new());
        metrics.record_operation("op", 6000.0, Map::new());

        let stats = metrics.general_stats();
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.slow_operations, 1);
        assert_eq!(stats.very_slow_operations, 1);
        assert!((stats.average_duration_ms - 2533.333).abs() < 0.01);

        let slow = metrics.slow_operations(10);
        assert_eq!(slow.len(), 2);
        assert_eq!(slow[0].duration_ms, 6000.0);
        assert_eq!(slow[0].performance_level, PerformanceLevel::VerySlow);
    }

    #[test]
    fn test_operation_stats() {
        let (_dir, metrics) = metrics();
        for d in [10.0, 20.0, 30.0, 40.0] {
            metrics.record_operation("validate_litros", d, Map::new());
        }

        let stats = metrics.operation_stats("validate_litros").unwrap();
        assert_eq!(stats.metrics_count, 4);
        assert_eq!(stats.average_duration_ms, 25.0);
        assert_eq!(stats.median_duration_ms, 25.0);
        assert_eq!(stats.min_duration_ms, 10.0);
        assert_eq!(stats.max_duration_ms, 40.0);
        assert!((stats.std_deviation_ms - 12.9099).abs() < 0.001);
        assert_eq!(stats.category, "validation");
        assert!(metrics.operation_stats("missing").is_none());
    }

    #[test]
    fn test_history_is_trimmed() {
        let (_dir, metrics) = metrics();
        for i in 0..101 {
            metrics.record_operation("op", i as f64, Map::new());
        }
        let stats = metrics.operation_stats("op").unwrap();
        assert_eq!(stats.metrics_count, 50);
        assert_eq!(stats.min_duration_ms, 51.0);
        assert_eq!(metrics.general_stats().total_operations, 101);
    }

    #[test]
    fn test_cache_hit_rate() {
        let (_dir, metrics) = metrics();
        metrics.record_operation("cache_hit_wb", 1.0, Map::new());
        metrics.record_operation("cache_hit_val", 1.0, Map::new());
        metrics.record_operation("cache_miss_wb", 5.0, Map::new());
        metrics.record_operation("etapa1_backup_e_precos", 5.0, Map::new());

        assert!((metrics.general_stats().cache_hit_rate - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_disabled_metrics_record_nothing() {
        let (_dir, metrics) = metrics();
        metrics.set_enabled(false);
        metrics.record_operation("op", 10.0, Map::new());
        assert_eq!(metrics.general_stats().total_operations, 0);
    }

    #[test]
    fn test_summary_by_category() {
        let (_dir, metrics) = metrics();
        metrics.record_operation("cache_hit_wb", 2.0, Map::new());
        metrics.record_operation("cache_hit_wb", 4.0, Map::new());
        metrics.record_operation("backup_planilha", 30.0, Map::new());

        let summary = metrics.summary();
        assert_eq!(summary.category_stats["cache"].count, 2);
        assert_eq!(summary.category_stats["cache"].avg_duration, 3.0);
        assert_eq!(summary.most_common_operations[0], ("cache_hit_wb".to_string(), 2));
        assert!(!summary.collection_active);
    }

    #[test]
    fn test_measure_records_errors() {
        let (_dir, metrics) = metrics();
        let ok: Result<i32> = metrics.measure("parse", || Ok(1));
        assert_eq!(ok.unwrap(), 1);
        let err: Result<i32> = metrics.measure("parse", || Err(DeskError::config("x", "bad")));
        assert!(err.is_err());

        assert!(metrics.operation_stats("parse").is_some());
        assert!(metrics.operation_stats("parse_error").is_some());
    }

    #[test]
    fn test_export_csv_report() {
        let (dir, metrics) = metrics();
        metrics.record_operation("backup_planilha", 12.0, Map::new());

        let path = metrics.export_report(ReportFormat::Csv, Some("report.csv")).unwrap();
        assert_eq!(path, dir.path().join("report.csv"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "backup_planilha");
        assert_eq!(&rows[0][1], "file");
    }

    #[test]
    fn test_report_format_from_str() {
        assert_eq!("JSON".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
