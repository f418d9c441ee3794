use anyhow::Result;
use oceanicdesk::core::cache::{file_fingerprint, CacheKind, FileCache};
use oceanicdesk::PerformanceMetrics;
use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn cache_in(dir: &TempDir, ttl: Duration) -> FileCache {
    FileCache::new(dir.path().join("cache"), ttl).unwrap()
}

#[test]
fn test_round_trip_until_source_changes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let cache = cache_in(&temp_dir, Duration::from_secs(3600));
    let source = temp_dir.path().join("vendas.xlsx");
    std::fs::write(&source, b"conteudo")?;

    let value = vec![("Combustíveis".to_string(), 1234.56), ("Loja".to_string(), 78.9)];
    assert!(cache.set_file_entry(CacheKind::Sheet, &source, "Dia 01", &value));
    assert_eq!(
        cache.get_file_entry::<Vec<(String, f64)>>(CacheKind::Sheet, &source, "Dia 01"),
        Some(value)
    );

    let before = file_fingerprint(&source);
    File::options()
        .write(true)
        .open(&source)?
        .set_modified(SystemTime::now() + Duration::from_secs(120))?;
    assert_ne!(file_fingerprint(&source), before);
    assert_eq!(
        cache.get_file_entry::<Vec<(String, f64)>>(CacheKind::Sheet, &source, "Dia 01"),
        None
    );
    Ok(())
}

#[test]
fn test_expired_entries_miss() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir, Duration::ZERO);
    assert!(cache.set_value("total", &42.0));
    assert_eq!(cache.get_value::<f64>("total"), None);
}

#[test]
fn test_disabled_cache_skips_everything() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir, Duration::from_secs(60));
    cache.set_enabled(false);
    assert!(!cache.set_value("total", &1));
    assert_eq!(cache.get_value::<i32>("total"), None);
    assert_eq!(cache.stats().total_files, 0);
}

#[test]
fn test_hits_and_misses_are_measured() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let metrics = Arc::new(PerformanceMetrics::new(temp_dir.path().join("metrics")));
    let cache = cache_in(&temp_dir, Duration::from_secs(60)).with_metrics(Arc::clone(&metrics));

    let mut calls = 0;
    for _ in 0..3 {
        let value: f64 = cache.get_or_insert_with(CacheKind::Processed, "soma", || {
            calls += 1;
            Ok(579.44)
        })?;
        assert_eq!(value, 579.44);
    }

    assert_eq!(calls, 1);
    assert_eq!(metrics.operation_stats("cache_miss_processed").map(|s| s.metrics_count), Some(1));
    assert_eq!(metrics.operation_stats("cache_hit_processed").map(|s| s.metrics_count), Some(2));
    Ok(())
}

#[test]
fn test_invalidate_and_clear() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let cache = cache_in(&temp_dir, Duration::from_secs(60));
    let source = temp_dir.path().join("planilha.xlsx");
    std::fs::write(&source, b"abc")?;

    cache.set_file_entry(CacheKind::Workbook, &source, "values", &1);
    cache.set_file_entry(CacheKind::Sheet, &source, "Dia 02", &2);
    cache.set_value("outro", &3);

    assert_eq!(cache.invalidate_file(&source), 2);
    assert_eq!(cache.get_value::<i32>("outro"), Some(3));
    assert_eq!(cache.clear(None), 1);
    assert_eq!(cache.stats().total_files, 0);
    Ok(())
}
