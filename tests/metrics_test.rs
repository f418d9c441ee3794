use anyhow::Result;
use oceanicdesk::config::toml_config::MetricsConfig;
use oceanicdesk::core::alerts::{analyze_trends, PerformanceAlerts};
use oceanicdesk::core::metrics::ReportFormat;
use oceanicdesk::{DeskError, PerformanceMetrics};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_measure_async_records_success_and_error() {
    let temp_dir = TempDir::new().unwrap();
    let metrics = PerformanceMetrics::new(temp_dir.path());

    let ok = metrics
        .measure_async("load_workbook", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(3)
        })
        .await;
    assert_eq!(ok.unwrap(), 3);

    let err = metrics
        .measure_async("load_workbook", async {
            Err::<(), _>(DeskError::automation("Etapa 2", "sem janela"))
        })
        .await;
    assert!(err.is_err());

    let stats = metrics.operation_stats("load_workbook").unwrap();
    assert_eq!(stats.metrics_count, 1);
    assert!(stats.average_duration_ms >= 5.0);
    assert_eq!(stats.category, "excel");
    assert!(metrics.operation_stats("load_workbook_error").is_some());
    assert_eq!(metrics.general_stats().total_operations, 2);
}

#[tokio::test]
async fn test_background_collection_start_stop() {
    let temp_dir = TempDir::new().unwrap();
    let metrics = Arc::new(PerformanceMetrics::from_config(&MetricsConfig {
        dir: temp_dir.path().display().to_string(),
        collection_interval_seconds: 1,
        ..MetricsConfig::default()
    }));

    metrics.start_collection();
    metrics.start_collection();
    assert!(metrics.is_collecting());

    // o primeiro tick do intervalo é imediato
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!metrics.system_metrics(5).is_empty());

    metrics.stop_collection();
    assert!(!metrics.is_collecting());
}

#[test]
fn test_json_report_and_trends() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let metrics = PerformanceMetrics::new(temp_dir.path().join("relatorios"));
    metrics.record_operation("etapa1_backup_e_precos", 300.0, serde_json::Map::new());
    metrics.record_operation("etapa7_fechamento_caixa", 6200.0, serde_json::Map::new());
    metrics.record_operation("cache_hit_workbook", 1.0, serde_json::Map::new());
    metrics.record_operation("cache_miss_workbook", 90.0, serde_json::Map::new());

    let path = metrics.export_report(ReportFormat::Json, Some("fechamento.json"))?;
    assert_eq!(path, temp_dir.path().join("relatorios").join("fechamento.json"));

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(report["summary"]["general_stats"]["total_operations"], 4);
    assert_eq!(report["slow_operations"][0]["operation"], "etapa7_fechamento_caixa");
    assert!(report["operation_details"]["etapa1_backup_e_precos"].is_object());

    let trends = analyze_trends(&metrics, &PerformanceAlerts::new(Default::default()));
    assert_eq!(trends.cache_effectiveness, 50.0);
    assert_eq!(trends.optimization_candidates.len(), 1);
    assert_eq!(trends.category_analysis["automation"].performance_level, "poor");
    Ok(())
}
