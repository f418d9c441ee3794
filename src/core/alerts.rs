use crate::config::toml_config::AlertThresholds;
use crate::core::metrics::{OperationRecord, PerformanceMetrics};
use crate::utils::monitor::SystemSample;
use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAlert {
    pub kind: &'static str,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

/// Alertas de desempenho; cada alerta distinto dispara uma vez até `reset`.
pub struct PerformanceAlerts {
    thresholds: AlertThresholds,
    sent: Mutex<HashSet<String>>,
}

impl PerformanceAlerts {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            sent: Mutex::new(HashSet::new()),
        }
    }

    fn first_time(&self, key: String) -> bool {
        match self.sent.lock() {
            Ok(mut sent) => sent.insert(key),
            Err(_) => true,
        }
    }

    pub fn check(&self, metrics: &PerformanceMetrics) -> Vec<PerformanceAlert> {
        let mut alerts = Vec::new();
        let stats = metrics.general_stats();

        if stats.total_operations > 0 {
            let slow_rate = stats.slow_rate();
            if slow_rate > self.thresholds.slow_operation_rate
                && self.first_time(format!("slow_rate_{:.1}", slow_rate))
            {
                alerts.push(PerformanceAlert {
                    kind: "slow_operations",
                    severity: AlertSeverity::Warning,
                    message: format!("High rate of slow operations: {:.1}%", slow_rate),
                    value: slow_rate,
                    threshold: self.thresholds.slow_operation_rate,
                });
            }

            let very_slow_rate = stats.very_slow_rate();
            if very_slow_rate > self.thresholds.very_slow_operation_rate
                && self.first_time(format!("very_slow_rate_{:.1}", very_slow_rate))
            {
                alerts.push(PerformanceAlert {
                    kind: "very_slow_operations",
                    severity: AlertSeverity::Critical,
                    message: format!("High rate of very slow operations: {:.1}%", very_slow_rate),
                    value: very_slow_rate,
                    threshold: self.thresholds.very_slow_operation_rate,
                });
            }
        }

        let average = stats.average_duration_ms;
        if average > self.thresholds.average_duration_ms
            && self.first_time(format!("avg_duration_{:.0}", average))
        {
            alerts.push(PerformanceAlert {
                kind: "high_average_duration",
                severity: AlertSeverity::Warning,
                message: format!("High average duration: {:.0}ms", average),
                value: average,
                threshold: self.thresholds.average_duration_ms,
            });
        }

        if let Some(latest) = metrics.system_metrics(5).last() {
            alerts.extend(self.check_system(latest));
        }

        for alert in &alerts {
            match alert.severity {
                AlertSeverity::Warning => tracing::warn!(kind = alert.kind, "⚠️ {}", alert.message),
                AlertSeverity::Critical => tracing::error!(kind = alert.kind, "🚨 {}", alert.message),
            }
        }

        alerts
    }

    fn check_system(&self, sample: &SystemSample) -> Vec<PerformanceAlert> {
        let mut alerts = Vec::new();
        let memory = sample.memory_percent as f64;
        let cpu = sample.cpu_percent as f64;

        if memory > self.thresholds.memory_usage_percent
            && self.first_time(format!("memory_{:.1}", memory))
        {
            alerts.push(PerformanceAlert {
                kind: "high_memory_usage",
                severity: AlertSeverity::Warning,
                message: format!("High memory usage: {:.1}%", memory),
                value: memory,
                threshold: self.thresholds.memory_usage_percent,
            });
        }

        if cpu > self.thresholds.cpu_usage_percent && self.first_time(format!("cpu_{:.1}", cpu)) {
            alerts.push(PerformanceAlert {
                kind: "high_cpu_usage",
                severity: AlertSeverity::Critical,
                message: format!("High CPU usage: {:.1}%", cpu),
                value: cpu,
                threshold: self.thresholds.cpu_usage_percent,
            });
        }

        alerts
    }

    pub fn reset(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryAnalysis {
    pub average_duration_ms: f64,
    pub total_operations: usize,
    pub performance_level: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationCandidate {
    pub operation: String,
    pub duration_ms: f64,
    pub category: &'static str,
    pub optimization_priority: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendAnalysis {
    pub category_analysis: BTreeMap<String, CategoryAnalysis>,
    pub optimization_candidates: Vec<OptimizationCandidate>,
    pub general_health: &'static str,
    pub cache_effectiveness: f64,
    pub alerts: Vec<PerformanceAlert>,
}

fn category_level(avg_duration: f64) -> &'static str {
    if avg_duration < 500.0 {
        "good"
    } else if avg_duration < 2000.0 {
        "slow"
    } else {
        "poor"
    }
}

fn candidate(op: &OperationRecord) -> OptimizationCandidate {
    OptimizationCandidate {
        operation: op.operation.clone(),
        duration_ms: op.duration_ms,
        category: op.category,
        optimization_priority: if op.duration_ms > 5000.0 { "high" } else { "medium" },
    }
}

pub fn analyze_trends(metrics: &PerformanceMetrics, alerts: &PerformanceAlerts) -> TrendAnalysis {
    let summary = metrics.summary();

    let category_analysis = summary
        .category_stats
        .iter()
        .filter(|(_, stats)| stats.count > 0)
        .map(|(category, stats)| {
            (
                category.clone(),
                CategoryAnalysis {
                    average_duration_ms: stats.avg_duration,
                    total_operations: stats.count,
                    performance_level: category_level(stats.avg_duration),
                },
            )
        })
        .collect();

    TrendAnalysis {
        category_analysis,
        optimization_candidates: metrics.slow_operations(10).iter().map(candidate).collect(),
        general_health: if summary.general_stats.average_duration_ms < 1000.0 {
            "good"
        } else {
            "needs_attention"
        },
        cache_effectiveness: summary.general_stats.cache_hit_rate,
        alerts: alerts.check(metrics),
    }
}

pub fn dashboard(metrics: &PerformanceMetrics, alerts: &PerformanceAlerts) -> Value {
    let summary = metrics.summary();
    let trends = analyze_trends(metrics, alerts);
    let system_status = metrics
        .system_metrics(30)
        .last()
        .and_then(|s| serde_json::to_value(s).ok())
        .unwrap_or_else(|| json!({}));
    let stats = &summary.general_stats;

    json!({
        "timestamp": Local::now().to_rfc3339(),
        "overview": {
            "total_operations": stats.total_operations,
            "average_duration_ms": stats.average_duration_ms,
            "slow_operations_rate": stats.slow_operations as f64 / stats.total_operations.max(1) as f64 * 100.0,
            "cache_hit_rate": stats.cache_hit_rate,
            "health_status": trends.general_health,
        },
        "top_operations": summary.most_common_operations.iter().take(5).collect::<Vec<_>>(),
        "slow_operations": metrics.slow_operations(5),
        "system_status": system_status,
        "alerts": trends.alerts,
        "optimization_suggestions": trends.optimization_candidates.iter().take(3).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PerformanceMetrics, PerformanceAlerts) {
        let dir = TempDir::new().unwrap();
        let metrics = PerformanceMetrics::new(dir.path());
        (dir, metrics, PerformanceAlerts::new(AlertThresholds::default()))
    }

    #[test]
    fn test_slow_rate_alert_fires_once() {
        let (_dir, metrics, alerts) = setup();
        metrics.record_operation("op", 1200.0, Map::new());
        metrics.record_operation("op", 100.0, Map::new());

        let fired = alerts.check(&metrics);
        assert!(fired.iter().any(|a| a.kind == "slow_operations"));
        assert!(!fired.iter().any(|a| a.kind == "high_average_duration"));

        assert!(alerts.check(&metrics).is_empty());

        alerts.reset();
        assert!(!alerts.check(&metrics).is_empty());
    }

    #[test]
    fn test_very_slow_and_average_alerts() {
        let (_dir, metrics, alerts) = setup();
        metrics.record_operation("etapa7_fechamento_caixa", 9000.0, Map::new());

        let fired = alerts.check(&metrics);
        let kinds: Vec<&str> = fired.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&"very_slow_operations"));
        assert!(kinds.contains(&"high_average_duration"));
        assert!(!kinds.contains(&"slow_operations"));
    }

    #[test]
    fn test_system_alerts_from_latest_sample() {
        let (_dir, metrics, alerts) = setup();
        let mut sample = SystemSample::empty();
        sample.memory_percent = 91.0;
        sample.cpu_percent = 95.5;
        metrics.record_system_sample(sample);

        let fired = alerts.check(&metrics);
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[1].severity, AlertSeverity::Critical);
    }

    #[test]
    fn test_trends_and_dashboard() {
        let (_dir, metrics, alerts) = setup();
        metrics.record_operation("cache_hit_wb", 2.0, Map::new());
        metrics.record_operation("etapa2_minimercado", 7000.0, Map::new());
        metrics.record_operation("backup_planilha", 800.0, Map::new());

        let trends = analyze_trends(&metrics, &alerts);
        assert_eq!(trends.category_analysis["cache"].performance_level, "good");
        assert_eq!(trends.category_analysis["file"].performance_level, "slow");
        assert_eq!(trends.category_analysis["automation"].performance_level, "poor");
        assert_eq!(trends.optimization_candidates[0].optimization_priority, "high");
        assert_eq!(trends.general_health, "needs_attention");
        assert_eq!(trends.cache_effectiveness, 100.0);

        let board = dashboard(&metrics, &alerts);
        assert_eq!(board["overview"]["total_operations"], 3);
        assert_eq!(board["overview"]["health_status"], "needs_attention");
        assert_eq!(board["system_status"], json!({}));
    }
}
