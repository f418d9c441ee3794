use crate::config::toml_config::AppConfig;
use crate::core::cache::FileCache;
use crate::core::metrics::PerformanceMetrics;
use crate::domain::model::{FailurePolicy, StepId, StepOutcome, StepResult, StepStatus};
use crate::utils::error::{DeskError, ErrorHandler, Result};
use crate::utils::logger::log_operation;
use crate::utils::monitor::SystemMonitor;
use chrono::{Local, NaiveDate};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Estado compartilhado entre as etapas de uma execução.
pub struct StepContext {
    pub execution_id: String,
    pub config: Arc<AppConfig>,
    pub cache: Arc<FileCache>,
    pub metrics: Arc<PerformanceMetrics>,
    pub today: NaiveDate,
    pub shared_data: BTreeMap<String, Value>,
    pub results: Vec<StepResult>,
}

impl StepContext {
    pub fn new(config: Arc<AppConfig>, cache: Arc<FileCache>, metrics: Arc<PerformanceMetrics>) -> Self {
        let now = Local::now();
        Self {
            execution_id: now.format("run_%Y%m%d_%H%M%S").to_string(),
            config,
            cache,
            metrics,
            today: now.date_naive(),
            shared_data: BTreeMap::new(),
            results: Vec::new(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn add_shared_data(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.shared_data.insert(key.into(), value.into());
    }

    pub fn get_shared_data(&self, key: &str) -> Option<&Value> {
        self.shared_data.get(key)
    }

    pub fn result_for(&self, step: StepId) -> Option<&StepResult> {
        self.results.iter().rev().find(|r| r.step == step)
    }

    pub fn add_result(&mut self, result: StepResult) {
        self.results.push(result);
    }

    /// Resumo, resultado de cada etapa (com as saídas) e os dados compartilhados.
    pub fn report(&self) -> Result<Value> {
        Ok(json!({
            "execution_id": self.execution_id,
            "date": self.today.to_string(),
            "summary": Value::Object(StepPipeline::execution_summary(&self.results)),
            "steps": serde_json::to_value(&self.results)?,
            "shared_data": serde_json::to_value(&self.shared_data)?,
        }))
    }

    /// Grava o relatório em `{dir}/{execution_id}.json`.
    pub fn write_report(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| ErrorHandler::file_error(e, dir, "create_reports_dir"))?;
        let path = dir.join(format!("{}.json", self.execution_id));
        std::fs::write(&path, serde_json::to_string_pretty(&self.report()?)?)
            .map_err(|e| ErrorHandler::file_error(e, &path, "write_run_report"))?;
        Ok(path)
    }
}

#[async_trait::async_trait]
pub trait Step: Send + Sync {
    fn id(&self) -> StepId;

    async fn run(&self, context: &mut StepContext) -> Result<StepOutcome>;

    /// Etapas desativadas em `[[steps]]` não rodam.
    fn should_run(&self, context: &StepContext) -> bool {
        context.config.step(self.id()).is_none_or(|s| s.enabled)
    }
}

/// Executa as etapas em ordem, aplicando a política de falha.
pub struct StepPipeline {
    steps: Vec<Box<dyn Step>>,
    policy: FailurePolicy,
    monitor: Option<SystemMonitor>,
}

impl StepPipeline {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            steps: Vec::new(),
            policy,
            monitor: None,
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(SystemMonitor::new);
        self
    }

    pub fn add_step(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    /// Mantém apenas as etapas pedidas.
    pub fn retain(&mut self, wanted: &[StepId]) {
        self.steps.retain(|s| wanted.contains(&s.id()));
    }

    /// Roda todas as etapas. Com `FailurePolicy::Stop` a primeira falha interrompe
    /// a execução com `DeskError::StepFailed`; o resultado da etapa fica no contexto.
    pub async fn execute(&self, context: &mut StepContext) -> Result<Vec<StepResult>> {
        let first_result = context.results.len();
        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Pipeline execution started.");
        }
        tracing::info!(
            "🚀 Starting pipeline {} ({} steps, on_failure={:?})",
            context.execution_id,
            self.steps.len(),
            self.policy
        );

        for step in &self.steps {
            let id = step.id();

            if !step.should_run(context) {
                tracing::info!("⏭️ Skipping {} (disabled)", id);
                context.add_result(StepResult {
                    step: id,
                    status: StepStatus::Skipped,
                    duration: Duration::ZERO,
                    message: Some("disabled in configuration".to_string()),
                    outputs: Map::new(),
                });
                continue;
            }

            let result = self.execute_step(step.as_ref(), context).await;
            let failed = result.is_failure();
            let message = result.message.clone().unwrap_or_default();
            context.add_result(result);

            if failed && self.policy == FailurePolicy::Stop {
                return Err(DeskError::StepFailed {
                    number: id.number(),
                    name: id.name().to_string(),
                    message,
                });
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Pipeline execution completed.");
            tracing::info!("📊 Peak process memory: {} MB", monitor.peak_memory_mb());
        }

        Ok(context.results[first_result..].to_vec())
    }

    async fn execute_step(&self, step: &dyn Step, context: &mut StepContext) -> StepResult {
        let id = step.id();
        tracing::info!("▶️ {}", id);
        log_operation(&id.metric_name(), "STARTED", &crate::details!("step" => id.number()));

        let metrics = Arc::clone(&context.metrics);
        let started = Instant::now();
        let outcome = metrics.measure_async(&id.metric_name(), step.run(context)).await;
        let duration = started.elapsed();

        match outcome {
            Ok(outcome) => {
                let status = if outcome.skipped {
                    tracing::warn!(
                        "⚠️ {} skipped: {}",
                        id,
                        outcome.message.as_deref().unwrap_or_default()
                    );
                    StepStatus::Skipped
                } else {
                    tracing::info!("✅ {} finished in {:?}", id, duration);
                    StepStatus::Success
                };
                log_operation(
                    &id.metric_name(),
                    if outcome.skipped { "SKIPPED" } else { "SUCCESS" },
                    &crate::details!("duration_ms" => duration.as_millis() as u64),
                );
                StepResult {
                    step: id,
                    status,
                    duration,
                    message: outcome.message,
                    outputs: outcome.outputs,
                }
            }
            Err(e) => {
                tracing::error!("❌ {} failed: {}", id, e);
                tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                let mut details = e.details();
                details.insert("duration_ms".to_string(), Value::from(duration.as_millis() as u64));
                log_operation(&id.metric_name(), "ERROR", &details);
                StepResult {
                    step: id,
                    status: StepStatus::Failed,
                    duration,
                    message: Some(e.to_string()),
                    outputs: Map::new(),
                }
            }
        }
    }

    pub fn execution_summary(results: &[StepResult]) -> Map<String, Value> {
        let count = |status: StepStatus| results.iter().filter(|r| r.status == status).count();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();
        let names = |status: StepStatus| -> Vec<Value> {
            results
                .iter()
                .filter(|r| r.status == status)
                .map(|r| Value::String(r.step.to_string()))
                .collect()
        };

        let mut summary = Map::new();
        summary.insert("total_steps".to_string(), Value::from(results.len()));
        summary.insert("succeeded".to_string(), Value::from(count(StepStatus::Success)));
        summary.insert("skipped".to_string(), Value::from(count(StepStatus::Skipped)));
        summary.insert("failed".to_string(), Value::from(count(StepStatus::Failed)));
        summary.insert(
            "total_duration_ms".to_string(),
            Value::from(total_duration.as_millis() as u64),
        );
        summary.insert("executed_steps".to_string(), Value::Array(names(StepStatus::Success)));
        summary.insert("failed_steps".to_string(), Value::Array(names(StepStatus::Failed)));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::toml_config::StepConfig;
    use tempfile::TempDir;

    struct MockStep {
        id: StepId,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Step for MockStep {
        fn id(&self) -> StepId {
            self.id
        }

        async fn run(&self, context: &mut StepContext) -> Result<StepOutcome> {
            if self.fail {
                return Err(DeskError::automation(self.id.name(), "window not found"));
            }
            context.add_shared_data(format!("etapa{}.ok", self.id.number()), true);
            Ok(StepOutcome::done("ok").with_output("step", self.id.number()))
        }
    }

    fn context(dir: &TempDir, config: AppConfig) -> StepContext {
        let metrics = Arc::new(PerformanceMetrics::new(dir.path().join("metrics")));
        let cache = Arc::new(FileCache::new(dir.path().join("cache"), Duration::from_secs(60)).unwrap());
        StepContext::new(Arc::new(config), cache, metrics)
    }

    fn pipeline(policy: FailurePolicy, failing: Option<StepId>) -> StepPipeline {
        let mut pipeline = StepPipeline::new(policy);
        for id in [StepId::BackupPrices, StepId::MiniMarket, StepId::LitersDiscounts] {
            pipeline.add_step(Box::new(MockStep {
                id,
                fail: Some(id) == failing,
            }));
        }
        pipeline
    }

    #[tokio::test]
    async fn test_runs_steps_in_order_and_records_metrics() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, AppConfig::default());

        let results = pipeline(FailurePolicy::Stop, None).execute(&mut ctx).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.status == StepStatus::Success));
        assert_eq!(results[1].step, StepId::MiniMarket);
        assert_eq!(ctx.get_shared_data("etapa3.ok"), Some(&Value::Bool(true)));
        assert_eq!(
            ctx.metrics.operation_stats("etapa2_minimercado").map(|s| s.metrics_count),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_stop_policy_aborts_on_first_failure() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, AppConfig::default());

        let err = pipeline(FailurePolicy::Stop, Some(StepId::MiniMarket))
            .execute(&mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, DeskError::StepFailed { number: 2, .. }));
        assert_eq!(ctx.results.len(), 2);
        assert!(ctx.result_for(StepId::LitersDiscounts).is_none());
        assert!(ctx.metrics.operation_stats("etapa2_minimercado_error").is_some());
    }

    #[tokio::test]
    async fn test_continue_policy_records_failure_and_proceeds() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, AppConfig::default());

        let results = pipeline(FailurePolicy::Continue, Some(StepId::BackupPrices))
            .execute(&mut ctx)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_failure());
        assert_eq!(results[2].status, StepStatus::Success);

        let summary = StepPipeline::execution_summary(&results);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["succeeded"], 2);
        assert_eq!(summary["failed_steps"][0], "Etapa 1: Backup e Preços");
    }

    #[test]
    fn test_disabled_step_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        let mut disabled = StepConfig::new(2);
        disabled.enabled = false;
        config.steps.push(disabled);
        let mut ctx = context(&dir, config);

        let mut pipeline = pipeline(FailurePolicy::Stop, Some(StepId::MiniMarket));
        let results = tokio_test::assert_ok!(tokio_test::block_on(pipeline.execute(&mut ctx)));
        assert_eq!(results[1].status, StepStatus::Skipped);

        pipeline.retain(&[StepId::LitersDiscounts]);
        assert_eq!(pipeline.step_ids(), vec![StepId::LitersDiscounts]);
    }
}
