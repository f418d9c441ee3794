use crate::domain::model::{ExternalCommand, FailurePolicy, StepId};
use crate::utils::error::{DeskError, Result};
use crate::utils::validation::{validate_path, validate_positive_number, validate_range, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "oceanicdesk.toml";

static RE_ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"));

fn home_dir() -> PathBuf {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub paths: PathsConfig,
    pub cache: CacheConfig,
    pub metrics: MetricsConfig,
    pub pipeline: PipelineConfig,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub dev_mode: bool,
    pub log_dir: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "OceanicDesk".to_string(),
            dev_mode: false,
            log_dir: Some("logs".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub env_file: String,
    pub env_backup_dir: String,
    /// Planilha principal; sem valor usa `CAMINHO_PLANILHA` do ambiente.
    pub spreadsheet: Option<String>,
    /// Onde o sistema externo exporta o `tmp*.xlsx`; sem valor usa a área de trabalho.
    pub handoff_dir: Option<String>,
    /// Relatórios de execução e abas preparadas pela etapa 1.
    pub reports_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            env_file: ".env".to_string(),
            env_backup_dir: "backups/env".to_string(),
            spreadsheet: None,
            handoff_dir: None,
            reports_dir: "reports".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: String,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: home_dir().join(".oceanicdesk_cache").display().to_string(),
            ttl_seconds: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub dir: String,
    pub collection_interval_seconds: u64,
    pub slow_threshold_ms: f64,
    pub very_slow_threshold_ms: f64,
    pub alerts: AlertThresholds,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: home_dir().join(".oceanicdesk_metrics").display().to_string(),
            collection_interval_seconds: 30,
            slow_threshold_ms: 1000.0,
            very_slow_threshold_ms: 5000.0,
            alerts: AlertThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub slow_operation_rate: f64,
    pub very_slow_operation_rate: f64,
    pub average_duration_ms: f64,
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            slow_operation_rate: 20.0,
            very_slow_operation_rate: 5.0,
            average_duration_ms: 2000.0,
            memory_usage_percent: 80.0,
            cpu_usage_percent: 90.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub on_failure: FailurePolicy,
    pub handoff_timeout_seconds: u64,
    pub handoff_poll_interval_ms: u64,
    /// Limite para cada comando externo; um executável travado não segura o fechamento.
    pub command_timeout_seconds: u64,
    pub auto_update_config: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_failure: FailurePolicy::Stop,
            handoff_timeout_seconds: 30,
            handoff_poll_interval_ms: 500,
            command_timeout_seconds: 600,
            auto_update_config: true,
        }
    }
}

impl PipelineConfig {
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_secs(self.handoff_timeout_seconds)
    }

    pub fn handoff_poll_interval(&self) -> Duration {
        Duration::from_millis(self.handoff_poll_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

/// Configuração de uma etapa (`[[steps]]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    pub number: u8,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub command: Option<ExternalCommand>,
    /// Espera o `tmp*.xlsx` depois do comando.
    #[serde(default)]
    pub handoff: bool,
    /// Rótulo procurado no export (ex.: "Total Geral (Todos os Departamentos)").
    pub value_label: Option<String>,
    /// Coluna do valor ao lado do rótulo, em letra ("R").
    pub value_column: Option<String>,
}

fn default_true() -> bool {
    true
}

impl StepConfig {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            enabled: true,
            command: None,
            handoff: false,
            value_label: None,
            value_column: None,
        }
    }
}

impl AppConfig {
    /// Carrega `oceanicdesk.toml`; arquivo ausente resulta na configuração padrão.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("ℹ️ {} not found, using default configuration", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed_content)?)
    }

    /// Substitui `${VAR}` pelo valor do ambiente; variáveis ausentes ficam como estão.
    fn substitute_env_vars(content: &str) -> String {
        RE_ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn step(&self, id: StepId) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.number == id.number())
    }

    pub fn spreadsheet_path(&self) -> Option<PathBuf> {
        self.paths
            .spreadsheet
            .clone()
            .filter(|p| !p.trim().is_empty() && !p.contains("${"))
            .or_else(|| std::env::var("CAMINHO_PLANILHA").ok().filter(|p| !p.is_empty()))
            .map(PathBuf::from)
    }

    pub fn handoff_dir(&self) -> Option<PathBuf> {
        self.paths
            .handoff_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::utils::files::desktop_dir)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.app.log_dir.as_ref().map(PathBuf::from)
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_path("paths.env_file", &self.paths.env_file)?;
        validate_path("paths.env_backup_dir", &self.paths.env_backup_dir)?;
        validate_path("paths.reports_dir", &self.paths.reports_dir)?;
        validate_path("cache.dir", &self.cache.dir)?;
        validate_path("metrics.dir", &self.metrics.dir)?;

        validate_positive_number("cache.ttl_seconds", self.cache.ttl_seconds as usize, 1)?;
        validate_positive_number(
            "metrics.collection_interval_seconds",
            self.metrics.collection_interval_seconds as usize,
            1,
        )?;
        validate_positive_number(
            "pipeline.handoff_poll_interval_ms",
            self.pipeline.handoff_poll_interval_ms as usize,
            1,
        )?;
        validate_positive_number(
            "pipeline.command_timeout_seconds",
            self.pipeline.command_timeout_seconds as usize,
            1,
        )?;

        if self.metrics.slow_threshold_ms <= 0.0
            || self.metrics.very_slow_threshold_ms <= self.metrics.slow_threshold_ms
        {
            return Err(DeskError::InvalidConfigValueError {
                field: "metrics.very_slow_threshold_ms".to_string(),
                value: self.metrics.very_slow_threshold_ms.to_string(),
                reason: "must be greater than metrics.slow_threshold_ms (> 0)".to_string(),
            });
        }

        let alerts = &self.metrics.alerts;
        validate_range("metrics.alerts.slow_operation_rate", alerts.slow_operation_rate, 0.0, 100.0)?;
        validate_range(
            "metrics.alerts.very_slow_operation_rate",
            alerts.very_slow_operation_rate,
            0.0,
            100.0,
        )?;
        validate_range("metrics.alerts.memory_usage_percent", alerts.memory_usage_percent, 0.0, 100.0)?;
        validate_range("metrics.alerts.cpu_usage_percent", alerts.cpu_usage_percent, 0.0, 100.0)?;

        let mut seen = HashSet::new();
        for step in &self.steps {
            if StepId::from_number(step.number).is_none() {
                return Err(DeskError::InvalidConfigValueError {
                    field: "steps.number".to_string(),
                    value: step.number.to_string(),
                    reason: "Step number must be between 1 and 8".to_string(),
                });
            }
            if !seen.insert(step.number) {
                return Err(DeskError::InvalidConfigValueError {
                    field: "steps.number".to_string(),
                    value: step.number.to_string(),
                    reason: "Step configured more than once".to_string(),
                });
            }
            if let Some(command) = &step.command {
                crate::utils::validation::validate_non_empty_string(
                    &format!("steps[{}].command.program", step.number),
                    &command.program,
                )?;
            }
            if step.value_label.is_some() && !step.handoff {
                return Err(DeskError::InvalidConfigValueError {
                    field: format!("steps[{}].value_label", step.number),
                    value: step.value_label.clone().unwrap_or_default(),
                    reason: "value_label requires handoff = true".to_string(),
                });
            }
            if let Some(column) = &step.value_column {
                if crate::core::workbook::column_index(column).is_none() {
                    return Err(DeskError::InvalidConfigValueError {
                        field: format!("steps[{}].value_column", step.number),
                        value: column.clone(),
                        reason: "expected a column letter such as \"R\"".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[app]
name = "Posto Oceânico"
log_dir = "logs"

[paths]
env_file = ".env"
spreadsheet = "/dados/2025/07 - JULHO/Planilha.xlsx"

[cache]
enabled = false
dir = "/tmp/oceanicdesk_cache"
ttl_seconds = 600

[metrics]
dir = "/tmp/oceanicdesk_metrics"

[metrics.alerts]
cpu_usage_percent = 95.0

[pipeline]
on_failure = "continue"
handoff_timeout_seconds = 10

[[steps]]
number = 2
handoff = true
value_label = "Total Geral (Todos os Departamentos)"
value_column = "R"
command = { program = "autosystem-macro", args = ["minimercado"] }

[[steps]]
number = 6
enabled = false
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.app.name, "Posto Oceânico");
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.ttl(), Duration::from_secs(600));
        assert_eq!(config.metrics.alerts.cpu_usage_percent, 95.0);
        assert_eq!(config.metrics.alerts.memory_usage_percent, 80.0);
        assert_eq!(config.pipeline.on_failure, FailurePolicy::Continue);
        assert_eq!(config.pipeline.handoff_poll_interval_ms, 500);

        let step2 = config.step(StepId::MiniMarket).unwrap();
        assert!(step2.handoff);
        assert_eq!(step2.command.as_ref().unwrap().args, vec!["minimercado"]);
        assert!(!config.step(StepId::EmailReport).unwrap().enabled);
        assert!(config.step(StepId::CashClosing).is_none());

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.cache.ttl_seconds, 3600);
        assert!(config.cache.dir.ends_with(".oceanicdesk_cache"));
        assert_eq!(config.metrics.slow_threshold_ms, 1000.0);
        assert_eq!(config.pipeline.on_failure, FailurePolicy::Stop);
        assert!(config.steps.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_command_timeout() {
        let config = AppConfig::from_toml_str("[pipeline]\ncommand_timeout_seconds = 120\n").unwrap();
        assert_eq!(config.pipeline.command_timeout(), Duration::from_secs(120));
        assert_eq!(AppConfig::default().pipeline.command_timeout_seconds, 600);
        assert_eq!(config.paths.reports_dir, "reports");

        let mut config = AppConfig::default();
        config.pipeline.command_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_variable_substitution() {
        std::env::set_var("OCEANICDESK_TEST_PLANILHA", "/dados/planilha.xlsx");
        let config = AppConfig::from_toml_str(
            r#"
[paths]
spreadsheet = "${OCEANICDESK_TEST_PLANILHA}"
handoff_dir = "${OCEANICDESK_TEST_UNDEFINED}"
"#,
        )
        .unwrap();

        assert_eq!(config.paths.spreadsheet.as_deref(), Some("/dados/planilha.xlsx"));
        assert_eq!(
            config.paths.handoff_dir.as_deref(),
            Some("${OCEANICDESK_TEST_UNDEFINED}")
        );
        std::env::remove_var("OCEANICDESK_TEST_PLANILHA");
    }

    #[test]
    fn test_invalid_step_configuration() {
        let mut config = AppConfig::default();
        config.steps.push(StepConfig::new(9));
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.steps.push(StepConfig::new(3));
        config.steps.push(StepConfig::new(3));
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        let mut step = StepConfig::new(4);
        step.value_label = Some("Total".to_string());
        config.steps.push(step);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_thresholds() {
        let mut config = AppConfig::default();
        config.metrics.very_slow_threshold_ms = 500.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.metrics.alerts.memory_usage_percent = 140.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_failure_policy_is_rejected() {
        assert!(AppConfig::from_toml_str("[pipeline]\non_failure = \"retry\"").is_err());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let config = AppConfig::load("/nonexistent/oceanicdesk.toml").unwrap();
        assert_eq!(config.app.name, "OceanicDesk");
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[cache]\nttl_seconds = 120").unwrap();

        let config = AppConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.cache.ttl_seconds, 120);
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = AppConfig::from_toml_str(include_str!("../../oceanicdesk.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.steps.len(), 5);
        assert_eq!(
            config.step(StepId::MiniMarket).and_then(|s| s.value_column.as_deref()),
            Some("R")
        );
    }

    #[test]
    fn test_invalid_value_column() {
        let config = AppConfig::from_toml_str(
            "[[steps]]\nnumber = 2\nhandoff = true\nvalue_label = \"Total\"\nvalue_column = \"R1\"\n",
        )
        .unwrap();
        assert!(config.validate_config().is_err());
    }
}
