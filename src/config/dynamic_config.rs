use crate::config::env_file::EnvFile;
use crate::config::toml_config::AppConfig;
use crate::core::metrics::PerformanceMetrics;
use crate::utils::error::{DeskError, ErrorHandler, Result};
use crate::utils::logger::log_operation;
use chrono::{Datelike, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

/// Variáveis do `.env` que mudam de mês para mês.
pub const MONTHLY_PATHS: [&str; 6] = [
    "CAMINHO_PLANILHA",
    "CAMINHO_CHACALTAYA",
    "CAMINHO_PLANILHA_VENDAS",
    "CAMINHO_MEU_CONTROLE",
    "CAMINHO_COMBUSTIVEL",
    "CAMINHO_COPIA_MES",
];

const MONTHS: [(&str, &str); 12] = [
    ("JANEIRO", "Janeiro"),
    ("FEVEREIRO", "Fevereiro"),
    ("MARÇO", "Março"),
    ("ABRIL", "Abril"),
    ("MAIO", "Maio"),
    ("JUNHO", "Junho"),
    ("JULHO", "Julho"),
    ("AGOSTO", "Agosto"),
    ("SETEMBRO", "Setembro"),
    ("OUTUBRO", "Outubro"),
    ("NOVEMBRO", "Novembro"),
    ("DEZEMBRO", "Dezembro"),
];

const UPPER: &str = "A-ZÁÊÇÕ";
const LETTERS: &str = "A-ZÁÊÇÕa-záêçõ";

#[derive(Debug, Clone, Copy)]
enum PathPattern {
    YearMonthDir,
    ChacaltayaSheet,
    SalesFile,
    MyControlFile,
    MonthDir,
    MonthCopyFile,
    OceanicoSalesFile,
}

static PATH_PATTERNS: LazyLock<Vec<(Regex, PathPattern)>> = LazyLock::new(|| {
    [
        (format!(r"([/\\])\d{{4}}([/\\])\d{{2}} - [{UPPER}]+([/\\])"), PathPattern::YearMonthDir),
        (format!(r"\d{{2}}-VENDA CHACALTAYA LOJA [{UPPER}]+ \d{{4}}"), PathPattern::ChacaltayaSheet),
        (format!(r"Vendas [{LETTERS}]+\.xlsx"), PathPattern::SalesFile),
        (format!(r"Meu Controle [{LETTERS}]+ - \d{{4}}\.xlsx"), PathPattern::MyControlFile),
        (format!(r"([/\\])\d{{2}} - [{UPPER}]+([/\\])"), PathPattern::MonthDir),
        (format!(r"Cópia de [{LETTERS}]+ - \d{{4}}\.xlsx"), PathPattern::MonthCopyFile),
        (format!(r"Vendas [{LETTERS}]+ Oceanico\.xlsx"), PathPattern::OceanicoSalesFile),
    ]
    .into_iter()
    .filter_map(|(pattern, kind)| Regex::new(&pattern).ok().map(|re| (re, kind)))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthInfo {
    /// "07"
    pub number: String,
    /// "JULHO"
    pub name: String,
    /// "Julho"
    pub name_cap: String,
    pub year: i32,
    pub month: u32,
}

impl MonthInfo {
    pub fn for_date(date: NaiveDate) -> Self {
        let (name, name_cap) = MONTHS[date.month0() as usize];
        Self {
            number: format!("{:02}", date.month()),
            name: name.to_string(),
            name_cap: name_cap.to_string(),
            year: date.year(),
            month: date.month(),
        }
    }
}

/// Reescreve um caminho para o mês informado.
pub fn rewrite_path_for_month(old_path: &str, info: &MonthInfo) -> String {
    let mut path = old_path.to_string();
    for (re, kind) in PATH_PATTERNS.iter() {
        path = re
            .replace_all(&path, |caps: &Captures| match kind {
                PathPattern::YearMonthDir => format!(
                    "{}{}{}{} - {}{}",
                    &caps[1], info.year, &caps[2], info.number, info.name, &caps[3]
                ),
                PathPattern::ChacaltayaSheet => format!(
                    "{}-VENDA CHACALTAYA LOJA {} {}",
                    info.number, info.name, info.year
                ),
                PathPattern::SalesFile => format!("Vendas {}.xlsx", info.name_cap),
                PathPattern::MyControlFile => {
                    format!("Meu Controle {} - {}.xlsx", info.name_cap, info.year)
                }
                PathPattern::MonthDir => {
                    format!("{}{} - {}{}", &caps[1], info.number, info.name, &caps[2])
                }
                PathPattern::MonthCopyFile => {
                    format!("Cópia de {} - {}.xlsx", info.name_cap, info.year)
                }
                PathPattern::OceanicoSalesFile => format!("Vendas {} Oceanico.xlsx", info.name_cap),
            })
            .into_owned();
    }
    path
}

pub fn format_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn start_br(&self) -> String {
        format_br(self.start)
    }

    pub fn end_br(&self) -> String {
        format_br(self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathChange {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateReport {
    pub current_day: u32,
    pub dates_updated: bool,
    pub paths_updated: bool,
    pub updates_performed: Vec<String>,
    pub date_range: Option<DateRange>,
    pub month_info: Option<MonthInfo>,
    pub updated_paths: BTreeMap<String, PathChange>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigStatus {
    pub current_day: u32,
    pub current_month: MonthInfo,
    pub auto_updates_enabled: bool,
    pub date_range: DateRange,
    pub date_logic: &'static str,
    pub next_actions: Vec<String>,
    pub paths_validation: BTreeMap<String, bool>,
    pub backup_available: bool,
}

/// Atualiza datas e caminhos mensais do `.env` de acordo com o dia atual.
pub struct DynamicConfigManager {
    env_path: PathBuf,
    backup_dir: PathBuf,
    now: NaiveDateTime,
    auto_updates: AtomicBool,
    metrics: Option<Arc<PerformanceMetrics>>,
}

impl DynamicConfigManager {
    pub fn new(env_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            env_path: env_path.into(),
            backup_dir: backup_dir.into(),
            now: Local::now().naive_local(),
            auto_updates: AtomicBool::new(true),
            metrics: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let manager = Self::new(&config.paths.env_file, &config.paths.env_backup_dir);
        manager.set_auto_updates(config.pipeline.auto_update_config);
        manager
    }

    /// Fixa a data de referência (útil para reprocessar um dia específico).
    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PerformanceMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn env_path(&self) -> &Path {
        &self.env_path
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn set_auto_updates(&self, enabled: bool) {
        self.auto_updates.store(enabled, Ordering::Relaxed);
    }

    pub fn auto_updates_enabled(&self) -> bool {
        self.auto_updates.load(Ordering::Relaxed)
    }

    pub fn should_update_dates(&self) -> bool {
        self.today().day() == 1
    }

    pub fn should_update_paths(&self) -> bool {
        self.today().day() == 2
    }

    pub fn current_month_info(&self) -> MonthInfo {
        MonthInfo::for_date(self.today())
    }

    pub fn previous_month_dates(&self) -> DateRange {
        let first_of_month = self.today().with_day(1).unwrap_or(self.today());
        let end = first_of_month - ChronoDuration::days(1);
        let start = end.with_day(1).unwrap_or(end);
        DateRange { start, end }
    }

    /// Dia 1: mês anterior completo. Demais dias: do dia 1 até ontem.
    pub fn dynamic_dates(&self) -> DateRange {
        if self.should_update_dates() {
            return self.previous_month_dates();
        }
        let today = self.today();
        DateRange {
            start: today.with_day(1).unwrap_or(today),
            end: today - ChronoDuration::days(1),
        }
    }

    /// Datas da projeção de vendas: (início, fim, dia de ontem).
    pub fn projection_dates(&self) -> (String, String, u32) {
        let range = self.dynamic_dates();
        let yesterday = (self.today() - ChronoDuration::days(1)).day();

        log_operation(
            "projection_dates",
            "SUCCESS",
            &crate::details!(
                "dia_inicio" => range.start_br(),
                "dia_fim" => range.end_br(),
                "ontem" => yesterday,
                "current_day" => self.today().day()
            ),
        );

        (range.start_br(), range.end_br(), yesterday)
    }

    /// Copia o `.env` para `env_backup_YYYYMMDD_HHMMSS.env`.
    pub fn backup_env_file(&self) -> Result<PathBuf> {
        if !self.env_path.is_file() {
            return Err(DeskError::file(
                ".env file not found",
                &self.env_path,
                "backup_env",
            ));
        }

        std::fs::create_dir_all(&self.backup_dir)
            .map_err(|e| ErrorHandler::file_error(e, &self.backup_dir, "backup_env"))?;
        let backup_path = self
            .backup_dir
            .join(format!("env_backup_{}.env", self.now.format("%Y%m%d_%H%M%S")));
        std::fs::copy(&self.env_path, &backup_path)
            .map_err(|e| ErrorHandler::file_error(e, &self.env_path, "backup_env"))?;

        log_operation(
            "env_backup",
            "SUCCESS",
            &crate::details!("backup_path" => backup_path.display().to_string()),
        );
        Ok(backup_path)
    }

    /// Reescreve os caminhos mensais. Fora do dia 2 só atua com `force`.
    pub fn update_monthly_paths(&self, force: bool) -> Result<BTreeMap<String, PathChange>> {
        if !force && !self.should_update_paths() {
            return Ok(BTreeMap::new());
        }

        let started = Instant::now();
        let result = self.rewrite_monthly_paths();
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if let Some(metrics) = &self.metrics {
            let name = if result.is_ok() {
                "update_monthly_paths"
            } else {
                "update_monthly_paths_error"
            };
            metrics.record_operation(name, elapsed_ms, crate::details!("forced" => force));
        }
        result
    }

    fn rewrite_monthly_paths(&self) -> Result<BTreeMap<String, PathChange>> {
        let mut env = EnvFile::load(&self.env_path)?;
        let info = self.current_month_info();

        let mut changes = BTreeMap::new();
        for var in MONTHLY_PATHS {
            if let Some(old) = env.get(var) {
                let new = rewrite_path_for_month(old, &info);
                if new != old {
                    changes.insert(
                        var.to_string(),
                        PathChange {
                            old: old.to_string(),
                            new,
                        },
                    );
                }
            }
        }

        if changes.is_empty() {
            log_operation(
                "monthly_paths_update",
                "NO_CHANGES",
                &crate::details!("month" => info.name_cap.clone()),
            );
            return Ok(changes);
        }

        let backup_path = self.backup_env_file()?;
        for (var, change) in &changes {
            env.set(var, &change.new);
        }
        env.save()?;

        log_operation(
            "monthly_paths_update",
            "SUCCESS",
            &crate::details!(
                "backup_path" => backup_path.display().to_string(),
                "paths_updated" => changes.len(),
                "month" => info.name_cap.clone()
            ),
        );
        Ok(changes)
    }

    /// Executa as atualizações do dia; erros vão para o relatório.
    pub fn auto_update_if_needed(&self) -> UpdateReport {
        let mut report = UpdateReport {
            current_day: self.today().day(),
            ..UpdateReport::default()
        };

        if !self.auto_updates_enabled() {
            tracing::info!("⏸️ Automatic configuration updates are disabled");
            return report;
        }

        if self.should_update_dates() {
            let range = self.previous_month_dates();
            log_operation(
                "auto_update_dates",
                "SUCCESS",
                &crate::details!(
                    "dia_inicio" => range.start_br(),
                    "dia_fim" => range.end_br(),
                    "trigger" => "day_1_of_month"
                ),
            );
            report.dates_updated = true;
            report.date_range = Some(range);
            report.updates_performed.push("dates".to_string());
        }

        if self.should_update_paths() {
            match self.update_monthly_paths(false) {
                Ok(changes) => {
                    report.paths_updated = !changes.is_empty();
                    if report.paths_updated {
                        report.updates_performed.push("paths".to_string());
                        report.month_info = Some(self.current_month_info());
                    }
                    report.updated_paths = changes;
                }
                Err(e) => {
                    tracing::error!("❌ auto_update_check failed: {}", e);
                    report.error = Some(e.to_string());
                }
            }
        }

        report
    }

    /// Verifica se cada caminho mensal existe (`.env` primeiro, depois o ambiente).
    pub fn validate_monthly_paths(&self) -> BTreeMap<String, bool> {
        let env = EnvFile::load(&self.env_path).ok();

        MONTHLY_PATHS
            .iter()
            .map(|var| {
                let value = env
                    .as_ref()
                    .and_then(|e| e.get(var).map(str::to_string))
                    .or_else(|| std::env::var(var).ok())
                    .filter(|v| !v.is_empty());

                let valid = match value {
                    Some(path) => {
                        let exists = Path::new(&path).exists();
                        if !exists {
                            log_operation(
                                "path_validation",
                                "FILE_NOT_FOUND",
                                &crate::details!("variable" => *var, "path" => path),
                            );
                        }
                        exists
                    }
                    None => {
                        log_operation(
                            "path_validation",
                            "VARIABLE_NOT_DEFINED",
                            &crate::details!("variable" => *var),
                        );
                        false
                    }
                };
                (var.to_string(), valid)
            })
            .collect()
    }

    pub fn status(&self) -> ConfigStatus {
        let today = self.today();
        let day = today.day();

        let next_actions = match day {
            1 => vec!["Using the whole previous month for reports".to_string()],
            2 => vec!["Checking whether monthly paths need updating".to_string()],
            _ => {
                let days_left = days_in_month(today) - day + 1;
                vec![format!("Next update in {} days (day 1)", days_left)]
            }
        };

        ConfigStatus {
            current_day: day,
            current_month: self.current_month_info(),
            auto_updates_enabled: self.auto_updates_enabled(),
            date_range: self.dynamic_dates(),
            date_logic: if day == 1 {
                "previous_month"
            } else {
                "current_month_to_yesterday"
            },
            next_actions,
            paths_validation: self.validate_monthly_paths(),
            backup_available: self.backup_dir.is_dir(),
        }
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|next| (next - ChronoDuration::days(1)).day())
        .unwrap_or(30)
}
