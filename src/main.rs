use clap::Parser;
use oceanicdesk::app::{default_steps, select_steps};
use oceanicdesk::config::cli::{CacheCommand, Command, ConfigCommand, MetricsCommand};
use oceanicdesk::core::alerts::{dashboard, PerformanceAlerts};
use oceanicdesk::core::metrics::ReportFormat;
use oceanicdesk::domain::model::{FailurePolicy, StepStatus};
use oceanicdesk::utils::error::ErrorSeverity;
use oceanicdesk::utils::expression::calculate_expression;
use oceanicdesk::utils::files::create_spreadsheet_backup;
use oceanicdesk::utils::{logger, validation::Validate};
use oceanicdesk::{
    AppConfig, Cli, DynamicConfigManager, EnvFile, FileCache, PerformanceMetrics, ProcessRunner, Result,
    StepContext, StepPipeline, XlsxReader,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // O .env entra no ambiente antes do TOML, para resolver ${CAMINHO_PLANILHA} etc.
    let env_file = cli
        .env_file
        .clone()
        .unwrap_or_else(|| AppConfig::default().paths.env_file.into());
    let env_loaded = dotenv::from_path(&env_file).is_ok();

    let config = match AppConfig::load(&cli.config) {
        Ok(mut config) => {
            if let Some(path) = &cli.env_file {
                config.paths.env_file = path.display().to_string();
            }
            config
        }
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    };

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose, config.log_dir().as_deref());
    }
    tracing::info!("Starting {} CLI", config.app.name);
    if env_loaded {
        tracing::debug!("Loaded environment from {}", env_file.display());
    } else {
        tracing::warn!("⚠️ {} not found, using process environment only", env_file.display());
    }
    if cli.verbose {
        tracing::debug!("CLI: {:?}", cli);
    }

    if let Err(e) = cli.validate().and_then(|_| config.validate()) {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = execute(cli, config).await {
        tracing::error!(
            "❌ {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Sugestão: {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Recarrega o `.env` reescrito no ambiente do processo.
fn refresh_environment(env_path: &Path) -> Result<()> {
    for (key, value) in EnvFile::load(env_path)?.entries() {
        std::env::set_var(key, value);
    }
    Ok(())
}

async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
    let metrics = Arc::new(PerformanceMetrics::from_config(&config.metrics));
    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
        metrics.start_collection();
    }

    let result = match cli.command {
        Command::Run {
            steps,
            continue_on_error,
        } => {
            let options = RunOptions {
                config_path: &cli.config,
                requested: &steps,
                continue_on_error,
                monitor: cli.monitor,
            };
            run_pipeline(config, Arc::clone(&metrics), options).await
        }
        Command::Backup { path } => create_spreadsheet_backup(&path)
            .map(|outcome| println!("✅ Backup: {}", outcome.path().display())),
        Command::Calc { expression } => {
            println!("{:.2}", calculate_expression(&expression));
            Ok(())
        }
        Command::Config(command) => config_command(&config, Arc::clone(&metrics), command),
        Command::Cache(command) => cache_command(&config, command),
        Command::Metrics(command) => metrics_command(&config, &metrics, command),
    };

    metrics.stop_collection();
    result
}

struct RunOptions<'a> {
    config_path: &'a Path,
    requested: &'a [u8],
    continue_on_error: bool,
    monitor: bool,
}

async fn run_pipeline(mut config: AppConfig, metrics: Arc<PerformanceMetrics>, options: RunOptions<'_>) -> Result<()> {
    if config.pipeline.auto_update_config {
        let manager = DynamicConfigManager::from_config(&config).with_metrics(Arc::clone(&metrics));
        let report = manager.auto_update_if_needed();
        if let Some(error) = &report.error {
            tracing::warn!("⚠️ Configuration update failed: {}", error);
        }
        if report.paths_updated {
            tracing::info!("📅 Monthly paths updated, reloading configuration");
            refresh_environment(manager.env_path())?;
            let env_file = config.paths.env_file.clone();
            config = AppConfig::load(options.config_path)?;
            config.paths.env_file = env_file;
        }
    }

    let cache = Arc::new(FileCache::from_config(&config.cache)?.with_metrics(Arc::clone(&metrics)));
    let policy = if options.continue_on_error {
        FailurePolicy::Continue
    } else {
        config.pipeline.on_failure
    };

    let runner = Arc::new(ProcessRunner::new().with_timeout(config.pipeline.command_timeout()));
    let reader = Arc::new(XlsxReader::cached(Arc::clone(&cache)));
    let mut pipeline = StepPipeline::new(policy).with_monitoring(options.monitor);
    for step in default_steps(runner, reader) {
        pipeline.add_step(step);
    }
    pipeline.retain(&select_steps(options.requested)?);

    let alerts = PerformanceAlerts::new(config.metrics.alerts.clone());
    let mut context = StepContext::new(Arc::new(config), cache, Arc::clone(&metrics));
    let outcome = pipeline.execute(&mut context).await;

    let summary = StepPipeline::execution_summary(&context.results);
    tracing::info!("📋 Execution summary: {}", serde_json::Value::Object(summary.clone()));
    for result in &context.results {
        let icon = match result.status {
            StepStatus::Success => "✅",
            StepStatus::Skipped => "⏭️",
            StepStatus::Failed => "❌",
        };
        println!(
            "{} {} ({} ms){}",
            icon,
            result.step,
            result.duration.as_millis(),
            result.message.as_deref().map(|m| format!(" - {}", m)).unwrap_or_default()
        );
        if let Some(value) = result.outputs.get("value").and_then(|v| v.as_f64()) {
            println!("   🔢 {:.2}", value);
        }
    }
    if let Some(staged) = context.get_shared_data("etapa1.aba_preparada").and_then(|v| v.as_str()) {
        println!("💲 Staged sheet: {}", staged);
    }

    match context.write_report(Path::new(&context.config.paths.reports_dir)) {
        Ok(path) => println!("📁 Run report: {}", path.display()),
        Err(e) => tracing::warn!("⚠️ Could not save run report: {}", e),
    }

    alerts.check(&metrics);
    if metrics.is_enabled() {
        match metrics.export_report(ReportFormat::Json, None) {
            Ok(path) => tracing::info!("📁 Performance report saved to: {}", path.display()),
            Err(e) => tracing::warn!("⚠️ Could not save performance report: {}", e),
        }
    }

    outcome.map(|_| ())
}

fn config_command(config: &AppConfig, metrics: Arc<PerformanceMetrics>, command: ConfigCommand) -> Result<()> {
    let manager = DynamicConfigManager::from_config(config).with_metrics(metrics);
    match command {
        ConfigCommand::Status => print_json(&manager.status()),
        ConfigCommand::Update { force_paths } => {
            if force_paths {
                let changes = manager.update_monthly_paths(true)?;
                if changes.is_empty() {
                    println!("ℹ️ No monthly path needed changes");
                }
                print_json(&changes)
            } else {
                print_json(&manager.auto_update_if_needed())
            }
        }
        ConfigCommand::Backup => {
            let backup = manager.backup_env_file()?;
            println!("✅ Backup: {}", backup.display());
            Ok(())
        }
        ConfigCommand::ValidatePaths => {
            for (var, ok) in manager.validate_monthly_paths() {
                println!("{} {}", if ok { "✅" } else { "❌" }, var);
            }
            Ok(())
        }
    }
}

fn cache_command(config: &AppConfig, command: CacheCommand) -> Result<()> {
    let cache = FileCache::from_config(&config.cache)?;
    match command {
        CacheCommand::Stats => print_json(&cache.stats()),
        CacheCommand::Clear { older_than_hours } => {
            let removed = cache.clear(older_than_hours.map(|h| Duration::from_secs(h * 3600)));
            println!("🗑️ Removed {} cache file(s)", removed);
            Ok(())
        }
        CacheCommand::Invalidate { path } => {
            let removed = cache.invalidate_file(&path);
            println!("🗑️ Removed {} cache entr(ies) for {}", removed, path.display());
            Ok(())
        }
    }
}

/// As métricas vivem na memória do processo: estes relatórios cobrem a amostra atual
/// do sistema; `run` grava o relatório completo ao terminar.
fn metrics_command(config: &AppConfig, metrics: &PerformanceMetrics, command: MetricsCommand) -> Result<()> {
    metrics.sample_now();
    match command {
        MetricsCommand::Report { format, output } => {
            let path = metrics.export_report(format, output.as_deref())?;
            println!("📁 Report saved to: {}", path.display());
            Ok(())
        }
        MetricsCommand::Dashboard => {
            let alerts = PerformanceAlerts::new(config.metrics.alerts.clone());
            print_json(&dashboard(metrics, &alerts))
        }
    }
}
