use crate::core::metrics::ReportFormat;
use crate::utils::error::{DeskError, Result};
use crate::utils::validation::{validate_positive_number, Validate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "oceanicdesk")]
#[command(about = "Daily closing automation for the fuel station back office")]
pub struct Cli {
    /// Arquivo de configuração TOML.
    #[arg(long, global = true, default_value = crate::config::toml_config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// `.env` carregado antes da configuração (sobrepõe `paths.env_file`).
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    #[arg(long, short, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Sample CPU and memory in the background")]
    pub monitor: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Roda o fechamento completo ou só as etapas indicadas.
    Run {
        #[arg(long = "step", value_name = "N")]
        steps: Vec<u8>,
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Cria o backup de uma planilha.
    Backup { path: PathBuf },
    /// Avalia uma expressão como "345,23 + 234,21".
    Calc { expression: String },
    #[command(subcommand)]
    Config(ConfigCommand),
    #[command(subcommand)]
    Cache(CacheCommand),
    #[command(subcommand)]
    Metrics(MetricsCommand),
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigCommand {
    Status,
    Update {
        /// Reescreve os caminhos mensais mesmo fora do dia 2.
        #[arg(long)]
        force_paths: bool,
    },
    Backup,
    ValidatePaths,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CacheCommand {
    Stats,
    Clear {
        #[arg(long, value_name = "H")]
        older_than_hours: Option<u64>,
    },
    Invalidate { path: PathBuf },
}

#[derive(Debug, Clone, Subcommand)]
pub enum MetricsCommand {
    Report {
        #[arg(long, default_value = "json")]
        format: ReportFormat,
        #[arg(long)]
        output: Option<String>,
    },
    Dashboard,
}

impl Validate for Cli {
    fn validate(&self) -> Result<()> {
        match &self.command {
            Command::Run { steps, .. } => {
                for step in steps {
                    if !(1..=8).contains(step) {
                        return Err(DeskError::validation("step", step, "step must be between 1 and 8"));
                    }
                }
            }
            Command::Calc { expression } if expression.trim().is_empty() => {
                return Err(DeskError::validation("expression", expression, "expression cannot be empty"));
            }
            Command::Cache(CacheCommand::Clear {
                older_than_hours: Some(hours),
            }) => {
                validate_positive_number("older_than_hours", *hours as usize, 1)?;
            }
            _ => {}
        }
        Ok(())
    }
}
