pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::Cli;

pub use adapters::{ProcessRunner, XlsxReader};
pub use config::{AppConfig, DynamicConfigManager, EnvFile};
pub use crate::core::{
    alerts::PerformanceAlerts, cache::FileCache, metrics::PerformanceMetrics, workbook::Workbook, Step,
    StepContext, StepPipeline,
};
pub use utils::error::{DeskError, Result};
