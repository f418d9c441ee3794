use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Workbook error: {0}")]
    WorkbookError(#[from] calamine::XlsxError),

    #[error("File operation '{operation}' failed on {path:?}: {message}")]
    FileOperationError {
        message: String,
        path: PathBuf,
        operation: String,
    },

    #[error("System '{system}' error: {message}")]
    SystemConnectionError { message: String, system: String },

    #[error("Validation error on '{field}' (value: {value}): {message}")]
    DataValidationError {
        field: String,
        value: String,
        message: String,
    },

    #[error("Automation error in '{step}': {message}")]
    AutomationError { step: String, message: String },

    #[error("Configuration error on '{key}': {message}")]
    ConfigurationError { key: String, message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for '{field}': {value} ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Step {number} ({name}) failed: {message}")]
    StepFailed {
        number: u8,
        name: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, DeskError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    File,
    Validation,
    System,
    Automation,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DeskError {
    pub fn file(message: impl Into<String>, path: impl AsRef<Path>, operation: &str) -> Self {
        DeskError::FileOperationError {
            message: message.into(),
            path: path.as_ref().to_path_buf(),
            operation: operation.to_string(),
        }
    }

    pub fn validation(field: &str, value: impl ToString, message: impl Into<String>) -> Self {
        DeskError::DataValidationError {
            field: field.to_string(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    pub fn config(key: &str, message: impl Into<String>) -> Self {
        DeskError::ConfigurationError {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn automation(step: &str, message: impl Into<String>) -> Self {
        DeskError::AutomationError {
            step: step.to_string(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DeskError::IoError(_)
            | DeskError::WorkbookError(_)
            | DeskError::CsvError(_)
            | DeskError::FileOperationError { .. } => ErrorCategory::File,
            DeskError::DataValidationError { .. } => ErrorCategory::Validation,
            DeskError::SystemConnectionError { .. } => ErrorCategory::System,
            DeskError::AutomationError { .. } | DeskError::StepFailed { .. } => {
                ErrorCategory::Automation
            }
            DeskError::TomlError(_)
            | DeskError::ConfigurationError { .. }
            | DeskError::MissingConfigError { .. }
            | DeskError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            DeskError::SerializationError(_) | DeskError::RegexError(_) => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Validation => ErrorSeverity::Low,
            ErrorCategory::System | ErrorCategory::Automation => ErrorSeverity::Medium,
            ErrorCategory::File | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Internal => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            DeskError::IoError(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                "Check that the file is not open in another program"
            }
            DeskError::FileOperationError { .. } | DeskError::IoError(_) => {
                "Check that the file exists and the path in .env is up to date"
            }
            DeskError::WorkbookError(_) => "Open the workbook in Excel, save it again and retry",
            DeskError::DataValidationError { .. } => "Review the value typed for this field",
            DeskError::SystemConnectionError { .. } => {
                "Check that the external application is running and logged in"
            }
            DeskError::AutomationError { .. } | DeskError::StepFailed { .. } => {
                "Run the failed step again on its own with `oceanicdesk run --step N`"
            }
            DeskError::TomlError(_)
            | DeskError::ConfigurationError { .. }
            | DeskError::MissingConfigError { .. }
            | DeskError::InvalidConfigValueError { .. } => {
                "Review oceanicdesk.toml and the .env file"
            }
            DeskError::CsvError(_) | DeskError::SerializationError(_) | DeskError::RegexError(_) => {
                "Re-run with --verbose and report the log file"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            DeskError::FileOperationError { path, .. } => {
                format!("Problem with file {}: {}", path.display(), self)
            }
            DeskError::MissingConfigError { field } => {
                format!("Setting '{}' is not defined", field)
            }
            DeskError::StepFailed { number, name, .. } => {
                format!("Etapa {} ({}) did not finish: {}", number, name, self)
            }
            _ => self.to_string(),
        }
    }

    /// Contexto estruturado para o log.
    pub fn details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("category".into(), json!(format!("{:?}", self.category())));
        details.insert("severity".into(), json!(format!("{:?}", self.severity())));
        details.insert("message".into(), json!(self.to_string()));
        details.insert(
            "timestamp".into(),
            json!(chrono::Local::now().to_rfc3339()),
        );

        match self {
            DeskError::FileOperationError {
                path, operation, ..
            } => {
                details.insert("file_path".into(), json!(path.display().to_string()));
                details.insert("file_exists".into(), json!(path.exists()));
                details.insert("operation".into(), json!(operation));
            }
            DeskError::SystemConnectionError { system, .. } => {
                details.insert("system_name".into(), json!(system));
            }
            DeskError::DataValidationError { field, value, .. } => {
                details.insert("field_name".into(), json!(field));
                details.insert("invalid_value".into(), json!(value));
            }
            DeskError::AutomationError { step, .. } => {
                details.insert("automation_step".into(), json!(step));
            }
            DeskError::ConfigurationError { key, .. } => {
                details.insert("config_key".into(), json!(key));
            }
            DeskError::StepFailed { number, .. } => {
                details.insert("step".into(), json!(number));
            }
            _ => {}
        }

        details
    }
}

/// Converte erros genéricos nos tipos do domínio, acrescentando contexto.
pub struct ErrorHandler;

impl ErrorHandler {
    pub fn file_error(error: std::io::Error, path: impl AsRef<Path>, operation: &str) -> DeskError {
        let path = path.as_ref();
        let message = match error.kind() {
            std::io::ErrorKind::NotFound => format!("file not found: {}", path.display()),
            std::io::ErrorKind::PermissionDenied => format!(
                "permission denied for {} (is it open in another program?)",
                path.display()
            ),
            _ => format!("error processing {}: {}", path.display(), error),
        };
        DeskError::file(message, path, operation)
    }

    pub fn validation_error(error: impl std::fmt::Display, field: &str, value: impl ToString) -> DeskError {
        DeskError::validation(field, value, format!("invalid value: {}", error))
    }

    pub fn system_error(error: impl std::fmt::Display, system: &str) -> DeskError {
        DeskError::SystemConnectionError {
            message: error.to_string(),
            system: system.to_string(),
        }
    }
}

/// Executa `f`; em caso de erro registra no log e devolve `default`.
pub fn safe_execute<T, F>(operation: &str, default: T, f: F) -> T
where
    F: FnOnce() -> Result<T>,
{
    match f() {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(
                operation,
                details = %serde_json::Value::Object(e.details()),
                "❌ {} failed: {}",
                operation,
                e
            );
            default
        }
    }
}
