use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("oceanicdesk=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oceanicdesk=info"))
    }
}

/// Arquivo de log do dia: `log_YYYY-MM-DD.log`.
pub fn daily_log_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "log_{}.log",
        chrono::Local::now().date_naive().format("%Y-%m-%d")
    ))
}

/// Inicializa o log do console e, se `log_dir` for informado, o arquivo diário.
pub fn init_cli_logger(verbose: bool, log_dir: Option<&Path>) {
    let file_layer = log_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(daily_log_path(dir))
            .ok()?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        )
    });

    tracing_subscriber::registry()
        .with(default_filter(verbose))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .with(file_layer)
        .init();
}

pub fn init_json_logger() {
    tracing_subscriber::registry()
        .with(default_filter(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json(),
        )
        .init();
}

/// Evento estruturado de operação (`status` ex.: SUCCESS, CACHE_HIT, ERROR).
pub fn log_operation(operation: &str, status: &str, details: &Map<String, Value>) {
    tracing::info!(
        operation,
        status,
        details = %serde_json::Value::Object(details.clone()),
        "{} [{}]",
        operation,
        status
    );
}

pub fn log_performance(operation: &str, duration_ms: f64, details: &Map<String, Value>) {
    tracing::debug!(
        operation,
        duration_ms,
        details = %serde_json::Value::Object(details.clone()),
        "⏱️ {} took {:.1}ms",
        operation,
        duration_ms
    );
}

/// Monta um mapa de detalhes a partir de pares chave/valor.
#[macro_export]
macro_rules! details {
    () => { ::serde_json::Map::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = ::serde_json::Map::new();
        $( map.insert(($key).to_string(), ::serde_json::json!($value)); )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_log_path_uses_date() {
        let path = daily_log_path(Path::new("logs"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("log_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "log_2025-01-01.log".len());
    }

    #[test]
    fn test_details_macro_builds_map() {
        let details = crate::details!("file" => "a.xlsx", "size" => 10);
        assert_eq!(details.get("file").unwrap(), "a.xlsx");
        assert_eq!(details.get("size").unwrap(), 10);
    }

    #[test]
    fn test_structured_events_carry_details() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let details = crate::details!("file" => "a.xlsx");
            log_operation("excel_load", "SUCCESS", &details);
            log_performance("excel_load", 12.5, &details);
            let value = crate::utils::error::safe_execute("parse", 1, || {
                Err(crate::utils::error::DeskError::config("x", "broken"))
            });
            assert_eq!(value, 1);
        });
    }
}
