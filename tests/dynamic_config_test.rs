use anyhow::Result;
use chrono::NaiveDate;
use oceanicdesk::config::dynamic_config::DynamicConfigManager;
use oceanicdesk::{EnvFile, PerformanceMetrics};
use std::sync::Arc;
use tempfile::TempDir;

const ENV_JUNE: &str = "\
# caminhos do mês
USUARIO=operador
CAMINHO_PLANILHA=C:/Financeiro/2025/06 - JUNHO/06-VENDA CHACALTAYA LOJA JUNHO 2025.xlsx

CAMINHO_PLANILHA_VENDAS=C:\\Vendas\\06 - JUNHO\\Vendas Junho.xlsx
CAMINHO_MEU_CONTROLE=C:/Controle/Meu Controle Junho - 2025.xlsx
CAMINHO_COPIA_MES=C:/Copias/Cópia de Junho - 2025.xlsx
";

fn manager(dir: &TempDir, day: u32) -> DynamicConfigManager {
    let now = NaiveDate::from_ymd_opt(2025, 7, day)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();
    DynamicConfigManager::new(dir.path().join(".env"), dir.path().join("backups")).with_now(now)
}

#[test]
fn test_day_two_rewrites_paths_with_backup() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(temp_dir.path().join(".env"), ENV_JUNE)?;
    let metrics = Arc::new(PerformanceMetrics::new(temp_dir.path().join("metrics")));

    let report = manager(&temp_dir, 2)
        .with_metrics(Arc::clone(&metrics))
        .auto_update_if_needed();
    assert!(report.paths_updated);
    assert!(!report.dates_updated);
    assert_eq!(report.updated_paths.len(), 4);
    assert_eq!(report.month_info.as_ref().map(|m| m.name.as_str()), Some("JULHO"));

    let env = EnvFile::load(temp_dir.path().join(".env"))?;
    assert_eq!(
        env.get("CAMINHO_PLANILHA"),
        Some("C:/Financeiro/2025/07 - JULHO/07-VENDA CHACALTAYA LOJA JULHO 2025.xlsx")
    );
    assert_eq!(
        env.get("CAMINHO_PLANILHA_VENDAS"),
        Some("C:\\Vendas\\07 - JULHO\\Vendas Julho.xlsx")
    );
    assert_eq!(env.get("CAMINHO_MEU_CONTROLE"), Some("C:/Controle/Meu Controle Julho - 2025.xlsx"));
    assert_eq!(env.get("USUARIO"), Some("operador"));

    let rendered = std::fs::read_to_string(temp_dir.path().join(".env"))?;
    assert!(rendered.starts_with("# caminhos do mês\n"));
    assert!(rendered.contains("\n\nCAMINHO_PLANILHA_VENDAS="));

    let backup = temp_dir.path().join("backups").join("env_backup_20250702_083000.env");
    assert_eq!(std::fs::read_to_string(backup)?, ENV_JUNE);
    assert!(metrics.operation_stats("update_monthly_paths").is_some());
    Ok(())
}

#[test]
fn test_other_days_leave_env_untouched() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(temp_dir.path().join(".env"), ENV_JUNE)?;

    let report = manager(&temp_dir, 15).auto_update_if_needed();
    assert!(!report.paths_updated);
    assert!(report.updates_performed.is_empty());
    assert_eq!(std::fs::read_to_string(temp_dir.path().join(".env"))?, ENV_JUNE);
    assert!(!temp_dir.path().join("backups").exists());

    // --force-paths ignora o dia.
    let changes = manager(&temp_dir, 15).update_monthly_paths(true)?;
    assert_eq!(changes.len(), 4);
    Ok(())
}

#[test]
fn test_report_dates_follow_the_day() {
    let temp_dir = TempDir::new().unwrap();

    let first = manager(&temp_dir, 1);
    let range = first.dynamic_dates();
    assert_eq!((range.start_br(), range.end_br()), ("01/06/2025".to_string(), "30/06/2025".to_string()));
    let report = first.auto_update_if_needed();
    assert!(report.dates_updated);

    let (start, end, yesterday) = manager(&temp_dir, 16).projection_dates();
    assert_eq!(start, "01/07/2025");
    assert_eq!(end, "15/07/2025");
    assert_eq!(yesterday, 15);
}

#[test]
fn test_disabled_auto_updates() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(".env"), ENV_JUNE).unwrap();

    let manager = manager(&temp_dir, 2);
    manager.set_auto_updates(false);
    let report = manager.auto_update_if_needed();
    assert!(!report.paths_updated);
    assert_eq!(std::fs::read_to_string(temp_dir.path().join(".env")).unwrap(), ENV_JUNE);
}

#[test]
fn test_missing_env_is_reported_not_raised() {
    let temp_dir = TempDir::new().unwrap();
    let report = manager(&temp_dir, 2).auto_update_if_needed();
    assert!(!report.paths_updated);
    assert!(report.error.is_none());
    assert!(report.updated_paths.is_empty());
}

#[test]
fn test_quoted_paths_are_validated_without_quotes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let planilha = temp_dir.path().join("07 - JULHO").join("Planilha.xlsx");
    std::fs::create_dir_all(planilha.parent().unwrap())?;
    std::fs::write(&planilha, b"xlsx")?;
    std::fs::write(
        temp_dir.path().join(".env"),
        format!("CAMINHO_PLANILHA=\"{}\"\n", planilha.display()),
    )?;

    let validation = manager(&temp_dir, 15).validate_monthly_paths();
    assert_eq!(validation.get("CAMINHO_PLANILHA"), Some(&true));
    Ok(())
}
