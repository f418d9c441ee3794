//! As oito etapas do fechamento diário.
//!
//! A automação de interface (AutoSystem, EMSys, webmail) fica fora do crate:
//! cada etapa chama o comando externo configurado em `[[steps]]` e, quando
//! pedido, consome o `tmp*.xlsx` que ele deixa na área de trabalho.

use crate::config::dynamic_config::DynamicConfigManager;
use crate::config::toml_config::StepConfig;
use crate::core::pipeline::{Step, StepContext};
use crate::core::workbook::{column_index, daily_sheet_name, CellRange, CellValue, CopyReport, Workbook, RED};
use crate::domain::model::{CommandOutput, ExternalCommand, StepId, StepOutcome};
use crate::domain::ports::{CommandRunner, WorkbookReader};
use crate::utils::error::{DeskError, ErrorHandler, Result};
use crate::utils::files::{create_spreadsheet_backup, remove_tmp_export, wait_for_tmp_export, BackupOutcome};
use crate::utils::validation::FilePathValidator;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Intervalo de preços copiado do dia anterior.
pub const PRICE_RANGE: &str = "K5:R14";
/// Coluna destacada em vermelho depois da cópia (O).
pub const HIGHLIGHT_COLUMN: u32 = 15;
pub const DEFAULT_VALUE_COLUMN: &str = "R";

async fn run_command(
    runner: &dyn CommandRunner,
    step: StepId,
    command: &ExternalCommand,
    extra_env: BTreeMap<String, String>,
) -> Result<CommandOutput> {
    let mut command = command.clone();
    command.env.extend(extra_env);

    let output = runner.run(&command).await?;
    if !output.success() {
        let stderr = output.stderr.trim();
        return Err(DeskError::automation(
            step.name(),
            format!(
                "{} exited with {:?}{}",
                command.program,
                output.status_code,
                if stderr.is_empty() { String::new() } else { format!(": {}", stderr) }
            ),
        ));
    }
    Ok(output)
}

fn step_config(context: &StepContext, id: StepId) -> StepConfig {
    context
        .config
        .step(id)
        .cloned()
        .unwrap_or_else(|| StepConfig::new(id.number()))
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceTransfer {
    pub source_sheet: String,
    pub target_sheet: String,
    pub copy: CopyReport,
    pub highlighted: usize,
}

/// Copia os preços da aba de anteontem para a de ontem e destaca a coluna O.
pub fn stage_daily_prices(workbook: &mut Workbook, today: NaiveDate) -> Result<PriceTransfer> {
    let source_sheet = daily_sheet_name(today - ChronoDuration::days(2));
    let target_sheet = daily_sheet_name(today - ChronoDuration::days(1));
    let range = CellRange::parse(PRICE_RANGE)?;

    let copy = workbook.copy_range(&source_sheet, &target_sheet, range)?;
    let highlighted = workbook
        .sheet_mut(&target_sheet)
        .map(|sheet| sheet.highlight_non_empty(HIGHLIGHT_COLUMN, range.start.row..=range.end.row, RED))
        .unwrap_or(0);

    Ok(PriceTransfer {
        source_sheet,
        target_sheet,
        copy,
        highlighted,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedCell {
    pub address: String,
    pub value: CellValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,
}

/// Aba de destino depois da cópia e do destaque, no formato que o comando
/// externo da etapa 1 aplica na planilha.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedSheet {
    pub spreadsheet: String,
    pub source_sheet: String,
    pub target_sheet: String,
    pub range: String,
    pub cells: Vec<StagedCell>,
}

impl StagedSheet {
    pub fn from_transfer(workbook: &Workbook, spreadsheet: &Path, transfer: &PriceTransfer) -> Result<Self> {
        let sheet = workbook.require_sheet(&transfer.target_sheet)?;
        let cells = CellRange::parse(PRICE_RANGE)?
            .cells()
            .filter_map(|at| {
                let cell = sheet.cell(at.row, at.col);
                (!cell.value.is_empty() || cell.font_color.is_some()).then(|| StagedCell {
                    address: at.to_string(),
                    value: cell.value.clone(),
                    font_color: cell.font_color.clone(),
                })
            })
            .collect();

        Ok(Self {
            spreadsheet: spreadsheet.display().to_string(),
            source_sheet: transfer.source_sheet.clone(),
            target_sheet: transfer.target_sheet.clone(),
            range: PRICE_RANGE.to_string(),
            cells,
        })
    }

    /// Grava `{execution_id}_etapa1.json` em `dir`.
    pub fn write(&self, dir: &Path, execution_id: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| ErrorHandler::file_error(e, dir, "create_reports_dir"))?;
        let path = dir.join(format!("{}_etapa1.json", execution_id));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .map_err(|e| ErrorHandler::file_error(e, &path, "write_staged_sheet"))?;
        tracing::info!("💾 Staged sheet '{}' saved to {}", self.target_sheet, path.display());
        Ok(path)
    }
}

/// Etapa 1: backup da planilha e preparação dos preços do dia.
pub struct BackupStep {
    runner: Arc<dyn CommandRunner>,
    reader: Arc<dyn WorkbookReader>,
}

impl BackupStep {
    pub fn new(runner: Arc<dyn CommandRunner>, reader: Arc<dyn WorkbookReader>) -> Self {
        Self { runner, reader }
    }
}

#[async_trait::async_trait]
impl Step for BackupStep {
    fn id(&self) -> StepId {
        StepId::BackupPrices
    }

    async fn run(&self, context: &mut StepContext) -> Result<StepOutcome> {
        let path = context
            .config
            .spreadsheet_path()
            .ok_or_else(|| DeskError::MissingConfigError {
                field: "CAMINHO_PLANILHA".to_string(),
            })?;
        let path = FilePathValidator::new("CAMINHO_PLANILHA")
            .with_extensions(&[".xlsx"])
            .validate(&path)?;

        let backup = create_spreadsheet_backup(&path)?;
        let backup_created = matches!(backup, BackupOutcome::Created(_));

        let mut workbook = self.reader.read(&path)?;
        let transfer = stage_daily_prices(&mut workbook, context.today)?;
        tracing::info!(
            "💲 Prices staged: '{}' -> '{}' ({} copied, {} merged skipped, {} highlighted)",
            transfer.source_sheet,
            transfer.target_sheet,
            transfer.copy.copied,
            transfer.copy.skipped_merged,
            transfer.highlighted
        );

        let staged = StagedSheet::from_transfer(&workbook, &path, &transfer)?;
        let staged_path = staged.write(Path::new(&context.config.paths.reports_dir), &context.execution_id)?;
        context.add_shared_data("etapa1.aba_preparada", staged_path.display().to_string());
        context.add_shared_data("etapa1.planilha", path.display().to_string());

        let config = step_config(context, self.id());
        if let Some(command) = &config.command {
            let env = BTreeMap::from([
                ("PLANILHA".to_string(), path.display().to_string()),
                ("ABA_ORIGEM".to_string(), transfer.source_sheet.clone()),
                ("ABA_DESTINO".to_string(), transfer.target_sheet.clone()),
                ("ABA_PREPARADA".to_string(), staged_path.display().to_string()),
            ]);
            run_command(self.runner.as_ref(), self.id(), command, env).await?;
        }

        Ok(StepOutcome::done(format!("backup at {}", backup.path().display()))
            .with_output("backup_path", backup.path().display().to_string())
            .with_output("backup_created", backup_created)
            .with_output("source_sheet", transfer.source_sheet)
            .with_output("target_sheet", transfer.target_sheet)
            .with_output("cells_copied", transfer.copy.copied)
            .with_output("cells_highlighted", transfer.highlighted)
            .with_output("staged_sheet", staged_path.display().to_string()))
    }
}

/// Etapas 2 a 7: delegam ao comando externo e leem o valor exportado.
pub struct ExternalStep {
    id: StepId,
    runner: Arc<dyn CommandRunner>,
    reader: Arc<dyn WorkbookReader>,
}

impl ExternalStep {
    pub fn new(id: StepId, runner: Arc<dyn CommandRunner>, reader: Arc<dyn WorkbookReader>) -> Self {
        Self { id, runner, reader }
    }

    fn read_labelled_value(&self, workbook: &Workbook, label: &str, column: &str) -> Result<f64> {
        let col = column_index(column)
            .ok_or_else(|| DeskError::config("steps.value_column", format!("invalid column '{}'", column)))?;
        workbook
            .first_sheet()
            .and_then(|sheet| sheet.find_labelled_value(label, col))
            .and_then(|value| value.as_f64())
            .ok_or_else(|| {
                DeskError::validation(
                    "value_label",
                    label,
                    format!("no numeric value next to label in column {}", column),
                )
            })
    }
}

#[async_trait::async_trait]
impl Step for ExternalStep {
    fn id(&self) -> StepId {
        self.id
    }

    async fn run(&self, context: &mut StepContext) -> Result<StepOutcome> {
        let config = step_config(context, self.id);
        let Some(command) = &config.command else {
            return Ok(StepOutcome::skipped("no external command configured"));
        };

        let output = run_command(self.runner.as_ref(), self.id, command, BTreeMap::new()).await?;
        let mut outcome = StepOutcome::done(format!("{} finished", command.program))
            .with_output("exit_code", output.status_code.unwrap_or_default());

        if !config.handoff {
            return Ok(outcome);
        }

        let dir = context
            .config
            .handoff_dir()
            .ok_or_else(|| DeskError::config("paths.handoff_dir", "no hand-off directory available"))?;
        let pipeline = &context.config.pipeline;
        let tmp = wait_for_tmp_export(&dir, pipeline.handoff_timeout(), pipeline.handoff_poll_interval())
            .await?
            .ok_or_else(|| {
                DeskError::automation(
                    self.id.name(),
                    format!(
                        "tmp*.xlsx not found in {} after {}s",
                        dir.display(),
                        pipeline.handoff_timeout_seconds
                    ),
                )
            })?;
        tracing::info!("📥 Hand-off file found: {}", tmp.display());

        let value = match &config.value_label {
            Some(label) => {
                let column = config.value_column.as_deref().unwrap_or(DEFAULT_VALUE_COLUMN);
                let read = self
                    .reader
                    .read(&tmp)
                    .and_then(|workbook| self.read_labelled_value(&workbook, label, column));
                // O export é descartado mesmo quando a leitura falha.
                remove_tmp_export(&tmp)?;
                Some(read?)
            }
            None => {
                remove_tmp_export(&tmp)?;
                None
            }
        };

        outcome = outcome.with_output("handoff_file", tmp.display().to_string());
        if let Some(value) = value {
            tracing::info!("🔢 {} value: {:.2}", self.id, value);
            context.add_shared_data(format!("etapa{}.valor", self.id.number()), value);
            outcome = outcome.with_output("value", value);
        }
        Ok(outcome)
    }
}

/// Etapa 8: calcula o período da projeção e repassa ao comando externo.
pub struct ProjectionStep {
    runner: Arc<dyn CommandRunner>,
}

impl ProjectionStep {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait::async_trait]
impl Step for ProjectionStep {
    fn id(&self) -> StepId {
        StepId::SalesProjection
    }

    async fn run(&self, context: &mut StepContext) -> Result<StepOutcome> {
        let manager = DynamicConfigManager::from_config(&context.config)
            .with_now(context.today.and_time(NaiveTime::MIN));
        let (start, end, yesterday) = manager.projection_dates();

        context.add_shared_data("etapa8.dia_inicio", start.clone());
        context.add_shared_data("etapa8.dia_fim", end.clone());

        let config = step_config(context, self.id());
        let Some(command) = &config.command else {
            return Ok(StepOutcome::skipped("no external command configured")
                .with_output("dia_inicio", start)
                .with_output("dia_fim", end)
                .with_output("ontem", yesterday));
        };

        let env = BTreeMap::from([
            ("DIA_INICIO".to_string(), start.clone()),
            ("DIA_FIM".to_string(), end.clone()),
            ("ONTEM".to_string(), yesterday.to_string()),
        ]);
        run_command(self.runner.as_ref(), self.id(), command, env).await?;

        Ok(StepOutcome::done(format!("projection {} - {}", start, end))
            .with_output("dia_inicio", start)
            .with_output("dia_fim", end)
            .with_output("ontem", yesterday))
    }
}

/// Monta as oito etapas na ordem do fechamento.
pub fn default_steps(runner: Arc<dyn CommandRunner>, reader: Arc<dyn WorkbookReader>) -> Vec<Box<dyn Step>> {
    let mut steps: Vec<Box<dyn Step>> = vec![Box::new(BackupStep::new(Arc::clone(&runner), Arc::clone(&reader)))];
    for id in &StepId::ALL[1..7] {
        steps.push(Box::new(ExternalStep::new(*id, Arc::clone(&runner), Arc::clone(&reader))));
    }
    steps.push(Box::new(ProjectionStep::new(runner)));
    steps
}

/// Etapas a executar: todas, ou só as escolhidas (`--step N`).
pub fn select_steps(requested: &[u8]) -> Result<Vec<StepId>> {
    if requested.is_empty() {
        return Ok(StepId::ALL.to_vec());
    }
    requested
        .iter()
        .map(|n| {
            StepId::from_number(*n)
                .ok_or_else(|| DeskError::validation("step", n, "step must be between 1 and 8"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workbook::{CellValue, Worksheet};

    fn workbook_with_days() -> Workbook {
        let mut source = Worksheet::new("Dia 13");
        for (i, row) in (5..=14).enumerate() {
            source.set_value(row, 11, CellValue::Number(5.0 + i as f64));
            if row % 2 == 0 {
                source.set_value(row, 15, CellValue::Number(6.0));
            }
        }
        let mut target = Worksheet::new("Dia 14");
        target.merge(CellRange::parse("L5:M5").unwrap());

        let mut workbook = Workbook::new();
        workbook.add_sheet(source);
        workbook.add_sheet(target);
        workbook
    }

    #[test]
    fn test_stage_daily_prices() {
        let mut workbook = workbook_with_days();
        let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();

        let transfer = stage_daily_prices(&mut workbook, today).unwrap();
        assert_eq!(transfer.source_sheet, "Dia 13");
        assert_eq!(transfer.target_sheet, "Dia 14");
        assert_eq!(transfer.copy.total, 80);
        assert_eq!(transfer.copy.skipped_merged, 1);
        assert_eq!(transfer.highlighted, 5);

        let target = workbook.sheet("Dia 14").unwrap();
        assert_eq!(target.value(14, 11), &CellValue::Number(14.0));
        assert_eq!(target.cell(6, 15).font_color.as_deref(), Some(RED));
        assert_eq!(target.cell(5, 15).font_color, None);
    }

    #[test]
    fn test_staged_sheet_lists_copied_and_highlighted_cells() {
        let mut workbook = workbook_with_days();
        let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        let transfer = stage_daily_prices(&mut workbook, today).unwrap();

        let staged = StagedSheet::from_transfer(&workbook, Path::new("Planilha.xlsx"), &transfer).unwrap();
        assert_eq!(staged.target_sheet, "Dia 14");
        // 10 preços em K e 5 em O
        assert_eq!(staged.cells.len(), 15);
        let o6 = staged.cells.iter().find(|c| c.address == "O6").unwrap();
        assert_eq!(o6.value, CellValue::Number(6.0));
        assert_eq!(o6.font_color.as_deref(), Some(RED));

        let dir = tempfile::TempDir::new().unwrap();
        let path = staged.write(&dir.path().join("reports"), "run_20250715_080000").unwrap();
        assert!(path.ends_with("run_20250715_080000_etapa1.json"));
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["cells"].as_array().map(Vec::len), Some(15));
        assert_eq!(json["range"], "K5:R14");
    }

    #[test]
    fn test_stage_daily_prices_missing_sheet() {
        let mut workbook = workbook_with_days();
        let today = NaiveDate::from_ymd_opt(2025, 7, 20).unwrap();
        assert!(matches!(
            stage_daily_prices(&mut workbook, today),
            Err(DeskError::DataValidationError { .. })
        ));
    }

    #[test]
    fn test_select_steps() {
        assert_eq!(select_steps(&[]).unwrap().len(), 8);
        assert_eq!(
            select_steps(&[8, 1]).unwrap(),
            vec![StepId::SalesProjection, StepId::BackupPrices]
        );
        assert!(select_steps(&[9]).is_err());
    }
}
