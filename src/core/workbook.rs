//! Modelo em memória de uma pasta de trabalho: valores e cor da fonte por célula.
//!
//! Linhas e colunas são 1-based, como no Excel (`K5` = linha 5, coluna 11).

use crate::utils::error::{DeskError, Result};
use crate::utils::validation::normalize_brazilian_number;
use calamine::{open_workbook, Data, Reader, Xlsx};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;

pub const RED: &str = "FF0000";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Número da célula; textos em formato brasileiro também são aceitos.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => normalize_brazilian_number(s).parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Error(e) => write!(f, "#{}", e),
        }
    }
}

impl From<&Data> for CellValue {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => CellValue::Empty,
            Data::Int(i) => CellValue::Number(*i as f64),
            Data::Float(f) => CellValue::Number(*f),
            Data::String(s) => CellValue::Text(s.clone()),
            Data::Bool(b) => CellValue::Bool(*b),
            Data::Error(e) => CellValue::Error(format!("{:?}", e)),
            other => CellValue::Text(other.to_string()),
        }
    }
}

/// `"A"` -> 1, `"R"` -> 18, `"AA"` -> 27.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, c| {
        let c = c.to_ascii_uppercase();
        if !c.is_ascii_uppercase() {
            return None;
        }
        acc.checked_mul(26)?.checked_add(c as u32 - 'A' as u32 + 1)
    })
}

pub fn column_letter(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        index = (index - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let split = address
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| DeskError::validation("cell", address, "missing row number"))?;
        let (letters, digits) = address.split_at(split);

        let col = column_index(letters)
            .ok_or_else(|| DeskError::validation("cell", address, "invalid column"))?;
        let row: u32 = digits
            .parse()
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| DeskError::validation("cell", address, "invalid row"))?;
        Ok(Self { row, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.col), self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    pub fn new(start: CellRef, end: CellRef) -> Self {
        Self {
            start: CellRef::new(start.row.min(end.row), start.col.min(end.col)),
            end: CellRef::new(start.row.max(end.row), start.col.max(end.col)),
        }
    }

    /// `"K5:R14"`; um endereço sozinho vira um intervalo de uma célula.
    pub fn parse(range: &str) -> Result<Self> {
        match range.split_once(':') {
            Some((a, b)) => Ok(Self::new(CellRef::parse(a)?, CellRef::parse(b)?)),
            None => {
                let cell = CellRef::parse(range)?;
                Ok(Self::new(cell, cell))
            }
        }
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.start.row..=self.end.row).contains(&row) && (self.start.col..=self.end.col).contains(&col)
    }

    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| (self.start.col..=self.end.col).map(move |col| CellRef::new(row, col)))
    }

    pub fn cell_count(&self) -> usize {
        ((self.end.row - self.start.row + 1) * (self.end.col - self.start.col + 1)) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    pub font_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    // linha -> coluna -> célula
    cells: BTreeMap<u32, BTreeMap<u32, Cell>>,
    merged: Vec<CellRange>,
}

static EMPTY_CELL: Cell = Cell {
    value: CellValue::Empty,
    font_color: None,
};

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            merged: Vec::new(),
        }
    }

    pub fn cell(&self, row: u32, col: u32) -> &Cell {
        self.cells
            .get(&row)
            .and_then(|r| r.get(&col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn value(&self, row: u32, col: u32) -> &CellValue {
        &self.cell(row, col).value
    }

    pub fn value_at(&self, address: &str) -> Result<&CellValue> {
        let cell = CellRef::parse(address)?;
        Ok(self.value(cell.row, cell.col))
    }

    fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        self.cells.entry(row).or_default().entry(col).or_default()
    }

    pub fn set_value(&mut self, row: u32, col: u32, value: CellValue) {
        self.cell_mut(row, col).value = value;
    }

    pub fn set_font_color(&mut self, row: u32, col: u32, color: &str) {
        self.cell_mut(row, col).font_color = Some(color.to_string());
    }

    pub fn merge(&mut self, range: CellRange) {
        self.merged.push(range);
    }

    /// Célula coberta por mesclagem, exceto a do canto superior esquerdo (que guarda o valor).
    pub fn is_merged(&self, row: u32, col: u32) -> bool {
        self.merged
            .iter()
            .any(|m| m.contains(row, col) && !(m.start.row == row && m.start.col == col))
    }

    pub fn max_row(&self) -> u32 {
        self.cells.keys().next_back().copied().unwrap_or(0)
    }

    /// Pinta a fonte das células não vazias de `col` nas linhas indicadas.
    pub fn highlight_non_empty(&mut self, col: u32, rows: RangeInclusive<u32>, color: &str) -> usize {
        let mut formatted = 0;
        for row in rows {
            if !self.value(row, col).is_empty() {
                self.set_font_color(row, col, color);
                formatted += 1;
            }
        }
        formatted
    }

    /// Valor na coluna `value_col` da linha cuja coluna A contém `label`.
    pub fn find_labelled_value(&self, label: &str, value_col: u32) -> Option<&CellValue> {
        let label = label.trim();
        self.cells
            .iter()
            .find(|(_, cols)| {
                cols.get(&1)
                    .is_some_and(|c| matches!(&c.value, CellValue::Text(t) if t.contains(label)))
            })
            .map(|(row, _)| self.value(*row, value_col))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CopyReport {
    pub total: usize,
    pub copied: usize,
    pub skipped_merged: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
}

/// Nome da aba diária: `Dia 05`.
pub fn daily_sheet_name(date: NaiveDate) -> String {
    format!("Dia {:02}", date.day())
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lê os valores de todas as abas de um `.xlsx` (fórmulas entram pelo valor calculado).
    pub fn from_xlsx(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut excel: Xlsx<_> = open_workbook(path)?;
        let merged_available = excel.load_merged_regions().is_ok();

        let mut workbook = Workbook::new();
        for name in excel.sheet_names() {
            let range = excel.worksheet_range(&name)?;
            let mut sheet = Worksheet::new(name.clone());

            if let Some((row0, col0)) = range.start() {
                for (r, c, data) in range.used_cells() {
                    let value = CellValue::from(data);
                    if !value.is_empty() {
                        sheet.set_value(row0 + r as u32 + 1, col0 + c as u32 + 1, value);
                    }
                }
            }

            if merged_available {
                for (_, _, dims) in excel.merged_regions_by_sheet(&name) {
                    sheet.merge(CellRange::new(
                        CellRef::new(dims.start.0 + 1, dims.start.1 + 1),
                        CellRef::new(dims.end.0 + 1, dims.end.1 + 1),
                    ));
                }
            }

            workbook.sheets.push(sheet);
        }

        tracing::debug!(
            "📖 Loaded {} sheet(s) from {}",
            workbook.sheets.len(),
            path.display()
        );
        Ok(workbook)
    }

    pub fn add_sheet(&mut self, sheet: Worksheet) {
        self.sheets.push(sheet);
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn require_sheet(&self, name: &str) -> Result<&Worksheet> {
        self.sheet(name)
            .ok_or_else(|| DeskError::validation("sheet", name, "sheet not found in workbook"))
    }

    pub fn first_sheet(&self) -> Option<&Worksheet> {
        self.sheets.first()
    }

    /// Copia os valores de `range` de uma aba para a mesma posição em outra.
    /// Células mescladas no destino são ignoradas.
    pub fn copy_range(&mut self, source: &str, target: &str, range: CellRange) -> Result<CopyReport> {
        let values: Vec<(CellRef, CellValue)> = {
            let src = self.require_sheet(source)?;
            range
                .cells()
                .map(|cell| (cell, src.value(cell.row, cell.col).clone()))
                .collect()
        };

        let dst = self
            .sheet_mut(target)
            .ok_or_else(|| DeskError::validation("sheet", target, "sheet not found in workbook"))?;

        let mut report = CopyReport {
            total: values.len(),
            ..CopyReport::default()
        };
        for (cell, value) in values {
            if dst.is_merged(cell.row, cell.col) {
                report.skipped_merged += 1;
                continue;
            }
            dst.set_value(cell.row, cell.col, value);
            report.copied += 1;
        }

        tracing::info!(
            "📋 Range {}:{} copied from '{}' to '{}' ({} cells)",
            range.start,
            range.end,
            source,
            target,
            report.copied
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_conversions() {
        assert_eq!(column_index("A"), Some(1));
        assert_eq!(column_index("k"), Some(11));
        assert_eq!(column_index("AA"), Some(27));
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
        assert_eq!(column_letter(18), "R");
        assert_eq!(column_letter(28), "AB");
    }

    #[test]
    fn test_parse_range() {
        let range = CellRange::parse("K5:R14").unwrap();
        assert_eq!(range.start, CellRef::new(5, 11));
        assert_eq!(range.end, CellRef::new(14, 18));
        assert_eq!(range.cell_count(), 80);
        assert!(CellRange::parse("5K").is_err());
        assert_eq!(CellRef::new(33, 4).to_string(), "D33");
    }

    #[test]
    fn test_daily_sheet_name() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 5).unwrap();
        assert_eq!(daily_sheet_name(date), "Dia 05");
    }

    #[test]
    fn test_cell_value_as_number() {
        assert_eq!(CellValue::Number(2.5).as_f64(), Some(2.5));
        assert_eq!(CellValue::Text("1.234,50".into()).as_f64(), Some(1234.5));
        assert_eq!(CellValue::Empty.as_f64(), None);
    }

    #[test]
    fn test_merged_detection() {
        let mut sheet = Worksheet::new("Dia 01");
        sheet.merge(CellRange::parse("K5:L5").unwrap());
        assert!(!sheet.is_merged(5, 11));
        assert!(sheet.is_merged(5, 12));
        assert!(!sheet.is_merged(6, 12));
    }

    #[test]
    fn test_find_labelled_value() {
        let mut sheet = Worksheet::new("tmp");
        sheet.set_value(3, 1, CellValue::Text("Combustíveis".into()));
        sheet.set_value(3, 18, CellValue::Number(10.0));
        sheet.set_value(9, 1, CellValue::Text(" Total Geral (Todos os Departamentos) ".into()));
        sheet.set_value(9, 11, CellValue::Number(321.0));
        sheet.set_value(9, 18, CellValue::Number(4567.89));

        let r = column_index("R").unwrap();
        assert_eq!(
            sheet.find_labelled_value("Total Geral (Todos os Departamentos)", r),
            Some(&CellValue::Number(4567.89))
        );
        assert_eq!(
            sheet.find_labelled_value("Total Geral (Todos os Departamentos)", 11),
            Some(&CellValue::Number(321.0))
        );
        assert_eq!(sheet.find_labelled_value("Inexistente", r), None);
    }

    #[test]
    fn test_workbook_serializes_for_cache() {
        let mut sheet = Worksheet::new("Dia 02");
        sheet.set_value(5, 11, CellValue::Number(5.89));
        sheet.set_font_color(5, 15, RED);
        let mut workbook = Workbook::new();
        workbook.add_sheet(sheet);

        let json = serde_json::to_string(&workbook).unwrap();
        let back: Workbook = serde_json::from_str(&json).unwrap();
        assert_eq!(back, workbook);
    }
}
