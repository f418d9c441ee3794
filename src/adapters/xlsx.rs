use crate::core::cache::{CacheKind, FileCache};
use crate::core::workbook::Workbook;
use crate::domain::ports::WorkbookReader;
use crate::utils::error::Result;
use std::path::Path;
use std::sync::Arc;

/// Lê `.xlsx` com calamine, opcionalmente passando pelo cache de arquivos.
#[derive(Clone, Default)]
pub struct XlsxReader {
    cache: Option<Arc<FileCache>>,
}

impl XlsxReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(cache: Arc<FileCache>) -> Self {
        Self { cache: Some(cache) }
    }
}

impl WorkbookReader for XlsxReader {
    fn read(&self, path: &Path) -> Result<Workbook> {
        match &self.cache {
            // A chave inclui mtime e tamanho: um arquivo alterado nunca reaproveita a entrada antiga.
            Some(cache) => cache.get_or_insert_file_entry(CacheKind::Workbook, path, "values", || {
                Workbook::from_xlsx(path)
            }),
            None => Workbook::from_xlsx(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::workbook::{CellValue, Worksheet};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_cached_read_reuses_entry_for_unchanged_file() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(FileCache::new(dir.path().join("cache"), Duration::from_secs(60)).unwrap());
        let file = dir.path().join("vendas.xlsx");
        std::fs::write(&file, b"not really a workbook").unwrap();

        let mut sheet = Worksheet::new("Dia 01");
        sheet.set_value(5, 11, CellValue::Number(6.19));
        let mut expected = Workbook::new();
        expected.add_sheet(sheet);
        assert!(cache.set_file_entry(CacheKind::Workbook, &file, "values", &expected));

        // O conteúdo não é um xlsx válido: só o cache pode responder.
        let read = XlsxReader::cached(Arc::clone(&cache)).read(&file).unwrap();
        assert_eq!(read, expected);
        assert!(XlsxReader::new().read(&file).is_err());
    }
}
