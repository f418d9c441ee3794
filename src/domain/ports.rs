use crate::core::workbook::Workbook;
use crate::domain::model::{CommandOutput, ExternalCommand};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Fronteira com os programas externos (AutoSystem, EMSys, webmail).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &ExternalCommand) -> Result<CommandOutput>;
}

pub trait WorkbookReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Workbook>;
}
