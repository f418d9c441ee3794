use crate::utils::error::{DeskError, ErrorHandler, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

pub const BACKUP_SUFFIX: &str = " - BACKUP";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

impl BackupOutcome {
    pub fn path(&self) -> &Path {
        match self {
            BackupOutcome::Created(p) | BackupOutcome::AlreadyExists(p) => p,
        }
    }
}

/// `Planilha.xlsx` -> `Planilha - BACKUP.xlsx`, no mesmo diretório.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, BACKUP_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, BACKUP_SUFFIX),
    };
    path.with_file_name(file_name)
}

/// Cria a cópia de segurança da planilha; um backup já existente é mantido.
pub fn create_spreadsheet_backup(path: impl AsRef<Path>) -> Result<BackupOutcome> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(DeskError::file(
            format!("spreadsheet not found: {}", path.display()),
            path,
            "backup",
        ));
    }

    let backup = backup_path_for(path);
    if backup.exists() {
        tracing::info!("ℹ️ Backup already exists: {}", backup.display());
        return Ok(BackupOutcome::AlreadyExists(backup));
    }

    std::fs::copy(path, &backup).map_err(|e| ErrorHandler::file_error(e, path, "backup"))?;
    tracing::info!("✅ Backup created: {}", backup.display());
    Ok(BackupOutcome::Created(backup))
}

/// Espera o arquivo aparecer, consultando a cada `interval`.
pub async fn wait_for_file(path: impl AsRef<Path>, timeout: Duration, interval: Duration) -> bool {
    let path = path.as_ref();
    let started = Instant::now();

    loop {
        if path.exists() {
            tracing::debug!("📄 File available: {}", path.display());
            return true;
        }
        if started.elapsed() >= timeout {
            tracing::warn!(
                "⏰ Timed out after {:?} waiting for {}",
                timeout,
                path.display()
            );
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Diretório da área de trabalho do usuário.
pub fn desktop_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(|home| PathBuf::from(home).join("Desktop"))
}

fn is_tmp_export(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_lowercase(),
        None => return false,
    };
    name.starts_with("tmp") && name.ends_with(".xlsx") && path.is_file()
}

/// Primeiro `tmp*.xlsx` (ordem alfabética) exportado pelo sistema externo.
pub fn find_tmp_export(dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| ErrorHandler::file_error(e, dir, "find_tmp_export"))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_tmp_export(path))
        .collect();
    candidates.sort();

    Ok(candidates.into_iter().next())
}

/// Espera o `tmp*.xlsx` aparecer em `dir`.
pub async fn wait_for_tmp_export(
    dir: impl AsRef<Path>,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<PathBuf>> {
    let dir = dir.as_ref();
    let started = Instant::now();

    loop {
        if let Some(found) = find_tmp_export(dir)? {
            return Ok(Some(found));
        }
        if started.elapsed() >= timeout {
            tracing::warn!("⏰ No tmp*.xlsx appeared in {} after {:?}", dir.display(), timeout);
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}

pub fn remove_tmp_export(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("🗑️ Removed hand-off file {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ErrorHandler::file_error(e, path, "remove_tmp_export")),
    }
}

/// Procura `relative` a partir de `start`, subindo pelos diretórios pais.
pub fn find_file_in_project(start: impl AsRef<Path>, relative: impl AsRef<Path>) -> Option<PathBuf> {
    let relative = relative.as_ref();
    start
        .as_ref()
        .ancestors()
        .map(|dir| dir.join(relative))
        .find(|candidate| candidate.exists())
}
