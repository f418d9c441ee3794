use crate::utils::error::{DeskError, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(DeskError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(DeskError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: path.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(DeskError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_file_extensions(
    field_name: &str,
    files: &[String],
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    for file in files {
        match Path::new(file).extension().and_then(|ext| ext.to_str()) {
            Some(extension) if allowed_set.contains(extension.to_lowercase().as_str()) => {}
            Some(extension) => {
                return Err(DeskError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: format!(
                        "Unsupported file extension: {}. Allowed extensions: {}",
                        extension,
                        allowed_extensions.join(", ")
                    ),
                });
            }
            None => {
                return Err(DeskError::InvalidConfigValueError {
                    field: field_name.to_string(),
                    value: file.clone(),
                    reason: "File has no extension or invalid filename".to_string(),
                });
            }
        }
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| DeskError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DeskError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(DeskError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Conversão numérica (formato brasileiro)
// ---------------------------------------------------------------------------

static RE_NUMERIC_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d\-+.,]").expect("valid numeric noise regex"));

/// Normaliza texto numérico para o formato com ponto decimal.
///
/// - `"1.500,50"` -> `"1500.50"` (ponto = milhar, vírgula = decimal)
/// - `"1500,50"` -> `"1500.50"`
/// - `"1.500.000"` ou `"1.5000"` -> ponto tratado como separador de milhar
pub fn normalize_brazilian_number(raw: &str) -> String {
    let cleaned = RE_NUMERIC_NOISE.replace_all(raw.trim(), "").to_string();

    if cleaned.contains(',') {
        if cleaned.contains('.') {
            cleaned.replace('.', "").replace(',', ".")
        } else {
            cleaned.replace(',', ".")
        }
    } else if cleaned.contains('.') {
        let dot_count = cleaned.matches('.').count();
        let last_dot = cleaned.rfind('.').unwrap_or(0);
        if dot_count > 1 || cleaned.len() - last_dot - 1 > 3 {
            cleaned.replace('.', "")
        } else {
            cleaned
        }
    } else {
        cleaned
    }
}

/// Entrada aceita pelos validadores numéricos.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericInput<'a> {
    Number(f64),
    Text(&'a str),
}

impl From<f64> for NumericInput<'_> {
    fn from(value: f64) -> Self {
        NumericInput::Number(value)
    }
}

impl From<i64> for NumericInput<'_> {
    fn from(value: i64) -> Self {
        NumericInput::Number(value as f64)
    }
}

impl<'a> From<&'a str> for NumericInput<'a> {
    fn from(value: &'a str) -> Self {
        NumericInput::Text(value)
    }
}

impl<'a> From<&'a String> for NumericInput<'a> {
    fn from(value: &'a String) -> Self {
        NumericInput::Text(value.as_str())
    }
}

impl std::fmt::Display for NumericInput<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumericInput::Number(n) => write!(f, "{}", n),
            NumericInput::Text(s) => write!(f, "{}", s),
        }
    }
}

fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[derive(Debug, Clone)]
pub struct NumericValidator {
    pub field_name: String,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub allow_negative: bool,
    pub decimal_places: Option<u32>,
}

impl NumericValidator {
    pub fn new(field_name: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            min_value: None,
            max_value: None,
            allow_negative: true,
            decimal_places: None,
        }
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min_value = Some(min);
        self
    }

    pub fn with_max(mut self, max: f64) -> Self {
        self.max_value = Some(max);
        self
    }

    pub fn non_negative(mut self) -> Self {
        self.allow_negative = false;
        self
    }

    pub fn with_decimal_places(mut self, places: u32) -> Self {
        self.decimal_places = Some(places);
        self
    }

    pub fn validate<'a>(&self, input: impl Into<NumericInput<'a>>) -> Result<f64> {
        let input = input.into();
        let parsed = match &input {
            NumericInput::Number(n) => *n,
            NumericInput::Text(text) => {
                let normalized = normalize_brazilian_number(text);
                if normalized.is_empty() {
                    0.0
                } else {
                    normalized.parse::<f64>().map_err(|_| {
                        DeskError::validation(
                            &self.field_name,
                            &input,
                            format!("could not convert to a number: {}", text),
                        )
                    })?
                }
            }
        };

        if !parsed.is_finite() {
            return Err(DeskError::validation(&self.field_name, &input, "value is not finite"));
        }

        if !self.allow_negative && parsed < 0.0 {
            return Err(DeskError::validation(
                &self.field_name,
                &input,
                format!("value cannot be negative: {}", parsed),
            ));
        }

        if let Some(min) = self.min_value {
            if parsed < min {
                return Err(DeskError::validation(
                    &self.field_name,
                    &input,
                    format!("value must be >= {}: {}", min, parsed),
                ));
            }
        }

        if let Some(max) = self.max_value {
            if parsed > max {
                return Err(DeskError::validation(
                    &self.field_name,
                    &input,
                    format!("value must be <= {}: {}", max, parsed),
                ));
            }
        }

        let result = match self.decimal_places {
            Some(places) => round_to(parsed, places),
            None => parsed,
        };

        tracing::trace!(field = %self.field_name, input = %input, result, "numeric value validated");
        Ok(result)
    }
}

/// Conversão com valor padrão em caso de falha.
pub fn safe_float<'a>(input: impl Into<NumericInput<'a>>, default: f64) -> f64 {
    let input = input.into();
    match NumericValidator::new("numeric_value").validate(input.clone()) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("float conversion failed for {}, using default {}", input, default);
            default
        }
    }
}

pub fn safe_int<'a>(input: impl Into<NumericInput<'a>>, default: i64) -> i64 {
    let input = input.into();
    match NumericValidator::new("integer_value").validate(input.clone()) {
        Ok(value) => value.trunc() as i64,
        Err(_) => {
            tracing::warn!("int conversion failed for {}, using default {}", input, default);
            default
        }
    }
}

// ---------------------------------------------------------------------------
// Caminhos de arquivo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FilePathValidator {
    pub field_name: String,
    pub must_exist: bool,
    pub allowed_extensions: Vec<String>,
    pub create_if_missing: bool,
}

impl FilePathValidator {
    pub fn new(field_name: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            must_exist: true,
            allowed_extensions: Vec::new(),
            create_if_missing: false,
        }
    }

    pub fn allow_missing(mut self) -> Self {
        self.must_exist = false;
        self
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.allowed_extensions = extensions.iter().map(|e| e.to_lowercase()).collect();
        self
    }

    pub fn create_if_missing(mut self) -> Self {
        self.create_if_missing = true;
        self
    }

    pub fn validate(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        if shown.is_empty() {
            return Err(DeskError::validation(&self.field_name, &shown, "path cannot be empty"));
        }

        if self.must_exist && !path.exists() {
            if self.create_if_missing {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::File::create(path)?;
            } else {
                return Err(DeskError::validation(
                    &self.field_name,
                    &shown,
                    format!("file not found: {}", shown),
                ));
            }
        }

        if !self.allowed_extensions.is_empty() {
            let suffix = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| format!(".{}", ext.to_lowercase()))
                .unwrap_or_default();
            if !self.allowed_extensions.contains(&suffix) {
                return Err(DeskError::validation(
                    &self.field_name,
                    &shown,
                    format!(
                        "extension not allowed. Allowed: {}. Found: {}",
                        self.allowed_extensions.join(", "),
                        suffix
                    ),
                ));
            }
        }

        Ok(path.to_path_buf())
    }
}

pub fn validate_file_exists(path: impl AsRef<Path>) -> Result<PathBuf> {
    FilePathValidator::new("file_path").validate(path)
}

pub fn validate_excel_file(path: impl AsRef<Path>) -> Result<PathBuf> {
    FilePathValidator::new("excel_file")
        .with_extensions(&[".xlsx", ".xls"])
        .validate(path)
}

// ---------------------------------------------------------------------------
// Combustíveis
// ---------------------------------------------------------------------------

pub const FUEL_KINDS: [&str; 4] = ["etanol", "aditivada", "diesel", "comum"];

#[derive(Debug, Clone)]
pub struct FuelValidator {
    field_name: String,
}

impl Default for FuelValidator {
    fn default() -> Self {
        Self {
            field_name: "combustivel".to_string(),
        }
    }
}

impl FuelValidator {
    pub fn validate_kind(&self, kind: &str) -> Result<String> {
        let normalized = kind.trim().to_lowercase();
        if !FUEL_KINDS.contains(&normalized.as_str()) {
            return Err(DeskError::validation(
                &self.field_name,
                kind,
                format!("invalid fuel kind. Allowed: {:?}", FUEL_KINDS),
            ));
        }
        Ok(normalized)
    }

    /// Litros: 0..=50000 (capacidade razoável de tanque), 2 casas.
    pub fn validate_liters<'a>(&self, liters: impl Into<NumericInput<'a>>) -> Result<f64> {
        NumericValidator::new(&format!("{}_litros", self.field_name))
            .with_min(0.0)
            .with_max(50_000.0)
            .non_negative()
            .with_decimal_places(2)
            .validate(liters)
    }

    /// Preço por litro: 0.01..=20, 3 casas.
    pub fn validate_price<'a>(&self, price: impl Into<NumericInput<'a>>) -> Result<f64> {
        NumericValidator::new(&format!("{}_preco", self.field_name))
            .with_min(0.01)
            .with_max(20.0)
            .non_negative()
            .with_decimal_places(3)
            .validate(price)
    }
}

/// Valida os litros informados por tipo de combustível; chaves desconhecidas são ignoradas.
pub fn validate_fuel_data(data: &BTreeMap<String, String>) -> Result<BTreeMap<String, f64>> {
    let validator = FuelValidator::default();
    let mut validated = BTreeMap::new();

    for kind in FUEL_KINDS {
        if let Some(value) = data.get(kind) {
            let kind = validator.validate_kind(kind)?;
            let liters = validator.validate_liters(value.as_str())?;
            validated.insert(kind, liters);
        }
    }

    Ok(validated)
}

// ---------------------------------------------------------------------------
// Configuração e dados do domínio
// ---------------------------------------------------------------------------

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn env_var(name: &str, required: bool) -> Result<Option<String>> {
        let value = std::env::var(name).ok().filter(|v| !v.is_empty());
        if required && value.is_none() {
            return Err(DeskError::config(
                name,
                format!("required environment variable is not defined: {}", name),
            ));
        }
        Ok(value)
    }

    pub fn spreadsheet_path(path: impl AsRef<Path>) -> Result<PathBuf> {
        FilePathValidator::new("planilha_path")
            .with_extensions(&[".xlsx", ".xls"])
            .validate(path)
    }
}

pub fn validate_system_user(user: &str) -> Result<String> {
    let user = user.trim();
    if user.chars().count() < 3 {
        return Err(DeskError::validation(
            "usuario",
            user,
            "user must have at least 3 characters",
        ));
    }
    Ok(user.to_string())
}

pub fn validate_system_password(password: &str) -> Result<String> {
    if password.chars().count() < 3 {
        return Err(DeskError::validation(
            "senha",
            "***",
            "password must have at least 3 characters",
        ));
    }
    Ok(password.to_string())
}

pub fn validate_report_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| DeskError::validation("data_relatorio", raw, "unrecognized date format"))
}

pub fn validate_money<'a>(field: &str, value: impl Into<NumericInput<'a>>) -> Result<f64> {
    NumericValidator::new(field)
        .with_min(0.0)
        .non_negative()
        .with_decimal_places(2)
        .validate(value)
}

pub fn validate_percentage<'a>(field: &str, value: impl Into<NumericInput<'a>>) -> Result<f64> {
    NumericValidator::new(field)
        .with_min(0.0)
        .with_max(100.0)
        .non_negative()
        .with_decimal_places(2)
        .validate(value)
}

// ---------------------------------------------------------------------------
// Validação em lote
// ---------------------------------------------------------------------------

pub enum FieldValidator {
    Numeric(NumericValidator),
    FilePath(FilePathValidator),
}

impl FieldValidator {
    fn validate(&self, raw: &str) -> Result<Value> {
        match self {
            FieldValidator::Numeric(v) => Ok(Value::from(v.validate(raw)?)),
            FieldValidator::FilePath(v) => Ok(Value::from(v.validate(raw)?.display().to_string())),
        }
    }
}

/// Valida vários campos de um formulário de uma só vez.
#[derive(Default)]
pub struct BatchValidator {
    validators: BTreeMap<String, FieldValidator>,
    errors: BTreeMap<String, String>,
    validated: BTreeMap<String, Value>,
}

impl BatchValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_validator(&mut self, field: &str, validator: FieldValidator) -> &mut Self {
        self.validators.insert(field.to_string(), validator);
        self
    }

    pub fn add_numeric(&mut self, validator: NumericValidator) -> &mut Self {
        let field = validator.field_name.clone();
        self.add_validator(&field, FieldValidator::Numeric(validator))
    }

    pub fn add_file(&mut self, validator: FilePathValidator) -> &mut Self {
        let field = validator.field_name.clone();
        self.add_validator(&field, FieldValidator::FilePath(validator))
    }

    /// Retorna `true` quando todos os campos passaram.
    pub fn validate_all(&mut self, data: &BTreeMap<String, String>, stop_on_first_error: bool) -> bool {
        self.errors.clear();
        self.validated.clear();

        for (field, raw) in data {
            match self.validators.get(field) {
                Some(validator) => match validator.validate(raw) {
                    Ok(value) => {
                        self.validated.insert(field.clone(), value);
                    }
                    Err(e) => {
                        self.errors.insert(field.clone(), e.to_string());
                        if stop_on_first_error {
                            break;
                        }
                    }
                },
                None => {
                    self.validated.insert(field.clone(), Value::String(raw.clone()));
                }
            }
        }

        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn validated_data(&self) -> &BTreeMap<String, Value> {
        &self.validated
    }

    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return "No validation errors".to_string();
        }

        let mut summary = format!("Found {} validation error(s):", self.errors.len());
        for (field, error) in &self.errors {
            summary.push_str(&format!("\n- {}: {}", field, error));
        }
        summary
    }
}
