use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// As oito etapas do fechamento diário, na ordem de execução.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepId {
    BackupPrices = 1,
    MiniMarket = 2,
    LitersDiscounts = 3,
    CashbackPix = 4,
    ManualLiters = 5,
    EmailReport = 6,
    CashClosing = 7,
    SalesProjection = 8,
}

impl StepId {
    pub const ALL: [StepId; 8] = [
        StepId::BackupPrices,
        StepId::MiniMarket,
        StepId::LitersDiscounts,
        StepId::CashbackPix,
        StepId::ManualLiters,
        StepId::EmailReport,
        StepId::CashClosing,
        StepId::SalesProjection,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(number: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.number() == number)
    }

    pub fn name(self) -> &'static str {
        match self {
            StepId::BackupPrices => "Backup e Preços",
            StepId::MiniMarket => "Mini-Mercado",
            StepId::LitersDiscounts => "Litros e Descontos",
            StepId::CashbackPix => "Cashback e Pix",
            StepId::ManualLiters => "Inserção Manual de Litros",
            StepId::EmailReport => "Envio de Relatório por E-mail",
            StepId::CashClosing => "Fechamento de Caixa",
            StepId::SalesProjection => "Projeção de Vendas",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            StepId::BackupPrices => "backup_e_precos",
            StepId::MiniMarket => "minimercado",
            StepId::LitersDiscounts => "litros_descontos",
            StepId::CashbackPix => "cashback_pix",
            StepId::ManualLiters => "insercao_litros",
            StepId::EmailReport => "envio_email",
            StepId::CashClosing => "fechamento_caixa",
            StepId::SalesProjection => "projecao_de_vendas",
        }
    }

    /// Nome da métrica registrada para a etapa: `etapa{N}_{slug}`.
    pub fn metric_name(self) -> String {
        format!("etapa{}_{}", self.number(), self.slug())
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Etapa {}: {}", self.number(), self.name())
    }
}

/// O que fazer quando uma etapa falha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Stop,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Skipped,
    Failed,
}

/// Resultado de uma etapa, guardado no contexto da execução.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step: StepId,
    pub status: StepStatus,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
    pub message: Option<String>,
    pub outputs: Map<String, Value>,
}

impl StepResult {
    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

fn serialize_duration_ms<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_millis() as u64)
}

/// Retorno de `Step::run`.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub skipped: bool,
    pub message: Option<String>,
    pub outputs: Map<String, Value>,
}

impl StepOutcome {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            skipped: false,
            message: Some(message.into()),
            outputs: Map::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            message: Some(reason.into()),
            outputs: Map::new(),
        }
    }

    pub fn with_output(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.to_string(), value.into());
        self
    }
}

/// Comando externo que executa as automações de interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}
