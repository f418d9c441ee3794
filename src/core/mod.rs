pub mod alerts;
pub mod cache;
pub mod metrics;
pub mod pipeline;
pub mod workbook;

pub use crate::domain::model::{StepId, StepOutcome, StepResult};
pub use crate::utils::error::Result;
pub use pipeline::{Step, StepContext, StepPipeline};
