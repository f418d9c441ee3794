pub mod steps;

pub use steps::{default_steps, select_steps, BackupStep, ExternalStep, ProjectionStep};
