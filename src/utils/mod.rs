pub mod error;
pub mod expression;
pub mod files;
pub mod logger;
pub mod monitor;
pub mod validation;
