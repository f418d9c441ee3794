#[cfg(feature = "cli")]
pub mod cli;
pub mod dynamic_config;
pub mod env_file;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::Cli;
pub use dynamic_config::DynamicConfigManager;
pub use env_file::EnvFile;
pub use toml_config::AppConfig;
