pub mod config;

pub use config::{load_env_file, AppConfig, ConfigError, Environment};
