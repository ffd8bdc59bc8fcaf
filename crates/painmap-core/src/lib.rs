//! Shared configuration and domain vocabulary for the painmap workspace.

pub mod app_config;
pub mod config;
pub mod domain;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, LlmProviderKind};
pub use config::{load_app_config, load_app_config_from_env};
pub use domain::{RunStatus, RunType, Sentiment};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown run type: {0}")]
    UnknownRunType(String),

    #[error("unknown run status: {0}")]
    UnknownRunStatus(String),
}
