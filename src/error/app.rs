use thiserror::Error;

use super::{
    CanvasError, ComponentError, ConfigError, DistributedError, ExecutionError, TerminalError,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("CLI error: {source}")]
    Clap {
        #[from]
        source: clap::Error,
    },
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("Join error: {source}")]
    Join {
        #[from]
        source: tokio::task::JoinError,
    },
    #[error("Canvas error: {0}")]
    Canvas(#[from] CanvasError),
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),
    #[error("Terminal error: {0}")]
    Terminal(#[from] TerminalError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Distributed error: {0}")]
    Distributed(#[from] DistributedError),
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn canvas<E>(error: E) -> Self
    where
        E: Into<CanvasError>,
    {
        error.into().into()
    }

    pub fn component<E>(error: E) -> Self
    where
        E: Into<ComponentError>,
    {
        error.into().into()
    }

    pub fn terminal<E>(error: E) -> Self
    where
        E: Into<TerminalError>,
    {
        error.into().into()
    }

    pub fn config<E>(error: E) -> Self
    where
        E: Into<ConfigError>,
    {
        error.into().into()
    }

    pub fn distributed<E>(error: E) -> Self
    where
        E: Into<DistributedError>,
    {
        error.into().into()
    }

    pub fn execution<E>(error: E) -> Self
    where
        E: Into<ExecutionError>,
    {
        error.into().into()
    }
}
