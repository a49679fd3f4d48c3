use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown activity status: {0}")]
    UnknownActivityStatus(String),

    #[error("Unknown alert type: {0}")]
    UnknownAlertType(String),

    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
