//! Error types for the control kernel

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControlError>;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Illegal state transition: {from} -> {to}")]
    Transition { from: &'static str, to: &'static str },

    #[error("Robot busy: {0}")]
    Busy(String),

    #[error("Actuator fault: {0}")]
    Actuator(String),

    #[error("Mailbox timeout: {0}")]
    MailboxTimeout(&'static str),

    #[error("Tokio task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
