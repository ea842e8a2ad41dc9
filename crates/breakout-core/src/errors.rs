use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BreakoutError {
    #[error("invalid target room: {0}")]
    InvalidTarget(String),
    #[error("invalid room title: {0}")]
    InvalidTitle(String),
    #[error("not permitted: {0}")]
    NotPermitted(String),
    #[error("remote apply failed: {0}")]
    Remote(String),
    #[error("settings error: {0}")]
    Settings(String),
}
