//! Errors - エラー型と分類
//!
//! - `ActionError`: 呼び出し側の DeferredAction が返すエラー（lastError になる）
//! - `QueueError`: QueueManager / ports の操作エラー

use thiserror::Error;

use super::ids::ItemId;

/// ErrorKind は運用上の分類
///
/// - Executor: アクションの失敗（ローカルで回復、リトライ/失敗遷移に使う）
/// - Persistence: DurableStore の load/save 失敗（メモリ上の状態が正）
/// - Invariant: 内部整合性の違反（該当アイテムを failed に隔離）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Executor,
    Persistence,
    Invariant,
}

/// Error raised by a caller-supplied action during one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("persistence failed for key={key}: {message}")]
    Persistence { key: String, message: String },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("item not found: {0}")]
    NotFound(ItemId),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("config error: {0}")]
    Config(String),
}

impl QueueError {
    pub fn persistence(key: impl Into<String>, message: impl ToString) -> Self {
        Self::Persistence {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            QueueError::Persistence { .. } | QueueError::Codec(_) => Some(ErrorKind::Persistence),
            QueueError::InvariantViolation(_) => Some(ErrorKind::Invariant),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_error_displays_message_only() {
        let err = ActionError::from("network unreachable");
        assert_eq!(err.to_string(), "network unreachable");
        assert_eq!(err.message(), "network unreachable");
    }

    #[test]
    fn persistence_error_is_classified() {
        let err = QueueError::persistence("replay.queue.sync", "disk full");
        assert_eq!(err.kind(), Some(ErrorKind::Persistence));
        assert!(err.to_string().contains("replay.queue.sync"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn other_errors_are_classified() {
        let codec = QueueError::from(serde_json::from_str::<u32>("nope").unwrap_err());
        assert_eq!(codec.kind(), Some(ErrorKind::Persistence));

        let invariant = QueueError::InvariantViolation("attempts > max".to_string());
        assert_eq!(invariant.kind(), Some(ErrorKind::Invariant));

        let caller = QueueError::InvalidArgument("max_attempts must be >= 1".to_string());
        assert_eq!(caller.kind(), None);
    }
}
