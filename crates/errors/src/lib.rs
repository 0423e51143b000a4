//! pubsub-errors - 统一错误处理
//!
//! 适配器与宿主共用的错误类型

use std::error::Error as StdError;

use thiserror::Error;

/// 底层传输错误（保留原始错误，不做包装）
pub type TransportError = Box<dyn StdError + Send + Sync + 'static>;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// 透明转发底层客户端错误，`source()` 与 `Display` 均来自原始错误
    #[error(transparent)]
    Transport(TransportError),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    /// 订阅回调拒绝了消息，消息未确认，等待重投
    #[error("Handler rejected message: {0}")]
    HandlerRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn transport<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Transport(Box::new(err))
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn handler_rejected(msg: impl Into<String>) -> Self {
        Self::HandlerRejected(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 取回原始传输错误
    pub fn transport_source<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Transport(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// 错误类别（用于日志与指标标签）
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::Connection(_) => "connection",
            Self::Transport(_) => "transport",
            Self::FailedPrecondition(_) => "failed_precondition",
            Self::ExternalService(_) => "external_service",
            Self::HandlerRejected(_) => "handler_rejected",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
