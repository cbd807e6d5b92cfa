use thiserror::Error;

use crate::network::NetworkError;
use crate::state::{SessionState, StateError};

/// 会话错误
#[derive(Error, Debug)]
pub enum SessionError {
    /// 会话未处于 Connected 状态
    #[error("Session is not connected (state: {0})")]
    NotConnected(SessionState),

    /// 待发送的内容不是合法 JSON
    #[error("Invalid JSON payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// 连接或传输失败
    #[error("Transport error: {0}")]
    Transport(#[from] NetworkError),

    /// 非法状态转换
    #[error(transparent)]
    InvalidTransition(#[from] StateError),

    /// 同一个控制器只能连接一次
    #[error("Session already started (state: {0})")]
    AlreadyStarted(SessionState),
}

/// 会话模块的结果类型
pub type SessionResult<T> = Result<T, SessionError>;
