//! 全局错误处理模块
//!
//! 提供统一的应用错误类型和用户友好的错误消息
//!
//! # 功能
//!
//! - 统一的 `AppError` 类型，聚合所有模块错误
//! - 用户友好的错误消息
//! - 错误代码用于上层处理
//! - 错误恢复建议
//!
//! # 使用示例
//!
//! ```
//! use voxlink_lib::network::NetworkError;
//! use voxlink_lib::utils::error::{AppError, ErrorCode};
//!
//! let err = AppError::from(NetworkError::AuthenticationFailed);
//! assert_eq!(err.code(), ErrorCode::NetworkAuthFailed);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::AudioError;
use crate::codec::DecodeError;
use crate::network::NetworkError;
use crate::playback::PlaybackError;
use crate::session::SessionError;
use crate::state::config::ConfigError;

/// 应用错误类型
///
/// 聚合所有模块的错误类型，提供统一的错误处理接口
#[derive(Error, Debug)]
pub enum AppError {
    /// 音频设备错误
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// 帧解码错误
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// 播放错误
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// 网络错误
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// 配置错误
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// 会话错误
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

/// 错误代码
///
/// 用于上层识别和处理特定错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 音频错误 (1xxx)
    /// 设备不可用（不存在、被占用或未授权）
    AudioDeviceUnavailable,
    /// 音频流错误
    AudioStreamError,
    /// 重采样失败
    AudioResampleFailed,

    // 解码与播放错误 (2xxx)
    /// 帧格式错误
    DecodeMalformed,
    /// 帧中没有音频
    DecodeEmptyAudio,
    /// 播放输出错误
    PlaybackOutputFailed,

    // 网络错误 (3xxx)
    /// 连接失败
    NetworkConnectionFailed,
    /// 认证失败
    NetworkAuthFailed,
    /// 连接超时
    NetworkTimeout,
    /// 地址无效
    NetworkInvalidUrl,

    // 配置错误 (4xxx)
    /// 配置加载失败
    ConfigLoadFailed,
    /// 配置无效
    ConfigInvalid,

    // 会话错误 (5xxx)
    /// 会话未连接
    SessionNotConnected,
    /// 消息不是合法 JSON
    SessionInvalidPayload,
    /// 会话已启动
    SessionAlreadyStarted,
    /// 非法状态转换
    SessionInvalidTransition,

    // 通用错误 (9xxx)
    /// 内部错误
    InternalError,
}

/// 错误上下文信息
///
/// 提供用户友好的错误信息和恢复建议
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// 错误代码
    pub code: ErrorCode,
    /// 用户友好的错误消息
    pub message: String,
    /// 详细错误信息（用于日志）
    pub detail: Option<String>,
    /// 恢复建议
    pub recovery_hint: Option<String>,
    /// 是否可恢复
    pub recoverable: bool,
}

impl ErrorContext {
    /// 创建新的错误上下文
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            recovery_hint: None,
            recoverable: true,
        }
    }

    /// 设置详细信息
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 设置恢复建议
    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    /// 标记为不可恢复
    pub fn not_recoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl AppError {
    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Audio(err) => audio_code(err),

            AppError::Decode(DecodeError::EmptyAudio) => ErrorCode::DecodeEmptyAudio,
            AppError::Decode(DecodeError::Malformed(_)) => ErrorCode::DecodeMalformed,

            AppError::Playback(PlaybackError::Decode(DecodeError::EmptyAudio)) => {
                ErrorCode::DecodeEmptyAudio
            }
            AppError::Playback(PlaybackError::Decode(_)) => ErrorCode::DecodeMalformed,
            AppError::Playback(PlaybackError::Output(_)) => ErrorCode::PlaybackOutputFailed,

            AppError::Network(err) => network_code(err),

            AppError::Config(ConfigError::Json(_)) => ErrorCode::ConfigInvalid,
            AppError::Config(_) => ErrorCode::ConfigLoadFailed,

            AppError::Session(SessionError::NotConnected(_)) => ErrorCode::SessionNotConnected,
            AppError::Session(SessionError::InvalidPayload(_)) => ErrorCode::SessionInvalidPayload,
            AppError::Session(SessionError::AlreadyStarted(_)) => ErrorCode::SessionAlreadyStarted,
            AppError::Session(SessionError::InvalidTransition(_)) => {
                ErrorCode::SessionInvalidTransition
            }
            AppError::Session(SessionError::Transport(err)) => network_code(err),

            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// 获取用户友好的错误消息
    pub fn user_message(&self) -> String {
        match self.code() {
            ErrorCode::AudioDeviceUnavailable => {
                "Audio device is unavailable, check that it is connected and permitted".to_string()
            }
            ErrorCode::AudioStreamError => "Audio stream failed, please retry".to_string(),
            ErrorCode::AudioResampleFailed => "Audio processing failed".to_string(),
            ErrorCode::DecodeMalformed => "Received an invalid audio frame".to_string(),
            ErrorCode::DecodeEmptyAudio => "Received a frame without audio".to_string(),
            ErrorCode::PlaybackOutputFailed => "Audio output failed".to_string(),
            ErrorCode::NetworkConnectionFailed => {
                "Could not connect to the voice server".to_string()
            }
            ErrorCode::NetworkAuthFailed => "The server rejected the credentials".to_string(),
            ErrorCode::NetworkTimeout => "Connection to the voice server timed out".to_string(),
            ErrorCode::NetworkInvalidUrl => "The server address is invalid".to_string(),
            ErrorCode::ConfigLoadFailed => "Could not read the config file".to_string(),
            ErrorCode::ConfigInvalid => "The config file is not valid JSON".to_string(),
            ErrorCode::SessionNotConnected => "The session is not connected".to_string(),
            ErrorCode::SessionInvalidPayload => "The message is not valid JSON".to_string(),
            ErrorCode::SessionAlreadyStarted => "The session has already been started".to_string(),
            ErrorCode::SessionInvalidTransition => "Session state error".to_string(),
            ErrorCode::InternalError => match self {
                AppError::Internal(msg) => format!("Internal error: {}", msg),
                _ => "Internal error".to_string(),
            },
        }
    }

    /// 获取完整的错误上下文
    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new(self.code(), self.user_message())
            .with_detail(self.to_string());

        ctx.recovery_hint = self.recovery_hint();

        if !self.is_recoverable() {
            ctx = ctx.not_recoverable();
        }

        ctx
    }

    /// 获取恢复建议
    pub fn recovery_hint(&self) -> Option<String> {
        match self.code() {
            ErrorCode::AudioDeviceUnavailable => Some(
                "Connect a microphone or speaker and allow audio access in system settings"
                    .to_string(),
            ),
            ErrorCode::NetworkAuthFailed => {
                Some("Check the username and password in the config file".to_string())
            }
            ErrorCode::NetworkConnectionFailed | ErrorCode::NetworkTimeout => {
                Some("Check the server address and network connection, then reconnect".to_string())
            }
            ErrorCode::NetworkInvalidUrl => {
                Some("Use a ws:// or wss:// address for base_url or socket_url".to_string())
            }
            ErrorCode::ConfigInvalid => {
                Some("Fix or delete the config file to fall back to defaults".to_string())
            }
            ErrorCode::SessionAlreadyStarted => {
                Some("Create a new session to connect again".to_string())
            }
            _ => None,
        }
    }

    /// 检查错误是否可恢复
    ///
    /// 单帧错误与设备错误不影响会话；配置错误与内部错误需要人工处理
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self.code(),
            ErrorCode::ConfigLoadFailed
                | ErrorCode::ConfigInvalid
                | ErrorCode::NetworkInvalidUrl
                | ErrorCode::InternalError
        )
    }

    /// 检查是否是认证错误
    pub fn is_auth_error(&self) -> bool {
        self.code() == ErrorCode::NetworkAuthFailed
    }

    /// 检查是否是超时错误
    pub fn is_timeout(&self) -> bool {
        self.code() == ErrorCode::NetworkTimeout
    }
}

fn audio_code(err: &AudioError) -> ErrorCode {
    match err {
        AudioError::DeviceUnavailable(_) | AudioError::DeviceNotFound => {
            ErrorCode::AudioDeviceUnavailable
        }
        AudioError::ResampleFailed(_) => ErrorCode::AudioResampleFailed,
        _ => ErrorCode::AudioStreamError,
    }
}

fn network_code(err: &NetworkError) -> ErrorCode {
    match err {
        NetworkError::AuthenticationFailed => ErrorCode::NetworkAuthFailed,
        NetworkError::Timeout(_) => ErrorCode::NetworkTimeout,
        NetworkError::InvalidUrl(_) | NetworkError::InvalidConfig(_) => {
            ErrorCode::NetworkInvalidUrl
        }
        _ => ErrorCode::NetworkConnectionFailed,
    }
}

/// 应用结果类型
pub type AppResult<T> = Result<T, AppError>;

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
