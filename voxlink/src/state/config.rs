//! 应用配置模块
//!
//! 提供客户端配置的加载、保存，以及到 [`SessionConfig`] 的转换
//!
//! # 配置存储位置
//!
//! - Windows: `%APPDATA%/Voxlink/config/config.json`
//! - macOS: `~/Library/Application Support/com.voxlink.voxlink/config.json`
//! - Linux: `~/.config/voxlink/config.json`
//!
//! 环境变量 `VOXLINK_CONFIG` 可以指定其他路径。
//!
//! # 使用示例
//!
//! ```no_run
//! use voxlink_lib::state::config::ConfigManager;
//!
//! let path = ConfigManager::resolve_path(None).unwrap();
//! let config = ConfigManager::load(&path).unwrap();
//! let session = config.session_config();
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::CaptureConfig;
use crate::network::ConnectionConfig;
use crate::session::{BasicAuth, SessionConfig};

/// 覆盖配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "VOXLINK_CONFIG";

/// 配置文件名
const CONFIG_FILE_NAME: &str = "config.json";

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 路径错误
    #[error("Path error: {0}")]
    Path(String),
}

/// 配置结果类型
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 应用配置
///
/// 缺失的字段使用默认值填充
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务端配置
    pub server: ServerConfig,
    /// 音频配置
    pub audio: AudioConfig,
    /// 播放配置
    pub playback: PlaybackConfig,
}

/// 服务端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub base_url: String,
    /// 完整的 socket 地址（设置后忽略 base_url、path 与鉴权）
    pub socket_url: Option<String>,
    /// 语音接口路径
    pub path: String,
    /// 用户名
    pub username: String,
    /// 密码
    pub password: String,
    /// 连接超时（毫秒，0 表示不限制）
    pub connect_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let connection = ConnectionConfig::default();
        Self {
            base_url: connection.base_url,
            socket_url: None,
            path: connection.path,
            username: String::new(),
            password: String::new(),
            connect_timeout_ms: connection.timeout_ms,
        }
    }
}

/// 音频配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// 会话采样率
    pub sample_rate: u32,
    /// 会话声道数
    pub num_channels: u16,
    /// 每帧的单声道采样数
    pub buffer_size: usize,
    /// 输入设备名称（None 表示默认设备）
    pub input_device_id: Option<String>,
    /// 输出设备名称（None 表示默认设备）
    pub output_device_id: Option<String>,
    /// 回声消除
    pub echo_cancellation: bool,
    /// 噪声抑制
    pub noise_suppression: bool,
    /// 自动增益
    pub auto_gain_control: bool,
    /// 是否采集麦克风
    pub capture_enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        Self {
            sample_rate: capture.sample_rate,
            num_channels: capture.num_channels,
            buffer_size: capture.buffer_size,
            input_device_id: None,
            output_device_id: None,
            echo_cancellation: capture.echo_cancellation,
            noise_suppression: capture.noise_suppression,
            auto_gain_control: capture.auto_gain_control,
            capture_enabled: true,
        }
    }
}

/// 播放配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// 间隔后首个音频块的调度提前量（毫秒）
    pub schedule_delay_ms: u64,
    /// 待播放音频上限（毫秒，0 表示不限制）
    pub max_backlog_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            schedule_delay_ms: 50,
            max_backlog_ms: 5000,
        }
    }
}

impl AppConfig {
    /// 转换为会话配置
    pub fn session_config(&self) -> SessionConfig {
        let server = &self.server;
        let audio = &self.audio;

        let mut connection = ConnectionConfig::new(server.base_url.clone())
            .with_path(server.path.clone())
            .with_timeout(server.connect_timeout_ms);
        if let Some(socket_url) = &server.socket_url {
            connection = connection.with_socket_url(socket_url.clone());
        }

        let capture = CaptureConfig {
            device_id: audio.input_device_id.clone(),
            sample_rate: audio.sample_rate,
            num_channels: audio.num_channels,
            buffer_size: audio.buffer_size,
            echo_cancellation: audio.echo_cancellation,
            noise_suppression: audio.noise_suppression,
            auto_gain_control: audio.auto_gain_control,
        };

        let max_backlog = match self.playback.max_backlog_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        SessionConfig {
            connection,
            capture,
            capture_enabled: audio.capture_enabled,
            output_device_id: audio.output_device_id.clone(),
            schedule_delay: Duration::from_millis(self.playback.schedule_delay_ms),
            max_backlog,
        }
    }

    /// 使用配置中的用户名和密码创建鉴权
    pub fn basic_auth(&self) -> BasicAuth {
        BasicAuth::new(&self.server.username, &self.server.password)
    }
}

/// 配置管理器
///
/// 提供配置的加载、保存和路径解析
pub struct ConfigManager;

impl ConfigManager {
    /// 加载配置
    ///
    /// 文件不存在时返回默认配置
    pub fn load(path: &Path) -> ConfigResult<AppConfig> {
        tracing::debug!(path = %path.display(), "Loading config");

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AppConfig = serde_json::from_str(&content)?;
            tracing::info!(path = %path.display(), "Config loaded successfully");
            Ok(config)
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// 保存配置
    ///
    /// 目录不存在时自动创建
    pub fn save(path: &Path, config: &AppConfig) -> ConfigResult<()> {
        tracing::debug!(path = %path.display(), "Saving config");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Config saved successfully");
        Ok(())
    }

    /// 平台默认的配置文件路径
    pub fn default_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "voxlink", "voxlink")
            .ok_or_else(|| ConfigError::Path("No home directory found".to_string()))?;

        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// 解析配置文件路径
    ///
    /// 优先使用显式指定的路径，否则使用平台默认路径
    pub fn resolve_path(override_path: Option<PathBuf>) -> ConfigResult<PathBuf> {
        match override_path {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Self::default_path(),
        }
    }

    /// 从 `VOXLINK_CONFIG` 或平台默认位置解析路径
    pub fn path_from_env() -> ConfigResult<PathBuf> {
        Self::resolve_path(std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
    }
}
