use std::time::Duration;

use crate::audio::CaptureConfig;
use crate::network::ConnectionConfig;
use crate::playback::{DEFAULT_MAX_BACKLOG, DEFAULT_SCHEDULE_DELAY};

/// 会话配置
///
/// 同一个控制器既可用于普通语音会话，也可用于语音代理会话，
/// 区别只在于连接地址与采集参数
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 连接配置（鉴权值在连接时由 `Authorizer` 填入）
    pub connection: ConnectionConfig,
    /// 采集配置
    pub capture: CaptureConfig,
    /// 是否启用麦克风采集（false 时仅接收）
    pub capture_enabled: bool,
    /// 输出设备名称（None 表示默认设备）
    pub output_device_id: Option<String>,
    /// 间隔后首个音频块的调度提前量
    pub schedule_delay: Duration,
    /// 待播放音频的上限（None 表示不限制）
    pub max_backlog: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            capture: CaptureConfig::default(),
            capture_enabled: true,
            output_device_id: None,
            schedule_delay: DEFAULT_SCHEDULE_DELAY,
            max_backlog: Some(DEFAULT_MAX_BACKLOG),
        }
    }
}

impl SessionConfig {
    /// 使用指定的服务地址创建配置
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig::new(base_url),
            ..Default::default()
        }
    }

    /// 创建仅接收（不采集麦克风）的配置
    pub fn receive_only(mut self) -> Self {
        self.capture_enabled = false;
        self
    }

    /// 直接指定完整的 socket 地址
    pub fn with_socket_url(mut self, socket_url: impl Into<String>) -> Self {
        self.connection = self.connection.with_socket_url(socket_url);
        self
    }

    /// 设置连接超时（毫秒，0 表示不限制）
    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connection = self.connection.with_timeout(timeout_ms);
        self
    }
}
