//! 语音会话模块
//!
//! 把音频采集、帧编解码、播放调度和 WebSocket 连接组合成一次完整的双向语音会话
//!
//! # 工作流程
//!
//! ```text
//! 1. connect()
//!    └── State: Idle -> Connecting
//!
//! 2. WebSocket 建立
//!    └── State: Connecting -> Connected
//!    └── 打开播放输出，后台申请麦克风
//!
//! 3. 传输中
//!    └── 首条文本消息 {"type":"UID"} 设置 uid
//!    └── 二进制消息解码后进入播放调度
//!    └── 麦克风音频编码后按采集顺序发送
//!
//! 4. disconnect() / 服务端关闭 / 传输错误
//!    └── 停止采集，重置播放，关闭连接
//!    └── State: Connected -> Disconnected | Failed
//! ```

mod auth;
mod config;
mod controller;
mod driver;
mod error;
mod observer;

pub use auth::{Authorizer, BasicAuth, StaticAuth};
pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::{SessionError, SessionResult};
pub use observer::{StatusObserver, TracingObserver};
