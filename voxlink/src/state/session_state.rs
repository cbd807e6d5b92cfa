use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::Serialize;
use tokio::sync::mpsc;

use super::error::{StateError, StateResult};

/// 会话生命周期状态
///
/// ```text
/// Idle -> Connecting -> Connected -> Disconnected
///   |         |             |
///   |         +-> Failed <--+
///   |         +-> Disconnected
///   +-> Disconnected
/// ```
///
/// `Disconnected` 与 `Failed` 为终止状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    /// 尚未连接
    Idle,

    /// 正在建立 WebSocket 连接
    Connecting,

    /// 已连接，音频双向传输中
    Connected,

    /// 已正常断开
    Disconnected,

    /// 连接失败或传输出错
    Failed,
}

impl SessionState {
    /// 检查是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }

    /// 检查是否已连接
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// 获取状态名称（用于日志和调试）
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Failed => "Failed",
        }
    }

    /// 验证状态转换是否合法
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, to),
            (Idle, Connecting)
                | (Idle, Disconnected)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Connected, Failed)
        )
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 状态管理器
///
/// 保存当前会话状态与服务端分配的 uid，读取无锁
pub struct StateManager {
    /// 当前状态（使用 ArcSwap 实现无锁读取）
    state: ArcSwap<SessionState>,

    /// 服务端分配的会话 uid
    uid: ArcSwapOption<String>,

    /// 状态变更监听器列表
    listeners: std::sync::Mutex<Vec<mpsc::Sender<SessionState>>>,
}

impl StateManager {
    /// 创建新的状态管理器
    ///
    /// # Examples
    ///
    /// ```
    /// use voxlink_lib::state::{SessionState, StateManager};
    ///
    /// let manager = StateManager::new();
    /// assert_eq!(manager.current(), SessionState::Idle);
    /// ```
    pub fn new() -> Self {
        Self {
            state: ArcSwap::new(Arc::new(SessionState::Idle)),
            uid: ArcSwapOption::empty(),
            listeners: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// 获取当前状态
    pub fn current(&self) -> SessionState {
        **self.state.load()
    }

    /// 转换到新状态
    ///
    /// 验证状态转换的合法性，如果合法则更新状态并通知所有监听者
    ///
    /// # Errors
    ///
    /// 如果状态转换不合法，返回 [`StateError::InvalidTransition`]
    ///
    /// # Examples
    ///
    /// ```
    /// use voxlink_lib::state::{SessionState, StateManager};
    ///
    /// let manager = StateManager::new();
    ///
    /// // 合法转换
    /// assert!(manager.transition(SessionState::Connecting).is_ok());
    ///
    /// // 非法转换
    /// assert!(manager.transition(SessionState::Idle).is_err());
    /// ```
    pub fn transition(&self, new_state: SessionState) -> StateResult<()> {
        let previous = self.state.rcu(|current| {
            if current.can_transition_to(new_state) {
                Arc::new(new_state)
            } else {
                Arc::clone(current)
            }
        });

        if !previous.can_transition_to(new_state) {
            return Err(StateError::InvalidTransition {
                from: *previous,
                to: new_state,
            });
        }

        tracing::debug!(from = %previous, to = %new_state, "Session state changed");
        self.notify_listeners(new_state);
        Ok(())
    }

    /// 获取服务端分配的 uid
    pub fn uid(&self) -> Option<String> {
        self.uid.load_full().map(|uid| (*uid).clone())
    }

    /// 设置 uid
    pub fn set_uid(&self, uid: impl Into<String>) {
        self.uid.store(Some(Arc::new(uid.into())));
    }

    /// 清除 uid
    pub fn clear_uid(&self) {
        self.uid.store(None);
    }

    /// 添加状态变更监听器
    ///
    /// 返回的接收器将接收之后的所有状态变更通知
    pub fn subscribe(&self) -> mpsc::Receiver<SessionState> {
        let (tx, rx) = mpsc::channel(32);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }

    /// 获取当前监听器数量（已关闭的会被清理）
    pub fn listener_count(&self) -> usize {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.retain(|tx| !tx.is_closed());
                listeners.len()
            }
            Err(_) => 0,
        }
    }

    /// 通知所有监听者状态变更
    ///
    /// 使用 try_send，监听者处理不及时会丢失通知
    fn notify_listeners(&self, new_state: SessionState) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|tx| !tx.is_closed());
            for listener in listeners.iter() {
                let _ = listener.try_send(new_state);
            }
        }
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
