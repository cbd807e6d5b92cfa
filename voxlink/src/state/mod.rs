//! 状态管理模块
//!
//! 提供会话状态机、状态管理与应用配置
//!
//! # 模块结构
//!
//! - `session_state` - 会话状态定义和状态管理器
//! - `error` - 状态相关错误类型
//! - `config` - 应用配置的加载与保存

pub mod config;
mod error;
mod session_state;

pub use error::{StateError, StateResult};
pub use session_state::{SessionState, StateManager};
