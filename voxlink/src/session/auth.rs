//! 连接鉴权
//!
//! 鉴权值以 `authorization` 查询参数的形式附加到 WebSocket 地址上

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// 鉴权值提供者
///
/// 返回的字符串对会话来说是不透明的，原样放入查询参数
pub trait Authorizer: Send + Sync {
    /// 生成鉴权值
    fn authorization(&self) -> String;
}

/// HTTP Basic 鉴权：`Basic base64(username:password)`
///
/// # Examples
///
/// ```
/// use voxlink_lib::session::{Authorizer, BasicAuth};
///
/// let auth = BasicAuth::new("user", "pass");
/// assert_eq!(auth.authorization(), "Basic dXNlcjpwYXNz");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    username: String,
    password: String,
}

impl BasicAuth {
    /// 使用用户名和密码创建
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// 用户名
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Authorizer for BasicAuth {
    fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

// 不在日志中输出密码
impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// 预先计算好的鉴权值（例如令牌）
#[derive(Clone)]
pub struct StaticAuth(pub String);

impl Authorizer for StaticAuth {
    fn authorization(&self) -> String {
        self.0.clone()
    }
}
