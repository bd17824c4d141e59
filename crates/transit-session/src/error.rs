//! # Session Error Types
//!
//! 会话构造错误。运行期的失败都以 `SessionEvent` 上报，不走这里。

use thiserror::Error;
use transit_config::ConfigError;

#[derive(Error, Debug)]
pub enum SessionError {
    /// 配置无效（如缺少 appletId）
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 不在 tokio runtime 中构造
    #[error("Session must be created inside a tokio runtime")]
    NoRuntime,
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
