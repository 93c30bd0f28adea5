//! 统一异常处理模块

use thiserror::Error;

/// 出站事件服务错误类型
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OutboundError {
    /// 配置错误（启动前致命）
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 传输连接错误（启动时致命）
    #[error("Connection error: {0}")]
    Connection(String),

    /// 设备缺少路由所需的标识（仅影响当前事件）
    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    /// 单条路由投递失败（不影响同一事件的其他路由）
    #[error("Delivery to route '{route}' failed: {reason}")]
    Delivery { route: String, reason: String },
}

impl OutboundError {
    pub fn delivery(route: impl Into<String>, reason: impl ToString) -> Self {
        OutboundError::Delivery {
            route: route.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OutboundError>;
