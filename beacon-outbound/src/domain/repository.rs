//! 仓储接口（Port）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::model::{DeviceEvent, DeviceRef, Route};
use crate::error::Result;

/// 投递通道（Repository）
///
/// 每次调用只尝试一次，不自动重试；实现必须允许多个路由共享同一连接并发调用。
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// 将序列化后的事件发布到指定路由
    async fn publish(&self, event: &DeviceEvent, route: &Route) -> Result<()>;

    /// 释放底层连接
    async fn disconnect(&self) -> Result<()>;
}

/// 投递通道连接器，启动时建立唯一的共享连接
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self, timeout: Duration) -> Result<Arc<dyn DeliveryChannel>>;
}

/// 设备分组解析器（Repository）
#[async_trait]
pub trait DeviceGroupResolver: Send + Sync {
    /// 返回分组成员，顺序即投递顺序
    async fn members(&self, group: &str) -> Result<Vec<DeviceRef>>;

    /// 分组是否存在（用于启动时校验配置）
    async fn contains(&self, group: &str) -> bool;
}
