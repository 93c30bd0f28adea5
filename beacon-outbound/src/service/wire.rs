//! Wire 风格的依赖注入：按依赖顺序构建出站服务组件

use std::sync::Arc;

use anyhow::{Context, Result};
use beacon_core::{BeaconAppConfig, OutboundMetrics};
use tracing::info;

use crate::config::{OutboundSettings, TransportKind};
use crate::domain::repository::ChannelConnector;
use crate::infrastructure::log_channel::LogConnector;
use crate::infrastructure::mqtt::MqttConnector;
use crate::service::processor::{OutboundProcessor, OutboundProcessorBuilder};

/// 应用上下文 - 包含所有已初始化的组件
pub struct ApplicationContext {
    pub settings: OutboundSettings,
    pub processor: OutboundProcessor,
    pub metrics: Arc<OutboundMetrics>,
}

/// 按传输方式选择连接器
pub fn connector_for(settings: &OutboundSettings) -> Box<dyn ChannelConnector> {
    match settings.transport {
        TransportKind::Mqtt => Box::new(MqttConnector::new(settings.mqtt.clone())),
        TransportKind::Log => Box::new(LogConnector),
    }
}

/// 构建应用上下文
pub async fn initialize(app_config: &BeaconAppConfig) -> Result<ApplicationContext> {
    // 1. 解析服务配置
    let settings = OutboundSettings::from_app_config(app_config)
        .context("invalid outbound service configuration")?;

    // 2. 指标
    let metrics = Arc::new(OutboundMetrics::new().context("failed to register metrics")?);

    // 3. 校验配置并连接传输通道
    let connector = connector_for(&settings);
    let processor = OutboundProcessorBuilder::new(settings.clone())
        .metrics(metrics.clone())
        .start(connector.as_ref())
        .await
        .context("failed to start outbound processor")?;

    info!(
        transport = ?settings.transport,
        workers = settings.workers,
        "outbound service initialized"
    );

    Ok(ApplicationContext {
        settings,
        processor,
        metrics,
    })
}
