//! Beacon Core 公共库
//!
//! 提供统一的配置加载、日志初始化和指标收集功能

pub mod config;
pub mod metrics;
pub mod tracing;

pub use config::{
    BeaconAppConfig, ConfigManager, FilterAttribute, FilterConfig, FilterOperation,
    LoggingConfig, MqttBrokerConfig, MulticastConfig, OutboundServiceConfig, ServicesConfig,
    load_config, load_config_from_source,
};
pub use metrics::OutboundMetrics;
