//! 服务模块 - 处理器生命周期与服务启动

pub mod bootstrap;
pub mod processor;
pub mod wire;

pub use bootstrap::ApplicationBootstrap;
pub use processor::{OutboundProcessor, OutboundProcessorBuilder};
