//! 基础设施层（传输与分组实现）

pub mod group_resolver;
pub mod log_channel;
pub mod mqtt;

pub use group_resolver::StaticGroupResolver;
pub use log_channel::{LogConnector, LogDeliveryChannel};
pub use mqtt::{MqttConnector, MqttDeliveryChannel};
