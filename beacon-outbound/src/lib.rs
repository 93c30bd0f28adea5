pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interface;
pub mod service;

pub use application::{DispatchTarget, OutboundDispatcher};
pub use config::{MqttSettings, OutboundSettings, TransportKind};
pub use error::{OutboundError, Result};
pub use service::{ApplicationBootstrap, OutboundProcessor, OutboundProcessorBuilder};
