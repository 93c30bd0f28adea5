//! 应用层（事件分发编排）

pub mod dispatcher;

pub use dispatcher::{DispatchTarget, OutboundDispatcher};
