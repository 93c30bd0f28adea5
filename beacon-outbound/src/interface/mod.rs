//! 接口层（事件输入与消费运行时）

pub mod runtime;
pub mod source;

pub use runtime::{ConsumerHandle, ConsumerSummary, EventConsumer};
pub use source::JsonLinesSource;
