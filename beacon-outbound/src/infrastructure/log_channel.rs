//! 日志传输：只记录将要发布的事件，不连接任何代理

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::model::{DeviceEvent, Route};
use crate::domain::repository::{ChannelConnector, DeliveryChannel};
use crate::error::{OutboundError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogConnector;

#[async_trait]
impl ChannelConnector for LogConnector {
    async fn connect(&self, _timeout: Duration) -> Result<Arc<dyn DeliveryChannel>> {
        info!("log transport selected, events will not leave this process");
        Ok(Arc::new(LogDeliveryChannel::default()))
    }
}

#[derive(Debug, Default)]
pub struct LogDeliveryChannel {
    published: AtomicU64,
}

impl LogDeliveryChannel {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl DeliveryChannel for LogDeliveryChannel {
    async fn publish(&self, event: &DeviceEvent, route: &Route) -> Result<()> {
        let payload = event
            .to_json_bytes()
            .map_err(|err| OutboundError::delivery(route.as_str(), err))?;
        self.published.fetch_add(1, Ordering::Relaxed);
        info!(
            event_id = %event.id,
            route = %route,
            bytes = payload.len(),
            "Publishing event to route (log transport)"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        debug!(published = self.published(), "log transport closed");
        Ok(())
    }
}
