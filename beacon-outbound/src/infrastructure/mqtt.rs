//! MQTT 投递通道（rumqttc）
//!
//! 启动时建立唯一连接并等待 CONNACK；连接成功后由后台任务驱动事件循环，
//! 传输错误只记录日志，由客户端自行重连。

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MqttSettings;
use crate::domain::model::{DeviceEvent, Route};
use crate::domain::repository::{ChannelConnector, DeliveryChannel};
use crate::error::{OutboundError, Result};

const REQUEST_CHANNEL_CAPACITY: usize = 64;
const RECONNECT_BACKOFF: Duration = Duration::from_millis(250);
const DRIVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// MQTT 连接器
#[derive(Debug, Clone)]
pub struct MqttConnector {
    settings: MqttSettings,
}

impl MqttConnector {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.settings.client_id.clone(),
            self.settings.host.clone(),
            self.settings.port,
        );
        // rumqttc 不接受小于 1 秒的非零心跳
        let keep_alive = if self.settings.keep_alive.is_zero() {
            Duration::ZERO
        } else {
            self.settings.keep_alive.max(Duration::from_secs(1))
        };
        options.set_keep_alive(keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &self.settings.username {
            let password = self.settings.password.clone().unwrap_or_default();
            options.set_credentials(username.clone(), password);
        }
        options
    }

    fn broker_addr(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }
}

/// 轮询事件循环直到收到 CONNACK
async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(OutboundError::Connection(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(event) => debug!(?event, "mqtt event before connack"),
            Err(err) => return Err(OutboundError::Connection(err.to_string())),
        }
    }
}

#[async_trait]
impl ChannelConnector for MqttConnector {
    async fn connect(&self, timeout: Duration) -> Result<Arc<dyn DeliveryChannel>> {
        let addr = self.broker_addr();
        let client_id = &self.settings.client_id;
        if client_id.is_empty() || client_id.starts_with(' ') {
            return Err(OutboundError::Configuration(format!(
                "invalid mqtt client_id '{client_id}'"
            )));
        }
        info!(broker = %addr, client_id = %client_id, "connecting to MQTT broker");

        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CHANNEL_CAPACITY);

        match tokio::time::timeout(timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(OutboundError::Connection(format!(
                    "failed to connect to {addr}: {err}"
                )));
            }
            Err(_) => {
                return Err(OutboundError::Connection(format!(
                    "timed out after {timeout:?} connecting to {addr}"
                )));
            }
        }

        info!(broker = %addr, "connected to MQTT broker");

        let stopping = Arc::new(AtomicBool::new(false));
        let driver = tokio::spawn(drive_event_loop(eventloop, stopping.clone()));

        Ok(Arc::new(MqttDeliveryChannel {
            client,
            stopping,
            driver: Mutex::new(Some(driver)),
        }))
    }
}

async fn drive_event_loop(mut eventloop: EventLoop, stopping: Arc<AtomicBool>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("mqtt disconnect sent, stopping event loop");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                if stopping.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %err, "mqtt connection error, retrying");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }
}

/// 共享 MQTT 连接上的投递通道
pub struct MqttDeliveryChannel {
    client: AsyncClient,
    stopping: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl DeliveryChannel for MqttDeliveryChannel {
    async fn publish(&self, event: &DeviceEvent, route: &Route) -> Result<()> {
        let payload = event
            .to_json_bytes()
            .map_err(|err| OutboundError::delivery(route.as_str(), err))?;

        debug!(event_id = %event.id, route = %route, "Publishing event to route");

        self.client
            .publish(route.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| OutboundError::delivery(route.as_str(), err))
    }

    async fn disconnect(&self) -> Result<()> {
        self.stopping.store(true, Ordering::Release);
        let sent = self.client.disconnect().await;

        let driver = self.driver.lock().ok().and_then(|mut guard| guard.take());
        if let Some(mut handle) = driver {
            if tokio::time::timeout(DRIVER_SHUTDOWN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("mqtt event loop did not stop in time, aborting");
                handle.abort();
            }
        }

        sent.map_err(|err| OutboundError::Connection(format!("failed to disconnect: {err}")))
    }
}

impl Drop for MqttDeliveryChannel {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.driver.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}
