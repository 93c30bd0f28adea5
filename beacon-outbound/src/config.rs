use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use beacon_core::{BeaconAppConfig, FilterConfig, MqttBrokerConfig, MulticastConfig};
use uuid::Uuid;

use crate::error::{OutboundError, Result};

const DEFAULT_BROKER_PROFILE: &str = "outbound";
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_EVENT_BUFFER: usize = 1024;

/// 传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Mqtt,
    /// 只记录日志，不实际发送
    Log,
}

impl FromStr for TransportKind {
    type Err = OutboundError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mqtt" => Ok(TransportKind::Mqtt),
            "log" => Ok(TransportKind::Log),
            other => Err(OutboundError::Configuration(format!(
                "unknown transport '{other}', expected 'mqtt' or 'log'"
            ))),
        }
    }
}

/// MQTT 连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
        }
    }
}

fn default_client_id() -> String {
    format!("beacon-outbound-{}", Uuid::new_v4().simple())
}

/// 出站事件服务运行配置
#[derive(Debug, Clone)]
pub struct OutboundSettings {
    pub transport: TransportKind,
    pub mqtt: MqttSettings,
    pub connect_timeout: Duration,
    /// 静态主题，未配置多播策略时使用
    pub topic: Option<String>,
    pub route_template: Option<String>,
    pub multicast: Option<MulticastConfig>,
    pub filters: Vec<FilterConfig>,
    pub groups: HashMap<String, Vec<String>>,
    pub workers: usize,
    pub event_buffer: usize,
}

impl Default for OutboundSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            mqtt: MqttSettings::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            topic: None,
            route_template: None,
            multicast: None,
            filters: Vec::new(),
            groups: HashMap::new(),
            workers: DEFAULT_WORKERS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl OutboundSettings {
    /// 从应用配置解析，环境变量优先
    pub fn from_app_config(app: &BeaconAppConfig) -> Result<Self> {
        Self::from_app_config_with_env(app, |key| env::var(key).ok())
    }

    pub(crate) fn from_app_config_with_env<F>(app: &BeaconAppConfig, env_var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let service = app.outbound_service();
        let broker_name = service.broker.as_deref().unwrap_or(DEFAULT_BROKER_PROFILE);
        let profile: MqttBrokerConfig = app.mqtt_profile(broker_name).cloned().unwrap_or_default();

        let transport = match env_var("BEACON_OUTBOUND_TRANSPORT").or(service.transport.clone()) {
            Some(value) => value.parse()?,
            None => TransportKind::default(),
        };

        let host = env_var("BEACON_OUTBOUND_MQTT_HOST")
            .or(profile.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match env_var("BEACON_OUTBOUND_MQTT_PORT") {
            Some(value) => parse_env("BEACON_OUTBOUND_MQTT_PORT", &value)?,
            None => profile.port.unwrap_or(DEFAULT_PORT),
        };

        let connect_timeout_secs = match env_var("BEACON_OUTBOUND_CONNECT_TIMEOUT_SECS") {
            Some(value) => parse_env("BEACON_OUTBOUND_CONNECT_TIMEOUT_SECS", &value)?,
            None => profile
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let workers = match env_var("BEACON_OUTBOUND_WORKERS") {
            Some(value) => parse_env("BEACON_OUTBOUND_WORKERS", &value)?,
            None => service.workers.unwrap_or(DEFAULT_WORKERS),
        };

        let topic = env_var("BEACON_OUTBOUND_TOPIC").or(service.topic);

        let client_id = match profile.client_id {
            Some(client_id) => validate_client_id(client_id)?,
            None => default_client_id(),
        };
        validate_credentials(profile.username.as_deref(), profile.password.as_deref())?;

        Ok(Self {
            transport,
            mqtt: MqttSettings {
                host,
                port,
                client_id,
                username: profile.username,
                password: profile.password,
                keep_alive: Duration::from_secs(
                    profile.keep_alive_secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS),
                ),
            },
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            topic,
            route_template: service.route_template,
            multicast: service.multicast,
            filters: service.filters,
            groups: service.groups,
            workers: workers.max(1),
            event_buffer: service.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER).max(1),
        })
    }

    /// 非空的静态主题
    pub fn static_topic(&self) -> Option<&str> {
        self.topic.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// rumqttc 拒绝空的或以空格开头的客户端标识
fn validate_client_id(client_id: String) -> Result<String> {
    if client_id.is_empty() || client_id.starts_with(' ') {
        return Err(OutboundError::Configuration(format!(
            "invalid mqtt client_id '{client_id}': must be non-empty and not start with a space"
        )));
    }
    Ok(client_id)
}

/// 用户名与密码必须同时配置
fn validate_credentials(username: Option<&str>, password: Option<&str>) -> Result<()> {
    match (username, password) {
        (Some(_), None) => Err(OutboundError::Configuration(
            "mqtt username is set without a password".to_string(),
        )),
        (None, Some(_)) => Err(OutboundError::Configuration(
            "mqtt password is set without a username".to_string(),
        )),
        _ => Ok(()),
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        OutboundError::Configuration(format!("invalid value '{value}' for {key}"))
    })
}
