//! Beacon Core 配置模块
//!
//! 该模块提供了应用程序配置管理功能，包括：
//! - 配置文件加载和解析（单文件或分片目录）
//! - 环境特定配置覆盖
//! - MQTT 代理、日志以及出站服务配置定义

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use toml::Value;
use tracing::warn;

mod manager;
pub use manager::ConfigManager;

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（未设置 RUST_LOG 时生效）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 是否输出 target
    #[serde(default)]
    pub with_target: bool,
    /// 是否输出线程 ID
    #[serde(default)]
    pub with_thread_ids: bool,
    /// 是否输出文件名
    #[serde(default)]
    pub with_file: bool,
    /// 是否输出行号
    #[serde(default)]
    pub with_line_number: bool,
    /// 是否使用 JSON 格式输出
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            with_target: false,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
            json: false,
        }
    }
}

/// MQTT 代理配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MqttBrokerConfig {
    /// 代理主机名
    #[serde(default)]
    pub host: Option<String>,
    /// 代理端口
    #[serde(default)]
    pub port: Option<u16>,
    /// 客户端标识
    #[serde(default)]
    pub client_id: Option<String>,
    /// 用户名
    #[serde(default)]
    pub username: Option<String>,
    /// 密码
    #[serde(default)]
    pub password: Option<String>,
    /// 心跳间隔（秒）
    #[serde(default)]
    pub keep_alive_secs: Option<u64>,
    /// 连接超时（秒）
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

/// 多播策略配置
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MulticastConfig {
    /// 固定主题列表
    FixedTopics {
        #[serde(default)]
        topics: Vec<String>,
    },
    /// 按来源设备生成主题
    DeviceTopic,
    /// 按设备分组展开
    Group {
        group: String,
        #[serde(default)]
        include_source: bool,
    },
}

/// 过滤属性
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterAttribute {
    EventKind,
    Site,
    Specification,
    HardwareId,
}

/// 过滤操作
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperation {
    /// 仅放行匹配的事件
    #[default]
    Include,
    /// 丢弃匹配的事件
    Exclude,
}

/// 事件过滤器配置
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FilterConfig {
    pub attribute: FilterAttribute,
    #[serde(default)]
    pub operation: FilterOperation,
    #[serde(default)]
    pub values: Vec<String>,
}

/// 出站事件服务配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OutboundServiceConfig {
    /// MQTT 代理配置名称
    #[serde(default)]
    pub broker: Option<String>,
    /// 传输方式：mqtt | log
    #[serde(default)]
    pub transport: Option<String>,
    /// 静态主题（未配置多播策略时使用）
    #[serde(default)]
    pub topic: Option<String>,
    /// 路由模板
    #[serde(default)]
    pub route_template: Option<String>,
    /// 多播策略
    #[serde(default)]
    pub multicast: Option<MulticastConfig>,
    /// 过滤器列表
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    /// 设备分组（分组名 -> 硬件 ID 列表）
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,
    /// 分发工作协程数量
    #[serde(default)]
    pub workers: Option<usize>,
    /// 事件缓冲区容量
    #[serde(default)]
    pub event_buffer: Option<usize>,
}

/// 服务配置集合
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServicesConfig {
    /// 出站事件服务配置
    #[serde(default)]
    pub outbound: Option<OutboundServiceConfig>,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BeaconAppConfig {
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
    /// MQTT 代理配置（名称 -> 配置）
    #[serde(default)]
    pub mqtt: HashMap<String, MqttBrokerConfig>,
    /// 服务配置
    #[serde(default)]
    pub services: ServicesConfig,
}

impl BeaconAppConfig {
    /// 获取 MQTT 代理配置
    pub fn mqtt_profile(&self, name: &str) -> Option<&MqttBrokerConfig> {
        self.mqtt.get(name)
    }

    /// 获取出站事件服务配置
    pub fn outbound_service(&self) -> OutboundServiceConfig {
        self.services.outbound.clone().unwrap_or_default()
    }
}

/// 加载配置
///
/// 未指定路径时依次尝试 `config` 目录与 `config.toml` 文件，
/// 全部失败则回退到默认配置。
pub fn load_config(path: Option<&str>) -> BeaconAppConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![PathBuf::from("config"), PathBuf::from("config.toml")],
    };

    let (mut cfg, source) = load_with_fallback(&candidates);
    let config_root = source
        .as_deref()
        .map(ConfigManager::config_root)
        .unwrap_or_else(|| PathBuf::from("config"));
    if let Err(e) = ConfigManager::load_environment_config(&mut cfg, &config_root) {
        warn!("failed to load environment config: {e:#}");
    }
    cfg
}

/// 使用备选方案加载配置，同时返回成功加载的配置源
fn load_with_fallback(candidates: &[PathBuf]) -> (BeaconAppConfig, Option<PathBuf>) {
    for path in candidates {
        match load_config_from_source(path) {
            Ok(cfg) => return (cfg, Some(path.clone())),
            Err(err) => {
                warn!("failed to load config from {}: {err:#}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    (BeaconAppConfig::default(), None)
}

/// 从源加载配置
pub fn load_config_from_source(path: &Path) -> Result<BeaconAppConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        load_config_from_directory(path)
    } else {
        load_config_from_file(path)
    }
}

/// 从文件加载配置
fn load_config_from_file(path: &Path) -> Result<BeaconAppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config format: {}", path.display()))
}

/// 从目录加载配置
fn load_config_from_directory(path: &Path) -> Result<BeaconAppConfig> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;

    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("shared"))?;
    merge_directory(&mut merged, &path.join("services"))?;
    merge_directory(&mut merged, &path.join("overrides"))?;

    merged
        .try_into()
        .with_context(|| format!("invalid configuration after merging {}", path.display()))
}

/// 合并目录中的配置
fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

/// 加载 TOML 值
fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))
}

/// 合并值（表递归合并，其余类型整体覆盖）
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[logging]
level = "debug"

[mqtt.primary]
host = "broker.local"
port = 8883
username = "beacon"
password = "secret"

[services.outbound]
broker = "primary"
route_template = "/sites/{site_token}/devices/{hardware_id}"
workers = 2

[services.outbound.multicast]
strategy = "group"
group = "fleet-a"
include_source = true

[[services.outbound.filters]]
attribute = "event_kind"
operation = "exclude"
values = ["location"]

[services.outbound.groups]
fleet-a = ["dev-1", "dev-2"]
"#;

    #[test]
    fn test_parse_full_config() {
        let cfg: BeaconAppConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.logging.level, "debug");

        let broker = cfg.mqtt_profile("primary").unwrap();
        assert_eq!(broker.host.as_deref(), Some("broker.local"));
        assert_eq!(broker.port, Some(8883));

        let outbound = cfg.outbound_service();
        assert_eq!(outbound.broker.as_deref(), Some("primary"));
        assert_eq!(outbound.workers, Some(2));
        assert_eq!(
            outbound.multicast,
            Some(MulticastConfig::Group {
                group: "fleet-a".to_string(),
                include_source: true,
            })
        );
        assert_eq!(outbound.filters.len(), 1);
        assert_eq!(outbound.filters[0].attribute, FilterAttribute::EventKind);
        assert_eq!(outbound.filters[0].operation, FilterOperation::Exclude);
        assert_eq!(outbound.groups["fleet-a"], vec!["dev-1", "dev-2"]);
    }

    #[test]
    fn test_missing_outbound_section_uses_defaults() {
        let cfg: BeaconAppConfig = toml::from_str("").unwrap();
        let outbound = cfg.outbound_service();
        assert!(outbound.topic.is_none());
        assert!(outbound.multicast.is_none());
        assert!(outbound.filters.is_empty());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_load_from_directory_merges_fragments() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("base.toml"),
            "[mqtt.primary]\nhost = \"base-host\"\nport = 1883\n",
        )
        .unwrap();
        fs::create_dir(dir.path().join("overrides")).unwrap();
        fs::write(
            dir.path().join("overrides").join("10-host.toml"),
            "[mqtt.primary]\nhost = \"override-host\"\n",
        )
        .unwrap();

        let cfg = load_config_from_source(dir.path()).unwrap();
        let broker = cfg.mqtt_profile("primary").unwrap();
        assert_eq!(broker.host.as_deref(), Some("override-host"));
        assert_eq!(broker.port, Some(1883));
    }

    #[test]
    fn test_directory_without_base_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config_from_source(dir.path()).is_err());
    }

    #[test]
    fn test_missing_path_falls_back_to_defaults() {
        let (cfg, source) = load_with_fallback(&[PathBuf::from("/nonexistent/beacon.toml")]);
        assert!(cfg.mqtt.is_empty());
        assert!(source.is_none());
    }

    #[test]
    fn test_environment_overlay_is_read_next_to_config_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("beacon.toml");
        fs::write(&file, "[mqtt.primary]\nhost = \"localhost\"\nport = 1883\n").unwrap();
        fs::create_dir(dir.path().join("environments")).unwrap();
        let environment = ConfigManager::get_environment();
        fs::write(
            dir.path()
                .join("environments")
                .join(format!("{environment}.toml")),
            "[mqtt.primary]\nhost = \"mqtt.overlay\"\n",
        )
        .unwrap();

        let cfg = load_config(file.to_str());

        let primary = cfg.mqtt_profile("primary").unwrap();
        assert_eq!(primary.host.as_deref(), Some("mqtt.overlay"));
        assert_eq!(primary.port, Some(1883));
    }
}
