//! 配置管理器 - 负责处理不同环境下的配置覆盖
//!
//! 该模块提供了配置管理功能，包括：
//! - 获取当前运行环境
//! - 加载环境特定配置并覆盖 MQTT 代理配置

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use toml::Value;

use super::{BeaconAppConfig, MqttBrokerConfig, merge_value};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取当前环境名称
    ///
    /// 从环境变量 BEACON_ENV 获取当前环境名称，
    /// 如果未设置则默认为 "development"
    pub fn get_environment() -> String {
        env::var("BEACON_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 根据环境加载特定配置
    ///
    /// 加载 `{config_root}/environments/{environment}.toml` 文件中的配置，
    /// 并将其中的 `[mqtt.*]` 条目合并到基础配置中
    pub fn load_environment_config(
        base_config: &mut BeaconAppConfig,
        config_root: &Path,
    ) -> Result<()> {
        let path = Self::environment_file(config_root, &Self::get_environment());
        Self::apply_environment_file(base_config, &path)
    }

    /// 配置源对应的配置根目录：目录源即自身，文件源取所在目录
    pub fn config_root(source: &Path) -> PathBuf {
        if source.is_dir() {
            return source.to_path_buf();
        }
        match source.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// 环境覆盖文件路径
    pub fn environment_file(config_root: &Path, environment: &str) -> PathBuf {
        config_root
            .join("environments")
            .join(format!("{environment}.toml"))
    }

    /// 从指定文件应用环境配置（文件不存在时忽略）
    pub fn apply_environment_file(base_config: &mut BeaconAppConfig, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read environment config: {}", path.display()))?;
        let env_config: Value = toml::from_str(&content)
            .with_context(|| format!("invalid environment config format: {}", path.display()))?;

        Self::merge_mqtt_profiles(base_config, &env_config)
    }

    /// 合并 MQTT 代理配置
    ///
    /// 已存在的配置按字段覆盖，不存在的配置直接新增
    fn merge_mqtt_profiles(base_config: &mut BeaconAppConfig, env_config: &Value) -> Result<()> {
        let Some(tables) = env_config.get("mqtt").and_then(|v| v.as_table()) else {
            return Ok(());
        };

        for (name, overlay) in tables {
            let mut merged = match base_config.mqtt.get(name) {
                Some(existing) => profile_to_value(existing),
                None => Value::Table(Default::default()),
            };
            merge_value(&mut merged, overlay.clone());
            let profile: MqttBrokerConfig = merged
                .try_into()
                .with_context(|| format!("invalid mqtt profile override: {}", name))?;
            base_config.mqtt.insert(name.clone(), profile);
        }

        Ok(())
    }
}

fn profile_to_value(profile: &MqttBrokerConfig) -> Value {
    let mut table = toml::map::Map::new();
    if let Some(host) = &profile.host {
        table.insert("host".into(), Value::String(host.clone()));
    }
    if let Some(port) = profile.port {
        table.insert("port".into(), Value::Integer(i64::from(port)));
    }
    if let Some(client_id) = &profile.client_id {
        table.insert("client_id".into(), Value::String(client_id.clone()));
    }
    if let Some(username) = &profile.username {
        table.insert("username".into(), Value::String(username.clone()));
    }
    if let Some(password) = &profile.password {
        table.insert("password".into(), Value::String(password.clone()));
    }
    if let Some(keep_alive) = profile.keep_alive_secs {
        table.insert("keep_alive_secs".into(), Value::Integer(keep_alive as i64));
    }
    if let Some(timeout) = profile.connect_timeout_secs {
        table.insert("connect_timeout_secs".into(), Value::Integer(timeout as i64));
    }
    Value::Table(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_overrides_existing_profile() {
        let mut cfg: BeaconAppConfig =
            toml::from_str("[mqtt.primary]\nhost = \"localhost\"\nport = 1883\n").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("production.toml");
        fs::write(&path, "[mqtt.primary]\nhost = \"mqtt.prod\"\n\n[mqtt.backup]\nport = 2883\n")
            .unwrap();

        ConfigManager::apply_environment_file(&mut cfg, &path).unwrap();

        let primary = cfg.mqtt_profile("primary").unwrap();
        assert_eq!(primary.host.as_deref(), Some("mqtt.prod"));
        assert_eq!(primary.port, Some(1883));

        let backup = cfg.mqtt_profile("backup").unwrap();
        assert_eq!(backup.port, Some(2883));
        assert!(backup.host.is_none());
    }

    #[test]
    fn test_environment_file_follows_config_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("beacon.toml");
        fs::write(&file, "").unwrap();

        assert_eq!(ConfigManager::config_root(dir.path()), dir.path());
        assert_eq!(ConfigManager::config_root(&file), dir.path());
        assert_eq!(ConfigManager::config_root(Path::new("beacon.toml")), Path::new("."));
        assert_eq!(
            ConfigManager::environment_file(Path::new("/etc/beacon"), "production"),
            Path::new("/etc/beacon/environments/production.toml")
        );
    }

    #[test]
    fn test_missing_environment_file_is_ignored() {
        let mut cfg = BeaconAppConfig::default();
        ConfigManager::apply_environment_file(&mut cfg, Path::new("/nonexistent/env.toml"))
            .unwrap();
        assert!(cfg.mqtt.is_empty());
    }
}
