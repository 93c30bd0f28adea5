//! 基于配置的静态设备分组

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::model::DeviceRef;
use crate::domain::repository::DeviceGroupResolver;
use crate::error::{OutboundError, Result};

#[derive(Debug, Clone, Default)]
pub struct StaticGroupResolver {
    groups: HashMap<String, Vec<DeviceRef>>,
}

impl StaticGroupResolver {
    /// 从「分组名 -> 硬件 ID 列表」构建
    pub fn from_hardware_ids<I, K, V, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let groups = groups
            .into_iter()
            .map(|(name, ids)| {
                let members = ids.into_iter().map(DeviceRef::new).collect();
                (name.into(), members)
            })
            .collect();
        Self { groups }
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

#[async_trait]
impl DeviceGroupResolver for StaticGroupResolver {
    async fn members(&self, group: &str) -> Result<Vec<DeviceRef>> {
        self.groups
            .get(group)
            .cloned()
            .ok_or_else(|| OutboundError::Configuration(format!("unknown device group '{group}'")))
    }

    async fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_members_keep_configured_order() {
        let resolver =
            StaticGroupResolver::from_hardware_ids([("line-1", vec!["b", "a", "c"])]);
        let members = resolver.members("line-1").await.unwrap();
        let ids: Vec<_> = members.iter().filter_map(|d| d.hardware_id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_unknown_group() {
        let resolver = StaticGroupResolver::default();
        assert!(!resolver.contains("missing").await);
        assert!(matches!(
            resolver.members("missing").await,
            Err(OutboundError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_map() {
        let config = HashMap::from([("all".to_string(), vec!["x".to_string()])]);
        let resolver = StaticGroupResolver::from_hardware_ids(config);
        assert!(resolver.contains("all").await);
        assert_eq!(resolver.group_names().collect::<Vec<_>>(), vec!["all"]);
    }
}
