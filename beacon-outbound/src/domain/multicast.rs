//! 多播器：为一个事件计算零个或多个投递路由

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::model::{DeviceEvent, DeviceRef, Route};
use crate::domain::repository::DeviceGroupResolver;
use crate::domain::route::RouteBuilder;
use crate::error::Result;

/// 多播器
///
/// 返回的路由顺序即投递顺序；允许返回空列表（事件被丢弃，不视为错误）。
#[async_trait]
pub trait Multicaster: Send + Sync {
    async fn calculate_routes(
        &self,
        event: &DeviceEvent,
        route_builder: &dyn RouteBuilder,
    ) -> Result<Vec<Route>>;
}

/// 固定主题多播器
#[derive(Debug, Clone)]
pub struct FixedTopicMulticaster {
    routes: Vec<Route>,
}

impl FixedTopicMulticaster {
    pub fn new<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            routes: topics.into_iter().map(Route::new).collect(),
        }
    }
}

#[async_trait]
impl Multicaster for FixedTopicMulticaster {
    async fn calculate_routes(
        &self,
        _event: &DeviceEvent,
        _route_builder: &dyn RouteBuilder,
    ) -> Result<Vec<Route>> {
        Ok(self.routes.clone())
    }
}

/// 按来源设备生成单一路由
#[derive(Debug, Clone, Default)]
pub struct DeviceTopicMulticaster;

#[async_trait]
impl Multicaster for DeviceTopicMulticaster {
    async fn calculate_routes(
        &self,
        event: &DeviceEvent,
        route_builder: &dyn RouteBuilder,
    ) -> Result<Vec<Route>> {
        Ok(vec![route_builder.build(&event.device)?])
    }
}

/// 分组多播器：按设备分组展开，每个成员一条路由
pub struct GroupMulticaster {
    group: String,
    include_source: bool,
    resolver: Arc<dyn DeviceGroupResolver>,
}

impl GroupMulticaster {
    pub fn new(group: impl Into<String>, resolver: Arc<dyn DeviceGroupResolver>) -> Self {
        Self {
            group: group.into(),
            include_source: false,
            resolver,
        }
    }

    /// 同时投递给来源设备（排在分组成员之前）
    pub fn include_source(mut self, include: bool) -> Self {
        self.include_source = include;
        self
    }
}

#[async_trait]
impl Multicaster for GroupMulticaster {
    async fn calculate_routes(
        &self,
        event: &DeviceEvent,
        route_builder: &dyn RouteBuilder,
    ) -> Result<Vec<Route>> {
        let members: Vec<DeviceRef> = self.resolver.members(&self.group).await?;

        let mut routes = Vec::with_capacity(members.len() + usize::from(self.include_source));
        if self.include_source {
            routes.push(route_builder.build(&event.device)?);
        }
        for member in &members {
            routes.push(route_builder.build(member)?);
        }
        Ok(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{EventPayload, Location};
    use crate::domain::route::TemplateRouteBuilder;
    use crate::error::OutboundError;
    use crate::infrastructure::group_resolver::StaticGroupResolver;

    fn location_event(hardware_id: &str) -> DeviceEvent {
        DeviceEvent::new(
            "evt-1",
            DeviceRef::new(hardware_id),
            EventPayload::Location(Location {
                latitude: 33.75,
                longitude: -84.39,
                elevation: None,
            }),
        )
    }

    fn resolver() -> Arc<dyn DeviceGroupResolver> {
        Arc::new(StaticGroupResolver::from_hardware_ids([
            ("fleet-a", vec!["dev-2", "dev-3", "dev-2"]),
            ("broken", vec!["dev-4", ""]),
        ]))
    }

    #[tokio::test]
    async fn test_fixed_topics_ignore_device() {
        let multicaster = FixedTopicMulticaster::new(["events/all", "events/audit"]);
        let routes = multicaster
            .calculate_routes(&location_event(""), &TemplateRouteBuilder::default())
            .await
            .unwrap();
        assert_eq!(routes, vec![Route::from("events/all"), Route::from("events/audit")]);
    }

    #[tokio::test]
    async fn test_fixed_topics_may_be_empty() {
        let multicaster = FixedTopicMulticaster::new(Vec::<String>::new());
        let routes = multicaster
            .calculate_routes(&location_event("dev-1"), &TemplateRouteBuilder::default())
            .await
            .unwrap();
        assert!(routes.is_empty());
    }

    #[tokio::test]
    async fn test_device_topic_uses_route_builder() {
        let routes = DeviceTopicMulticaster
            .calculate_routes(&location_event("dev-123"), &TemplateRouteBuilder::default())
            .await
            .unwrap();
        assert_eq!(routes, vec![Route::from("/devices/dev-123")]);
    }

    #[tokio::test]
    async fn test_device_topic_rejects_device_without_identifier() {
        let err = DeviceTopicMulticaster
            .calculate_routes(&location_event(""), &TemplateRouteBuilder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OutboundError::InvalidDevice(_)));
    }

    #[tokio::test]
    async fn test_group_expansion_keeps_order_and_duplicates() {
        let multicaster = GroupMulticaster::new("fleet-a", resolver()).include_source(true);
        let routes = multicaster
            .calculate_routes(&location_event("dev-1"), &TemplateRouteBuilder::default())
            .await
            .unwrap();
        assert_eq!(
            routes,
            vec![
                Route::from("/devices/dev-1"),
                Route::from("/devices/dev-2"),
                Route::from("/devices/dev-3"),
                Route::from("/devices/dev-2"),
            ]
        );
    }

    #[tokio::test]
    async fn test_group_member_without_identifier_aborts_all_routes() {
        let multicaster = GroupMulticaster::new("broken", resolver());
        let err = multicaster
            .calculate_routes(&location_event("dev-1"), &TemplateRouteBuilder::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OutboundError::InvalidDevice(_)));
    }

    #[tokio::test]
    async fn test_multicaster_does_not_mutate_event() {
        let event = location_event("dev-1");
        let snapshot = event.clone();
        let multicaster = GroupMulticaster::new("fleet-a", resolver());
        multicaster
            .calculate_routes(&event, &TemplateRouteBuilder::default())
            .await
            .unwrap();
        assert_eq!(event, snapshot);
    }
}
