//! 出站处理器生命周期：校验配置 -> 建立连接 -> 分发 -> 断开

use std::sync::Arc;

use beacon_core::{MulticastConfig, OutboundMetrics};
use tracing::{Span, info, info_span, warn};

use crate::application::dispatcher::{DispatchTarget, OutboundDispatcher};
use crate::config::OutboundSettings;
use crate::domain::filter::{EventFilter, FilterChain};
use crate::domain::model::Route;
use crate::domain::multicast::{
    DeviceTopicMulticaster, FixedTopicMulticaster, GroupMulticaster, Multicaster,
};
use crate::domain::repository::{ChannelConnector, DeliveryChannel, DeviceGroupResolver};
use crate::domain::route::{DEFAULT_ROUTE_TEMPLATE, RouteBuilder, TemplateRouteBuilder};
use crate::error::{OutboundError, Result};
use crate::infrastructure::group_resolver::StaticGroupResolver;

/// 出站处理器构建器
pub struct OutboundProcessorBuilder {
    settings: OutboundSettings,
    route_builder: Option<Arc<dyn RouteBuilder>>,
    multicaster: Option<Arc<dyn Multicaster>>,
    extra_filters: Vec<Arc<dyn EventFilter>>,
    group_resolver: Option<Arc<dyn DeviceGroupResolver>>,
    metrics: Option<Arc<OutboundMetrics>>,
}

impl OutboundProcessorBuilder {
    pub fn new(settings: OutboundSettings) -> Self {
        Self {
            settings,
            route_builder: None,
            multicaster: None,
            extra_filters: Vec::new(),
            group_resolver: None,
            metrics: None,
        }
    }

    /// 替换基于模板的默认路由构建器
    pub fn route_builder(mut self, route_builder: Arc<dyn RouteBuilder>) -> Self {
        self.route_builder = Some(route_builder);
        self
    }

    /// 使用自定义多播器，忽略配置中的多播策略
    pub fn multicaster(mut self, multicaster: Arc<dyn Multicaster>) -> Self {
        self.multicaster = Some(multicaster);
        self
    }

    /// 追加过滤器（排在配置的过滤器之后）
    pub fn filter(mut self, filter: impl EventFilter + 'static) -> Self {
        self.extra_filters.push(Arc::new(filter));
        self
    }

    pub fn group_resolver(mut self, resolver: Arc<dyn DeviceGroupResolver>) -> Self {
        self.group_resolver = Some(resolver);
        self
    }

    pub fn metrics(mut self, metrics: Arc<OutboundMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn build_route_builder(&self) -> Result<Arc<dyn RouteBuilder>> {
        if let Some(route_builder) = &self.route_builder {
            return Ok(route_builder.clone());
        }
        let template = self
            .settings
            .route_template
            .as_deref()
            .unwrap_or(DEFAULT_ROUTE_TEMPLATE);
        Ok(Arc::new(TemplateRouteBuilder::parse(template)?))
    }

    async fn build_target(&self) -> Result<DispatchTarget> {
        if let Some(multicaster) = &self.multicaster {
            return Ok(DispatchTarget::Multicast(multicaster.clone()));
        }

        match &self.settings.multicast {
            Some(MulticastConfig::FixedTopics { topics }) => {
                if topics.is_empty() {
                    warn!("fixed_topics multicast has no topics, every event will be dropped");
                }
                Ok(DispatchTarget::Multicast(Arc::new(FixedTopicMulticaster::new(
                    topics.iter().cloned(),
                ))))
            }
            Some(MulticastConfig::DeviceTopic) => {
                Ok(DispatchTarget::Multicast(Arc::new(DeviceTopicMulticaster)))
            }
            Some(MulticastConfig::Group {
                group,
                include_source,
            }) => {
                let resolver: Arc<dyn DeviceGroupResolver> = match &self.group_resolver {
                    Some(resolver) => resolver.clone(),
                    None => Arc::new(StaticGroupResolver::from_hardware_ids(
                        self.settings.groups.clone(),
                    )),
                };
                if !resolver.contains(group).await {
                    return Err(OutboundError::Configuration(format!(
                        "multicast group '{group}' is not defined"
                    )));
                }
                Ok(DispatchTarget::Multicast(Arc::new(
                    GroupMulticaster::new(group.clone(), resolver).include_source(*include_source),
                )))
            }
            None => self
                .settings
                .static_topic()
                .map(|topic| DispatchTarget::Static(Route::new(topic)))
                .ok_or_else(|| {
                    OutboundError::Configuration(
                        "no destination topic or multicaster configured".to_string(),
                    )
                }),
        }
    }

    fn build_filters(&self) -> FilterChain {
        let mut filters = FilterChain::from_configs(&self.settings.filters);
        for filter in &self.extra_filters {
            filters.push(filter.clone());
        }
        filters
    }

    /// 校验配置并建立连接
    ///
    /// 配置错误在任何连接尝试之前返回；连接超时或失败返回 `Connection`。
    pub async fn start(self, connector: &dyn ChannelConnector) -> Result<OutboundProcessor> {
        let route_builder = self.build_route_builder()?;
        let target = self.build_target().await?;
        let filters = self.build_filters();

        let timeout = self.settings.connect_timeout;
        let channel = match tokio::time::timeout(timeout, connector.connect(timeout)).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(OutboundError::Connection(reason))) => {
                return Err(OutboundError::Connection(reason));
            }
            Ok(Err(other)) => return Err(OutboundError::Connection(other.to_string())),
            Err(_) => {
                return Err(OutboundError::Connection(format!(
                    "connect did not complete within {timeout:?}"
                )));
            }
        };

        let span = info_span!(
            "outbound_processor",
            transport = ?self.settings.transport,
            filters = filters.len()
        );
        let mut dispatcher =
            OutboundDispatcher::new(filters, target, route_builder, channel.clone())
                .with_span(span.clone());
        if let Some(metrics) = self.metrics {
            dispatcher = dispatcher.with_metrics(metrics);
        }

        span.in_scope(|| info!("outbound processor started"));

        Ok(OutboundProcessor {
            dispatcher: Arc::new(dispatcher),
            channel,
            span,
            stopped: false,
        })
    }
}

/// 运行中的出站处理器
pub struct OutboundProcessor {
    dispatcher: Arc<OutboundDispatcher>,
    channel: Arc<dyn DeliveryChannel>,
    span: Span,
    stopped: bool,
}

impl OutboundProcessor {
    pub fn dispatcher(&self) -> Arc<OutboundDispatcher> {
        self.dispatcher.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// 断开连接；失败只记录日志
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        match self.channel.disconnect().await {
            Ok(()) => self.span.in_scope(|| info!("outbound processor stopped")),
            Err(err) => self
                .span
                .in_scope(|| warn!(error = %err, "error disconnecting delivery channel")),
        }
    }
}

impl Drop for OutboundProcessor {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        let _entered = self.span.enter();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let channel = self.channel.clone();
                handle.spawn(async move {
                    if let Err(err) = channel.disconnect().await {
                        warn!(error = %err, "error disconnecting delivery channel on drop");
                    }
                });
            }
            Err(_) => warn!("processor dropped outside a tokio runtime, connection not closed"),
        }
    }
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod processor_test;
