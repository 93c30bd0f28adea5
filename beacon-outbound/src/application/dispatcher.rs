//! 出站分发器 - 过滤 -> 多播 -> 逐路由投递
//!
//! 单个事件的状态：`Filtered`（终态，无任何副作用）或
//! `Accepted -> 计算路由 -> 逐条投递 -> Done`。
//! 单条路由失败只记录日志，不中断同一事件的其余路由，也不回传给事件生产方。

use std::sync::Arc;
use std::time::Instant;

use beacon_core::OutboundMetrics;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::domain::filter::FilterChain;
use crate::domain::model::{DeliveryOutcome, DeviceEvent, DispatchReport, Route};
use crate::domain::multicast::Multicaster;
use crate::domain::repository::DeliveryChannel;
use crate::domain::route::RouteBuilder;

/// 投递目标：静态路由或多播器
#[derive(Clone)]
pub enum DispatchTarget {
    Static(Route),
    Multicast(Arc<dyn Multicaster>),
}

/// 出站分发器
pub struct OutboundDispatcher {
    filters: FilterChain,
    target: DispatchTarget,
    route_builder: Arc<dyn RouteBuilder>,
    channel: Arc<dyn DeliveryChannel>,
    metrics: Option<Arc<OutboundMetrics>>,
    span: Span,
}

impl OutboundDispatcher {
    pub fn new(
        filters: FilterChain,
        target: DispatchTarget,
        route_builder: Arc<dyn RouteBuilder>,
        channel: Arc<dyn DeliveryChannel>,
    ) -> Self {
        Self {
            filters,
            target,
            route_builder,
            channel,
            metrics: None,
            span: info_span!("outbound_dispatcher"),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<OutboundMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// 使用调用方提供的 span 作为组件日志上下文
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// 分发单个事件
    pub async fn dispatch(&self, event: &DeviceEvent) -> DispatchReport {
        let span = tracing::info_span!(
            parent: &self.span,
            "dispatch",
            event_id = %event.id,
            kind = %event.kind()
        );
        self.dispatch_inner(event).instrument(span).await
    }

    async fn dispatch_inner(&self, event: &DeviceEvent) -> DispatchReport {
        let kind = event.kind().as_str();
        if let Some(metrics) = &self.metrics {
            metrics.events_total.with_label_values(&[kind]).inc();
        }

        if let Some(filter) = self.filters.rejected_by(event) {
            debug!(filter = %filter, "event filtered");
            if let Some(metrics) = &self.metrics {
                metrics.events_filtered_total.with_label_values(&[kind]).inc();
            }
            return DispatchReport::Filtered;
        }

        let routes = match &self.target {
            DispatchTarget::Static(route) => vec![route.clone()],
            DispatchTarget::Multicast(multicaster) => {
                match multicaster
                    .calculate_routes(event, self.route_builder.as_ref())
                    .await
                {
                    Ok(routes) => routes,
                    Err(err) => {
                        error!(error = %err, "failed to calculate routes, event dropped");
                        if let Some(metrics) = &self.metrics {
                            metrics.route_failures_total.inc();
                        }
                        return DispatchReport::Done {
                            outcomes: Vec::new(),
                            route_error: Some(err.to_string()),
                        };
                    }
                }
            }
        };

        if routes.is_empty() {
            debug!("multicaster returned no routes");
        }

        let mut outcomes = Vec::with_capacity(routes.len());
        for route in routes {
            let result = self.deliver(event, &route).await;
            outcomes.push(DeliveryOutcome { route, result });
        }

        DispatchReport::Done {
            outcomes,
            route_error: None,
        }
    }

    async fn deliver(&self, event: &DeviceEvent, route: &Route) -> Result<(), String> {
        let start = Instant::now();
        let result = self.channel.publish(event, route).await;

        if let Some(metrics) = &self.metrics {
            metrics
                .publish_duration_seconds
                .observe(start.elapsed().as_secs_f64());
            metrics.record_delivery(result.is_ok());
        }

        match result {
            Ok(()) => {
                info!(event_id = %event.id, route = %route, "published event");
                Ok(())
            }
            Err(err) => {
                warn!(event_id = %event.id, route = %route, error = %err, "failed to publish event");
                Err(err.to_string())
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod dispatcher_test;
