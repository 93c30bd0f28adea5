//! # Prometheus 指标收集模块
//!
//! 为出站事件服务提供 Prometheus 指标收集能力。
//! 每个指标集持有自己的 `Registry`，不依赖进程级全局注册表。

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

/// 出站事件服务指标
pub struct OutboundMetrics {
    registry: Registry,
    /// 收到的事件总数
    pub events_total: IntCounterVec,
    /// 被过滤的事件总数
    pub events_filtered_total: IntCounterVec,
    /// 投递结果总数（result = success | failure）
    pub deliveries_total: IntCounterVec,
    /// 路由计算失败次数
    pub route_failures_total: IntCounter,
    /// 单次发布耗时（秒）
    pub publish_duration_seconds: Histogram,
}

impl OutboundMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_total = IntCounterVec::new(
            Opts::new("outbound_events_total", "Total number of events received"),
            &["kind"],
        )?;

        let events_filtered_total = IntCounterVec::new(
            Opts::new(
                "outbound_events_filtered_total",
                "Total number of events dropped by filters",
            ),
            &["kind"],
        )?;

        let deliveries_total = IntCounterVec::new(
            Opts::new(
                "outbound_deliveries_total",
                "Total number of per-route delivery attempts",
            ),
            &["result"],
        )?;

        let route_failures_total = IntCounter::new(
            "outbound_route_failures_total",
            "Total number of events whose routes could not be calculated",
        )?;

        let publish_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "outbound_publish_duration_seconds",
                "Publish duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(events_filtered_total.clone()))?;
        registry.register(Box::new(deliveries_total.clone()))?;
        registry.register(Box::new(route_failures_total.clone()))?;
        registry.register(Box::new(publish_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            events_total,
            events_filtered_total,
            deliveries_total,
            route_failures_total,
            publish_duration_seconds,
        })
    }

    /// 记录一次投递结果
    pub fn record_delivery(&self, success: bool) {
        let label = if success { "success" } else { "failure" };
        self.deliveries_total.with_label_values(&[label]).inc();
    }

    /// 以 Prometheus 文本格式导出所有指标
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
