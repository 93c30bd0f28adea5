use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use beacon_core::{FilterAttribute, OutboundMetrics};

use super::*;
use crate::domain::filter::AttributeFilter;
use crate::domain::model::{DeviceRef, EventPayload, Measurements};
use crate::domain::multicast::{
    DeviceTopicMulticaster, FixedTopicMulticaster, GroupMulticaster, Multicaster,
};
use crate::domain::route::RouteBuilder;
use crate::domain::route::TemplateRouteBuilder;
use crate::error::{OutboundError, Result};
use crate::infrastructure::group_resolver::StaticGroupResolver;

#[derive(Default)]
struct RecordingChannel {
    published: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
}

impl RecordingChannel {
    fn failing_on(routes: &[&str]) -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            failing: routes.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn routes(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, route)| route.clone())
            .collect()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingChannel {
    async fn publish(&self, event: &DeviceEvent, route: &Route) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((event.id.clone(), route.to_string()));
        if self.failing.contains(route.as_str()) {
            return Err(OutboundError::delivery(route.as_str(), "broker rejected"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// 记录调用次数的多播器
#[derive(Default)]
struct CountingMulticaster {
    calls: AtomicUsize,
}

impl CountingMulticaster {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Multicaster for CountingMulticaster {
    async fn calculate_routes(
        &self,
        event: &DeviceEvent,
        route_builder: &dyn RouteBuilder,
    ) -> Result<Vec<Route>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DeviceTopicMulticaster
            .calculate_routes(event, route_builder)
            .await
    }
}

fn event(hardware_id: &str) -> DeviceEvent {
    DeviceEvent::new(
        "evt-1",
        DeviceRef::new(hardware_id),
        EventPayload::Measurements(Measurements::default()),
    )
}

fn dispatcher(
    filters: FilterChain,
    target: DispatchTarget,
    channel: Arc<RecordingChannel>,
) -> OutboundDispatcher {
    OutboundDispatcher::new(
        filters,
        target,
        Arc::new(TemplateRouteBuilder::default()),
        channel,
    )
}

#[tokio::test]
async fn test_single_device_topic_delivery() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = dispatcher(
        FilterChain::new(),
        DispatchTarget::Multicast(Arc::new(DeviceTopicMulticaster)),
        channel.clone(),
    );

    let report = dispatcher.dispatch(&event("dev-123")).await;

    assert_eq!(report.delivered(), 1);
    assert_eq!(channel.routes(), vec!["/devices/dev-123".to_string()]);
}

#[tokio::test]
async fn test_static_route_ignores_device() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = dispatcher(
        FilterChain::new(),
        DispatchTarget::Static(Route::from("beacon/events")),
        channel.clone(),
    );

    dispatcher.dispatch(&event("")).await;

    assert_eq!(channel.routes(), vec!["beacon/events".to_string()]);
}

#[tokio::test]
async fn test_filtered_event_is_never_published() {
    let channel = Arc::new(RecordingChannel::default());
    let multicaster = Arc::new(CountingMulticaster::default());
    let filters = FilterChain::new().with(AttributeFilter::include(
        FilterAttribute::EventKind,
        ["alert"],
    ));
    let dispatcher = dispatcher(
        filters,
        DispatchTarget::Multicast(multicaster.clone()),
        channel.clone(),
    );

    let report = dispatcher.dispatch(&event("dev-1")).await;

    assert!(report.is_filtered());
    assert!(channel.routes().is_empty());
    assert_eq!(multicaster.calls(), 0);
}

#[tokio::test]
async fn test_accepted_event_consults_multicaster_once() {
    let channel = Arc::new(RecordingChannel::default());
    let multicaster = Arc::new(CountingMulticaster::default());
    let dispatcher = dispatcher(
        FilterChain::new(),
        DispatchTarget::Multicast(multicaster.clone()),
        channel.clone(),
    );

    dispatcher.dispatch(&event("dev-1")).await;

    assert_eq!(multicaster.calls(), 1);
    assert_eq!(channel.routes(), vec!["/devices/dev-1".to_string()]);
}

#[tokio::test]
async fn test_every_route_published_in_order() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = dispatcher(
        FilterChain::new(),
        DispatchTarget::Multicast(Arc::new(FixedTopicMulticaster::new(["a", "b", "c"]))),
        channel.clone(),
    );

    let report = dispatcher.dispatch(&event("dev-1")).await;

    assert_eq!(report.delivered(), 3);
    assert_eq!(channel.routes(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_failed_route_does_not_stop_remaining_routes() {
    let channel = Arc::new(RecordingChannel::failing_on(&["b"]));
    let dispatcher = dispatcher(
        FilterChain::new(),
        DispatchTarget::Multicast(Arc::new(FixedTopicMulticaster::new(["a", "b", "c"]))),
        channel.clone(),
    );

    let report = dispatcher.dispatch(&event("dev-1")).await;

    assert_eq!(channel.routes(), vec!["a", "b", "c"]);
    assert_eq!(report.delivered(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.outcomes()[1].route, Route::from("b"));
    assert!(report.outcomes()[1].result.is_err());
}

#[tokio::test]
async fn test_empty_route_list_publishes_nothing() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = dispatcher(
        FilterChain::new(),
        DispatchTarget::Multicast(Arc::new(FixedTopicMulticaster::new(Vec::<String>::new()))),
        channel.clone(),
    );

    let report = dispatcher.dispatch(&event("dev-1")).await;

    assert!(!report.is_filtered());
    assert!(report.outcomes().is_empty());
    assert!(channel.routes().is_empty());
}

#[tokio::test]
async fn test_invalid_device_drops_event_without_publishing() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = dispatcher(
        FilterChain::new(),
        DispatchTarget::Multicast(Arc::new(DeviceTopicMulticaster)),
        channel.clone(),
    );

    let report = dispatcher.dispatch(&event("")).await;

    match report {
        DispatchReport::Done { outcomes, route_error } => {
            assert!(outcomes.is_empty());
            assert!(route_error.is_some());
        }
        DispatchReport::Filtered => panic!("event should not be filtered"),
    }
    assert!(channel.routes().is_empty());
}

#[tokio::test]
async fn test_group_member_failure_publishes_nothing() {
    let channel = Arc::new(RecordingChannel::default());
    let resolver = Arc::new(StaticGroupResolver::from_hardware_ids([(
        "fleet",
        vec!["dev-2", ""],
    )]));
    let dispatcher = dispatcher(
        FilterChain::new(),
        DispatchTarget::Multicast(Arc::new(GroupMulticaster::new("fleet", resolver))),
        channel.clone(),
    );

    let report = dispatcher.dispatch(&event("dev-1")).await;

    assert_eq!(report.outcomes().len(), 0);
    assert!(channel.routes().is_empty());
}

#[tokio::test]
async fn test_metrics_track_dispatch_results() {
    let metrics = Arc::new(OutboundMetrics::new().unwrap());
    let channel = Arc::new(RecordingChannel::failing_on(&["b"]));
    let dispatcher = dispatcher(
        FilterChain::new().with(AttributeFilter::exclude(FilterAttribute::HardwareId, ["muted"])),
        DispatchTarget::Multicast(Arc::new(FixedTopicMulticaster::new(["a", "b"]))),
        channel,
    )
    .with_metrics(metrics.clone());

    dispatcher.dispatch(&event("dev-1")).await;
    dispatcher.dispatch(&event("muted")).await;

    assert_eq!(
        metrics
            .events_total
            .with_label_values(&["measurements"])
            .get(),
        2
    );
    assert_eq!(
        metrics
            .events_filtered_total
            .with_label_values(&["measurements"])
            .get(),
        1
    );
    assert_eq!(metrics.deliveries_total.with_label_values(&["success"]).get(), 1);
    assert_eq!(metrics.deliveries_total.with_label_values(&["failure"]).get(), 1);
}

#[tokio::test]
async fn test_concurrent_dispatch_shares_channel() {
    let channel = Arc::new(RecordingChannel::default());
    let dispatcher = Arc::new(dispatcher(
        FilterChain::new(),
        DispatchTarget::Multicast(Arc::new(DeviceTopicMulticaster)),
        channel.clone(),
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            dispatcher.dispatch(&event(&format!("dev-{i}"))).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().delivered(), 1);
    }

    assert_eq!(channel.routes().len(), 8);
}
