//! 领域层（业务核心逻辑）

pub mod filter;
pub mod model;
pub mod multicast;
pub mod repository;
pub mod route;

pub use filter::{AttributeFilter, EventFilter, FilterChain, PredicateFilter};
pub use model::{
    Alert, AlertLevel, AlertSource, CommandInvocation, CommandResponse, DeliveryOutcome,
    DeviceEvent, DeviceRef, DispatchReport, EventKind, EventPayload, Location, Measurements, Route,
};
pub use multicast::{DeviceTopicMulticaster, FixedTopicMulticaster, GroupMulticaster, Multicaster};
pub use repository::{ChannelConnector, DeliveryChannel, DeviceGroupResolver};
pub use route::{DEFAULT_ROUTE_TEMPLATE, RouteBuilder, TemplateRouteBuilder};
