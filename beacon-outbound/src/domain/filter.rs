//! 事件过滤器
//!
//! 过滤链中的每个过滤器都放行时事件才会被接受；空过滤链放行所有事件。

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use beacon_core::{FilterAttribute, FilterConfig, FilterOperation};

use crate::domain::model::DeviceEvent;

/// 事件过滤器
pub trait EventFilter: Send + Sync {
    fn accepts(&self, event: &DeviceEvent) -> bool;

    /// 用于日志的过滤器名称
    fn name(&self) -> &str {
        "custom"
    }
}

/// 按单个事件属性匹配的过滤器
#[derive(Debug, Clone)]
pub struct AttributeFilter {
    attribute: FilterAttribute,
    operation: FilterOperation,
    values: HashSet<String>,
}

impl AttributeFilter {
    pub fn new<I, T>(attribute: FilterAttribute, operation: FilterOperation, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            attribute,
            operation,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn include<I, T>(attribute: FilterAttribute, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(attribute, FilterOperation::Include, values)
    }

    pub fn exclude<I, T>(attribute: FilterAttribute, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(attribute, FilterOperation::Exclude, values)
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.attribute, config.operation, config.values.iter().cloned())
    }

    fn attribute_value<'a>(&self, event: &'a DeviceEvent) -> Option<&'a str> {
        match self.attribute {
            FilterAttribute::EventKind => Some(event.kind().as_str()),
            FilterAttribute::Site => event.device.site_token(),
            FilterAttribute::Specification => event.device.specification_token(),
            FilterAttribute::HardwareId => event.device.hardware_id(),
        }
    }
}

impl EventFilter for AttributeFilter {
    fn accepts(&self, event: &DeviceEvent) -> bool {
        let matched = self
            .attribute_value(event)
            .map(|value| self.values.contains(value))
            .unwrap_or(false);
        match self.operation {
            FilterOperation::Include => matched,
            FilterOperation::Exclude => !matched,
        }
    }

    fn name(&self) -> &str {
        match self.attribute {
            FilterAttribute::EventKind => "event_kind",
            FilterAttribute::Site => "site",
            FilterAttribute::Specification => "specification",
            FilterAttribute::HardwareId => "hardware_id",
        }
    }
}

/// 由外部提供的谓词过滤器
pub struct PredicateFilter<F> {
    name: String,
    predicate: F,
}

impl<F> PredicateFilter<F>
where
    F: Fn(&DeviceEvent) -> bool + Send + Sync,
{
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> EventFilter for PredicateFilter<F>
where
    F: Fn(&DeviceEvent) -> bool + Send + Sync,
{
    fn accepts(&self, event: &DeviceEvent) -> bool {
        (self.predicate)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 过滤链
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn EventFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[FilterConfig]) -> Self {
        let mut chain = Self::new();
        for config in configs {
            chain.push(Arc::new(AttributeFilter::from_config(config)));
        }
        chain
    }

    pub fn push(&mut self, filter: Arc<dyn EventFilter>) {
        self.filters.push(filter);
    }

    pub fn with(mut self, filter: impl EventFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// 返回第一个拒绝该事件的过滤器名称，全部放行时返回 None
    pub fn rejected_by(&self, event: &DeviceEvent) -> Option<&str> {
        self.filters
            .iter()
            .find(|filter| !filter.accepts(event))
            .map(|filter| filter.name())
    }

    pub fn accepts(&self, event: &DeviceEvent) -> bool {
        self.rejected_by(event).is_none()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}
