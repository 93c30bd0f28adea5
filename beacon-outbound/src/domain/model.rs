//! 领域模型：设备事件、路由与投递结果

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 事件来源设备引用
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    /// 硬件 ID（路由必需，畸形输入中可能缺失）
    #[serde(default)]
    pub hardware_id: Option<String>,
    #[serde(default)]
    pub site_token: Option<String>,
    #[serde(default)]
    pub specification_token: Option<String>,
    #[serde(default)]
    pub assignment_token: Option<String>,
}

impl DeviceRef {
    pub fn new(hardware_id: impl Into<String>) -> Self {
        Self {
            hardware_id: Some(hardware_id.into()),
            ..Self::default()
        }
    }

    pub fn with_site(mut self, site_token: impl Into<String>) -> Self {
        self.site_token = Some(site_token.into());
        self
    }

    pub fn with_specification(mut self, specification_token: impl Into<String>) -> Self {
        self.specification_token = Some(specification_token.into());
        self
    }

    pub fn with_assignment(mut self, assignment_token: impl Into<String>) -> Self {
        self.assignment_token = Some(assignment_token.into());
        self
    }

    /// 非空的硬件 ID
    pub fn hardware_id(&self) -> Option<&str> {
        non_empty(self.hardware_id.as_deref())
    }

    pub fn site_token(&self) -> Option<&str> {
        non_empty(self.site_token.as_deref())
    }

    pub fn specification_token(&self) -> Option<&str> {
        non_empty(self.specification_token.as_deref())
    }

    pub fn assignment_token(&self) -> Option<&str> {
        non_empty(self.assignment_token.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Measurements,
    Location,
    Alert,
    CommandInvocation,
    CommandResponse,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Measurements => "measurements",
            EventKind::Location => "location",
            EventKind::Alert => "alert",
            EventKind::CommandInvocation => "command_invocation",
            EventKind::CommandResponse => "command_response",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 测量值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(default)]
    pub measurements: BTreeMap<String, f64>,
}

/// 位置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    #[default]
    Device,
    System,
}

/// 告警
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: String,
    #[serde(default)]
    pub level: AlertLevel,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: AlertSource,
}

/// 命令调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub command_token: String,
    #[serde(default)]
    pub initiator: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// 命令响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub originating_event_id: String,
    #[serde(default)]
    pub response: String,
}

/// 事件负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Measurements(Measurements),
    Location(Location),
    Alert(Alert),
    CommandInvocation(CommandInvocation),
    CommandResponse(CommandResponse),
}

/// 设备事件，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub id: String,
    pub device: DeviceRef,
    #[serde(default = "Utc::now")]
    pub event_date: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub payload: EventPayload,
}

impl DeviceEvent {
    pub fn new(id: impl Into<String>, device: DeviceRef, payload: EventPayload) -> Self {
        Self {
            id: id.into(),
            device,
            event_date: Utc::now(),
            metadata: HashMap::new(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        match &self.payload {
            EventPayload::Measurements(_) => EventKind::Measurements,
            EventPayload::Location(_) => EventKind::Location,
            EventPayload::Alert(_) => EventKind::Alert,
            EventPayload::CommandInvocation(_) => EventKind::CommandInvocation,
            EventPayload::CommandResponse(_) => EventKind::CommandResponse,
        }
    }

    /// 序列化为 JSON 负载
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// 投递目标（例如 MQTT 主题），按事件临时计算，不持久化
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route(String);

impl Route {
    pub fn new(route: impl Into<String>) -> Self {
        Route(route.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Route {
    fn from(value: String) -> Self {
        Route(value)
    }
}

impl From<&str> for Route {
    fn from(value: &str) -> Self {
        Route(value.to_string())
    }
}

/// 单条路由的投递结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub route: Route,
    pub result: Result<(), String>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// 单个事件的分发结果，仅用于观测，不回传给事件生产方
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// 被过滤器拒绝
    Filtered,
    /// 已完成投递
    Done {
        outcomes: Vec<DeliveryOutcome>,
        /// 路由计算失败原因（此时 outcomes 为空）
        route_error: Option<String>,
    },
}

impl DispatchReport {
    pub fn is_filtered(&self) -> bool {
        matches!(self, DispatchReport::Filtered)
    }

    pub fn outcomes(&self) -> &[DeliveryOutcome] {
        match self {
            DispatchReport::Filtered => &[],
            DispatchReport::Done { outcomes, .. } => outcomes,
        }
    }

    pub fn delivered(&self) -> usize {
        self.outcomes().iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes().iter().filter(|o| !o.is_success()).count()
    }
}
