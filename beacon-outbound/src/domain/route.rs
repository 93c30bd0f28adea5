//! 路由构建器：设备引用 -> 投递目标
//!
//! 默认模板为 `/devices/{hardware_id}`，支持的占位符：
//! `{hardware_id}`、`{site_token}`、`{specification_token}`、`{assignment_token}`。

use crate::domain::model::{DeviceRef, Route};
use crate::error::{OutboundError, Result};

pub const DEFAULT_ROUTE_TEMPLATE: &str = "/devices/{hardware_id}";

/// 路由构建器（纯函数，同一设备总是得到同一路由）
pub trait RouteBuilder: Send + Sync {
    fn build(&self, device: &DeviceRef) -> Result<Route>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceField {
    HardwareId,
    SiteToken,
    SpecificationToken,
    AssignmentToken,
}

impl DeviceField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "hardware_id" => Some(DeviceField::HardwareId),
            "site_token" => Some(DeviceField::SiteToken),
            "specification_token" => Some(DeviceField::SpecificationToken),
            "assignment_token" => Some(DeviceField::AssignmentToken),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            DeviceField::HardwareId => "hardware_id",
            DeviceField::SiteToken => "site_token",
            DeviceField::SpecificationToken => "specification_token",
            DeviceField::AssignmentToken => "assignment_token",
        }
    }

    fn value<'a>(&self, device: &'a DeviceRef) -> Option<&'a str> {
        match self {
            DeviceField::HardwareId => device.hardware_id(),
            DeviceField::SiteToken => device.site_token(),
            DeviceField::SpecificationToken => device.specification_token(),
            DeviceField::AssignmentToken => device.assignment_token(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(DeviceField),
}

/// 基于模板的路由构建器，模板在创建时解析一次
#[derive(Debug, Clone)]
pub struct TemplateRouteBuilder {
    template: String,
    segments: Vec<Segment>,
}

impl TemplateRouteBuilder {
    pub fn parse(template: &str) -> Result<Self> {
        if template.trim().is_empty() {
            return Err(OutboundError::Configuration(
                "route template must not be empty".to_string(),
            ));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(pos) = rest.find(['{', '}']) {
            literal.push_str(&rest[..pos]);
            if rest[pos..].starts_with('}') {
                return Err(OutboundError::Configuration(format!(
                    "unbalanced '}}' in route template '{template}'"
                )));
            }

            let after = &rest[pos + 1..];
            let end = after.find('}').ok_or_else(|| {
                OutboundError::Configuration(format!(
                    "unclosed placeholder in route template '{template}'"
                ))
            })?;
            let name = &after[..end];
            let field = DeviceField::parse(name).ok_or_else(|| {
                OutboundError::Configuration(format!(
                    "unknown placeholder '{{{name}}}' in route template '{template}'"
                ))
            })?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Field(field));
            rest = &after[end + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }
}

impl Default for TemplateRouteBuilder {
    fn default() -> Self {
        Self {
            template: DEFAULT_ROUTE_TEMPLATE.to_string(),
            segments: vec![
                Segment::Literal("/devices/".to_string()),
                Segment::Field(DeviceField::HardwareId),
            ],
        }
    }
}

impl RouteBuilder for TemplateRouteBuilder {
    fn build(&self, device: &DeviceRef) -> Result<Route> {
        let mut route = String::with_capacity(self.template.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => route.push_str(text),
                Segment::Field(field) => {
                    let value = field.value(device).ok_or_else(|| {
                        OutboundError::InvalidDevice(format!(
                            "device is missing required identifier '{}'",
                            field.name()
                        ))
                    })?;
                    route.push_str(value);
                }
            }
        }
        Ok(Route::new(route))
    }
}
