use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 指标类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// 单调累积值
    Counter,
    /// 时间点瞬时值
    Gauge,
}

/// 单个带时间戳的指标样本，记录后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    pub unit: String,
    pub description: String,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self::new(name, MetricKind::Gauge, value, unit)
    }

    pub fn counter(name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        Self::new(name, MetricKind::Counter, value, unit)
    }

    fn new(name: impl Into<String>, kind: MetricKind, value: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            timestamp: Utc::now(),
            tags: BTreeMap::new(),
            unit: unit.into(),
            description: String::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
