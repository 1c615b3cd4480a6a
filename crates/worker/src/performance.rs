use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// 工作流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    Detection,
    Analysis,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Detection => "detection",
            WorkflowKind::Analysis => "analysis",
        }
    }
}

#[derive(Debug, Clone)]
struct WorkflowSample {
    kind: WorkflowKind,
    success: bool,
    duration_ms: f64,
    finished_at: DateTime<Utc>,
}

/// 耗时趋势
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyTrend {
    Improving,
    Stable,
    Degrading,
    InsufficientData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub executions: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub average_ms: f64,
    pub p95_ms: f64,
}

/// 性能报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub success_rate: f64,
    pub detection: WorkflowStats,
    pub analysis: WorkflowStats,
    /// 最近一小时内完成的工作流数量
    pub throughput_per_hour: f64,
    pub latency_trend: LatencyTrend,
    pub recommendations: Vec<String>,
}

const TREND_MIN_SAMPLES: usize = 6;
const TREND_TOLERANCE: f64 = 0.2;

/// 滚动性能统计，保留最近 `window` 次执行
#[derive(Debug)]
pub struct PerformanceTracker {
    window: usize,
    success_rate_warning: f64,
    samples: VecDeque<WorkflowSample>,
    total_executions: u64,
    successful_executions: u64,
}

impl PerformanceTracker {
    pub fn new(window: usize, success_rate_warning: f64) -> Self {
        Self {
            window: window.max(1),
            success_rate_warning,
            samples: VecDeque::new(),
            total_executions: 0,
            successful_executions: 0,
        }
    }

    pub fn record(&mut self, kind: WorkflowKind, success: bool, duration: Duration) {
        self.record_at(kind, success, duration, Utc::now());
    }

    pub(crate) fn record_at(
        &mut self,
        kind: WorkflowKind,
        success: bool,
        duration: Duration,
        finished_at: DateTime<Utc>,
    ) {
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(WorkflowSample {
            kind,
            success,
            duration_ms: duration.as_secs_f64() * 1000.0,
            finished_at,
        });
    }

    pub fn total_executions(&self) -> u64 {
        self.total_executions
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            1.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }

    /// 窗口内某类工作流的统计
    pub fn stats_for(&self, kind: WorkflowKind) -> WorkflowStats {
        let samples: Vec<&WorkflowSample> = self.samples.iter().filter(|s| s.kind == kind).collect();
        if samples.is_empty() {
            return WorkflowStats::default();
        }
        let executions = samples.len() as u64;
        let successes = samples.iter().filter(|s| s.success).count() as u64;
        let mut durations: Vec<f64> = samples.iter().map(|s| s.duration_ms).collect();
        durations.sort_by(|a, b| a.total_cmp(b));

        WorkflowStats {
            executions,
            successes,
            success_rate: successes as f64 / executions as f64,
            average_ms: durations.iter().sum::<f64>() / durations.len() as f64,
            p95_ms: percentile(&durations, 0.95),
        }
    }

    /// 比较窗口内前后两半检测耗时的均值
    pub fn latency_trend(&self) -> LatencyTrend {
        let durations: Vec<f64> = self
            .samples
            .iter()
            .filter(|s| s.kind == WorkflowKind::Detection && s.success)
            .map(|s| s.duration_ms)
            .collect();
        if durations.len() < TREND_MIN_SAMPLES {
            return LatencyTrend::InsufficientData;
        }
        let (older, recent) = durations.split_at(durations.len() / 2);
        let older_avg = older.iter().sum::<f64>() / older.len() as f64;
        let recent_avg = recent.iter().sum::<f64>() / recent.len() as f64;

        if older_avg <= f64::EPSILON {
            return LatencyTrend::Stable;
        }
        let change = (recent_avg - older_avg) / older_avg;
        if change > TREND_TOLERANCE {
            LatencyTrend::Degrading
        } else if change < -TREND_TOLERANCE {
            LatencyTrend::Improving
        } else {
            LatencyTrend::Stable
        }
    }

    pub fn report(&self, uptime_seconds: u64) -> PerformanceReport {
        self.report_at(uptime_seconds, Utc::now())
    }

    pub(crate) fn report_at(&self, uptime_seconds: u64, now: DateTime<Utc>) -> PerformanceReport {
        let hour_ago = now - ChronoDuration::hours(1);
        let last_hour = self
            .samples
            .iter()
            .filter(|s| s.finished_at > hour_ago)
            .count() as f64;
        // 运行不足一小时时按实际时长折算
        let hours = (uptime_seconds as f64 / 3600.0).clamp(1.0 / 60.0, 1.0);
        let throughput_per_hour = last_hour / hours;

        let detection = self.stats_for(WorkflowKind::Detection);
        let analysis = self.stats_for(WorkflowKind::Analysis);
        let latency_trend = self.latency_trend();
        let success_rate = self.success_rate();
        let recommendations = self.recommendations(success_rate, &detection, latency_trend);

        PerformanceReport {
            generated_at: now,
            uptime_seconds,
            total_executions: self.total_executions,
            successful_executions: self.successful_executions,
            failed_executions: self.total_executions - self.successful_executions,
            success_rate,
            detection,
            analysis,
            throughput_per_hour,
            latency_trend,
            recommendations,
        }
    }

    fn recommendations(
        &self,
        success_rate: f64,
        detection: &WorkflowStats,
        trend: LatencyTrend,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();
        if self.total_executions == 0 {
            recommendations.push("暂无工作流执行记录".to_string());
            return recommendations;
        }
        if success_rate < self.success_rate_warning {
            recommendations.push(format!(
                "工作流成功率 {:.1}% 低于 {:.0}%，请检查硬件连接与检测器状态",
                success_rate * 100.0,
                self.success_rate_warning * 100.0
            ));
        }
        if detection.executions > 0 && detection.success_rate < self.success_rate_warning {
            recommendations.push(format!(
                "检测成功率 {:.1}%，建议检查相机与补光设备",
                detection.success_rate * 100.0
            ));
        }
        if trend == LatencyTrend::Degrading {
            recommendations.push("检测耗时呈上升趋势，建议检查系统负载与磁盘空间".to_string());
        }
        if detection.average_ms > 0.0 && detection.p95_ms > detection.average_ms * 3.0 {
            recommendations.push(format!(
                "检测耗时波动较大 (p95 {:.0}ms，平均 {:.0}ms)，可能存在偶发阻塞",
                detection.p95_ms, detection.average_ms
            ));
        }
        if recommendations.is_empty() {
            recommendations.push("系统运行正常".to_string());
        }
        recommendations
    }
}

fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
