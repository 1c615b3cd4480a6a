use chrono::{DateTime, Duration as ChronoDuration, Utc};
use orchestrator_core::models::Metric;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

/// Start of the trailing `window`; windows reaching before the representable range keep everything.
fn trailing_cutoff(window: ChronoDuration) -> DateTime<Utc> {
    Utc::now()
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Bounded, time-ordered sample history per metric name.
///
/// Samples older than the retention window, or beyond the per-name sample
/// cap, are evicted oldest first.
pub struct MetricStore {
    retention: ChronoDuration,
    max_samples: usize,
    series: RwLock<HashMap<String, VecDeque<Metric>>>,
}

impl MetricStore {
    pub fn new(retention: Duration, max_samples: usize) -> Self {
        Self {
            retention: ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::MAX),
            max_samples: max_samples.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record(&self, metric: Metric) {
        let cutoff = trailing_cutoff(self.retention);
        if metric.timestamp < cutoff {
            return;
        }

        let mut series = self.series.write().await;
        let samples = series.entry(metric.name.clone()).or_default();

        // keep ascending order even if a sample arrives late
        match samples.back() {
            Some(last) if last.timestamp > metric.timestamp => {
                let pos = samples.partition_point(|m| m.timestamp <= metric.timestamp);
                samples.insert(pos, metric);
            }
            _ => samples.push_back(metric),
        }

        while samples.len() > self.max_samples {
            samples.pop_front();
        }
        while samples.front().is_some_and(|m| m.timestamp < cutoff) {
            samples.pop_front();
        }
    }

    pub async fn record_all(&self, metrics: impl IntoIterator<Item = Metric>) {
        for metric in metrics {
            self.record(metric).await;
        }
    }

    /// Samples for `name` within the trailing `window`, oldest first.
    pub async fn history(&self, name: &str, window: Duration) -> Vec<Metric> {
        let window = ChronoDuration::from_std(window).unwrap_or(self.retention);
        let since = trailing_cutoff(window);
        let series = self.series.read().await;
        series
            .get(name)
            .map(|samples| {
                samples
                    .iter()
                    .filter(|m| m.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent sample of every metric.
    pub async fn latest(&self) -> BTreeMap<String, Metric> {
        let series = self.series.read().await;
        series
            .iter()
            .filter_map(|(name, samples)| samples.back().map(|m| (name.clone(), m.clone())))
            .collect()
    }

    pub async fn sample_count(&self, name: &str) -> usize {
        self.series
            .read()
            .await
            .get(name)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}
