//! Telemetry retrieval from the metrics backend
//!
//! Fetches each metric group over the trailing window, flattens the
//! response into [`MetricSample`]s and reduces them to per-service means.
//! A group that fails validation or fetching marks its metrics missing for
//! the iteration; services that depend on them get no decision.

mod query;
mod sysdig;

pub use query::{
    default_metric_groups, Aggregations, DataRequest, MetricGroup, MetricRequest, MetricSpec,
    QueryWindow, CPU_USED_METRIC_ID, DEFAULT_ERROR_STATUS_CODES, ERROR_COUNT_METRIC_ID,
    LATENCY_METRIC_ID, MAX_SAMPLES_PER_QUERY, MEMORY_USED_METRIC_ID, SEGMENT_BY,
};
pub use sysdig::{SysdigClient, SysdigConfig};

use crate::error::FetchError;
use crate::models::{MetricKind, MetricSample, ServiceMeans};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Metrics a service needs before the planner may act on it
pub const REQUIRED_METRICS: &[MetricKind] =
    &[MetricKind::Latency, MetricKind::ErrorCount, MetricKind::CpuUsed];

/// One timestamped row: `d[0]` is the workload, `d[i + 1]` the i-th metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub t: i64,
    pub d: Vec<serde_json::Value>,
}

/// Response body of a data query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryResponse {
    #[serde(default)]
    pub data: Vec<DataPoint>,
}

impl TelemetryResponse {
    /// Flatten rows into samples, scaled into controller units
    ///
    /// Rows without a workload name and null values are skipped.
    pub fn samples(&self, group: &MetricGroup) -> Vec<MetricSample> {
        let mut samples = Vec::new();

        for point in &self.data {
            let service = match point.d.first().and_then(|v| v.as_str()) {
                Some(service) => service,
                None => continue,
            };

            for (idx, spec) in group.metrics.iter().enumerate() {
                if let Some(value) = point.d.get(idx + 1).and_then(|v| v.as_f64()) {
                    samples.push(MetricSample {
                        service: service.to_string(),
                        metric: spec.kind,
                        timestamp: point.t,
                        value: value / spec.divisor,
                    });
                }
            }
        }

        samples
    }
}

/// Source of raw telemetry
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch one metric group over `window`
    ///
    /// Callers validate the window first; implementations may assume it fits.
    async fn fetch(
        &self,
        group: &MetricGroup,
        window: &QueryWindow,
    ) -> Result<TelemetryResponse, FetchError>;
}

/// A metric group that produced no data in an iteration
#[derive(Debug, Clone, PartialEq)]
pub struct GroupFailure {
    pub group: String,
    pub error: String,
}

/// Samples from one iteration, grouped by metric then service
#[derive(Debug, Clone, Default)]
pub struct TelemetrySnapshot {
    values: HashMap<MetricKind, HashMap<String, Vec<f64>>>,
    fetched: HashSet<MetricKind>,
    failures: Vec<GroupFailure>,
}

impl TelemetrySnapshot {
    /// Record that `kinds` were fetched successfully, with `samples`
    pub fn record(&mut self, kinds: impl IntoIterator<Item = MetricKind>, samples: Vec<MetricSample>) {
        self.fetched.extend(kinds);
        for sample in samples {
            self.values
                .entry(sample.metric)
                .or_default()
                .entry(sample.service)
                .or_default()
                .push(sample.value);
        }
    }

    /// Record that a group produced no data this iteration
    pub fn record_failure(&mut self, group: &str, error: &FetchError) {
        self.failures.push(GroupFailure {
            group: group.to_string(),
            error: error.to_string(),
        });
    }

    pub fn failures(&self) -> &[GroupFailure] {
        &self.failures
    }

    pub fn failed_groups(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.group.as_str()).collect()
    }

    pub fn is_fetched(&self, kind: MetricKind) -> bool {
        self.fetched.contains(&kind)
    }

    /// Services seen in any fetched metric, sorted
    pub fn services(&self) -> BTreeSet<String> {
        self.values
            .values()
            .flat_map(|by_service| by_service.keys().cloned())
            .collect()
    }

    /// Mean of one metric for one service; no samples means zero
    pub fn mean(&self, kind: MetricKind, service: &str) -> f64 {
        self.values
            .get(&kind)
            .and_then(|by_service| by_service.get(service))
            .map(|values| mean(values))
            .unwrap_or(0.0)
    }

    /// Means for a service, or `None` if a required metric was not fetched
    pub fn means_for(&self, service: &str) -> Option<ServiceMeans> {
        if !REQUIRED_METRICS.iter().all(|kind| self.is_fetched(*kind)) {
            return None;
        }

        Some(ServiceMeans {
            latency_ms: self.mean(MetricKind::Latency, service),
            error_count: self.mean(MetricKind::ErrorCount, service),
            cpu_percent: self.mean(MetricKind::CpuUsed, service),
            memory_percent: self.mean(MetricKind::MemoryUsed, service),
        })
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Fetches all metric groups for an iteration
pub struct TelemetryFetcher {
    source: Arc<dyn TelemetrySource>,
    groups: Vec<MetricGroup>,
    window: QueryWindow,
}

impl TelemetryFetcher {
    pub fn new(source: Arc<dyn TelemetrySource>, groups: Vec<MetricGroup>, window: QueryWindow) -> Self {
        Self {
            source,
            groups,
            window,
        }
    }

    pub fn window(&self) -> &QueryWindow {
        &self.window
    }

    /// Fetch every group; failures are logged and recorded, never returned
    pub async fn snapshot(&self) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::default();

        for group in &self.groups {
            if let Err(e) = self.window.validate() {
                warn!(group = %group.name, error = %e, "Skipping telemetry query");
                snapshot.record_failure(&group.name, &FetchError::from(e));
                continue;
            }

            match self.source.fetch(group, &self.window).await {
                Ok(response) => {
                    let samples = response.samples(group);
                    debug!(
                        group = %group.name,
                        rows = response.data.len(),
                        samples = samples.len(),
                        "Fetched telemetry"
                    );
                    snapshot.record(group.kinds(), samples);
                }
                Err(e) => {
                    warn!(group = %group.name, error = %e, "Failed to fetch telemetry");
                    snapshot.record_failure(&group.name, &e);
                }
            }
        }

        snapshot
    }
}
