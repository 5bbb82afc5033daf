//! Telemetry query construction and validation
//!
//! A query names a group of metrics, segmented by workload, sharing one
//! filter expression and one trailing time window.

use crate::error::ValidationError;
use crate::models::MetricKind;
use serde::{Deserialize, Serialize};

/// Most samples the backend returns for one series in a single query
pub const MAX_SAMPLES_PER_QUERY: u64 = 600;

/// Key every query is segmented by
pub const SEGMENT_BY: &str = "kube_workload_name";

/// Metric ids on the backend
pub const LATENCY_METRIC_ID: &str = "sysdig_container_net_http_request_time";
pub const ERROR_COUNT_METRIC_ID: &str = "sysdig_container_net_http_statuscode_request_count";
pub const CPU_USED_METRIC_ID: &str = "sysdig_container_cpu_used_percent";
pub const MEMORY_USED_METRIC_ID: &str = "sysdig_container_memory_used_percent";

/// Status codes counted as errors
pub const DEFAULT_ERROR_STATUS_CODES: &[u16] = &[503, 502, 500, 400, 401, 403];

/// Backend reports request time in nanoseconds
const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// Trailing time window, in offsets relative to now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryWindow {
    /// Window start relative to now, negative (default: -60)
    pub start_offset_secs: i64,
    /// Window end relative to now (default: 0)
    pub end_offset_secs: i64,
    /// Width of one data point (default: 10)
    pub sampling_secs: u64,
}

impl Default for QueryWindow {
    fn default() -> Self {
        Self {
            start_offset_secs: -60,
            end_offset_secs: 0,
            sampling_secs: 10,
        }
    }
}

impl QueryWindow {
    /// Check the window can be served; must pass before any backend call
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sampling_secs == 0 {
            return Err(ValidationError::ZeroSampling);
        }
        if self.start_offset_secs >= 0 {
            return Err(ValidationError::NonNegativeStartOffset(self.start_offset_secs));
        }
        if self.end_offset_secs < self.start_offset_secs {
            return Err(ValidationError::InvertedWindow {
                start_offset_secs: self.start_offset_secs,
                end_offset_secs: self.end_offset_secs,
            });
        }
        if self.start_offset_secs.unsigned_abs() > MAX_SAMPLES_PER_QUERY * self.sampling_secs {
            return Err(ValidationError::WindowTooLarge {
                start_offset_secs: self.start_offset_secs,
                sampling_secs: self.sampling_secs,
                max_samples: MAX_SAMPLES_PER_QUERY,
            });
        }
        Ok(())
    }

    /// Number of data points per series the window spans
    pub fn sample_count(&self) -> u64 {
        if self.sampling_secs == 0 {
            return 0;
        }
        self.start_offset_secs.unsigned_abs() / self.sampling_secs
    }
}

/// One metric requested from the backend
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub kind: MetricKind,
    pub id: String,
    /// Divisor converting backend units into controller units
    pub divisor: f64,
}

impl MetricSpec {
    pub fn new(kind: MetricKind, id: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            divisor: 1.0,
        }
    }

    pub fn with_divisor(mut self, divisor: f64) -> Self {
        self.divisor = divisor;
        self
    }
}

/// Metrics fetched together under one filter
#[derive(Debug, Clone, PartialEq)]
pub struct MetricGroup {
    pub name: String,
    pub filter: String,
    pub metrics: Vec<MetricSpec>,
}

impl MetricGroup {
    pub fn kinds(&self) -> impl Iterator<Item = MetricKind> + '_ {
        self.metrics.iter().map(|m| m.kind)
    }
}

/// The two groups the controller needs: per-namespace resource and latency
/// metrics, and the request count restricted to error status codes.
pub fn default_metric_groups(namespace: &str, error_status_codes: &[u16]) -> Vec<MetricGroup> {
    let namespace_filter = format!("kube_namespace_name = '{}'", namespace);
    let codes = error_status_codes
        .iter()
        .map(|code| format!("'{}'", code))
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        MetricGroup {
            name: "standard".to_string(),
            filter: namespace_filter.clone(),
            metrics: vec![
                MetricSpec::new(MetricKind::Latency, LATENCY_METRIC_ID)
                    .with_divisor(NANOS_PER_MILLI),
                MetricSpec::new(MetricKind::CpuUsed, CPU_USED_METRIC_ID),
                MetricSpec::new(MetricKind::MemoryUsed, MEMORY_USED_METRIC_ID),
            ],
        },
        MetricGroup {
            name: "status_codes".to_string(),
            filter: format!("{} and net_http_statuscode in ({})", namespace_filter, codes),
            metrics: vec![MetricSpec::new(MetricKind::ErrorCount, ERROR_COUNT_METRIC_ID)],
        },
    ]
}

/// Wire form of a requested metric
#[derive(Debug, Clone, Serialize)]
pub struct MetricRequest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Aggregations>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aggregations {
    pub group: String,
}

/// Wire form of a data query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    pub metrics: Vec<MetricRequest>,
    pub data_source_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    pub sampling: u64,
    pub filter: String,
}

impl DataRequest {
    /// Build the request for `group` over `window`, anchored at `now` (epoch seconds)
    ///
    /// Windows ending now are sent as `last`; others as absolute bounds.
    pub fn new(group: &MetricGroup, window: &QueryWindow, now: i64) -> Self {
        let mut metrics = vec![MetricRequest {
            id: SEGMENT_BY.to_string(),
            aggregations: None,
        }];
        metrics.extend(group.metrics.iter().map(|m| MetricRequest {
            id: m.id.clone(),
            aggregations: Some(Aggregations {
                group: "avg".to_string(),
            }),
        }));

        let (last, start, end) = if window.end_offset_secs == 0 {
            (Some(window.start_offset_secs.unsigned_abs()), None, None)
        } else {
            (
                None,
                Some(now + window.start_offset_secs),
                Some(now + window.end_offset_secs),
            )
        };

        Self {
            metrics,
            data_source_type: "container".to_string(),
            last,
            start,
            end,
            sampling: window.sampling_secs,
            filter: group.filter.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_valid() {
        let window = QueryWindow::default();
        assert!(window.validate().is_ok());
        assert_eq!(window.sample_count(), 6);
    }

    #[test]
    fn test_window_sample_limit() {
        let at_limit = QueryWindow {
            start_offset_secs: -6000,
            end_offset_secs: 0,
            sampling_secs: 10,
        };
        assert!(at_limit.validate().is_ok());

        let over = QueryWindow {
            start_offset_secs: -6001,
            ..at_limit
        };
        assert!(matches!(
            over.validate(),
            Err(ValidationError::WindowTooLarge { max_samples: 600, .. })
        ));
    }

    #[test]
    fn test_window_shape_errors() {
        let zero_sampling = QueryWindow {
            sampling_secs: 0,
            ..Default::default()
        };
        assert_eq!(zero_sampling.validate(), Err(ValidationError::ZeroSampling));

        let future = QueryWindow {
            start_offset_secs: 30,
            ..Default::default()
        };
        assert_eq!(
            future.validate(),
            Err(ValidationError::NonNegativeStartOffset(30))
        );

        let inverted = QueryWindow {
            start_offset_secs: -60,
            end_offset_secs: -120,
            sampling_secs: 10,
        };
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvertedWindow { .. })
        ));
    }

    #[test]
    fn test_default_groups() {
        let groups = default_metric_groups("acmeair-g2", DEFAULT_ERROR_STATUS_CODES);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].filter, "kube_namespace_name = 'acmeair-g2'");
        assert_eq!(
            groups[1].filter,
            "kube_namespace_name = 'acmeair-g2' and net_http_statuscode in ('503', '502', '500', '400', '401', '403')"
        );
        assert_eq!(
            groups[1].kinds().collect::<Vec<_>>(),
            vec![MetricKind::ErrorCount]
        );
    }

    #[test]
    fn test_data_request_trailing_window() {
        let groups = default_metric_groups("ns", &[500]);
        let request = DataRequest::new(&groups[0], &QueryWindow::default(), 1_700_000_000);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["last"], 60);
        assert!(json.get("start").is_none());
        assert_eq!(json["sampling"], 10);
        assert_eq!(json["dataSourceType"], "container");
        assert_eq!(json["metrics"][0]["id"], SEGMENT_BY);
        assert!(json["metrics"][0].get("aggregations").is_none());
        assert_eq!(json["metrics"][1]["id"], LATENCY_METRIC_ID);
        assert_eq!(json["metrics"][1]["aggregations"]["group"], "avg");
    }

    #[test]
    fn test_data_request_absolute_window() {
        let groups = default_metric_groups("ns", &[500]);
        let window = QueryWindow {
            start_offset_secs: -120,
            end_offset_secs: -60,
            sampling_secs: 10,
        };
        let request = DataRequest::new(&groups[1], &window, 1_000);
        assert_eq!(request.last, None);
        assert_eq!(request.start, Some(880));
        assert_eq!(request.end, Some(940));
    }
}
