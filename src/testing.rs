// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic telemetry generators for tests and benchmarks.
//!
//! Record names encode their position (`test-metric-int-{resource}-{index}`,
//! `span-{resource}-{scope}-{index}`, ...) so tests can assert on order.

use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, InstrumentationScope, KeyValue,
};
use opentelemetry_proto::tonic::logs::v1::LogRecord;
use opentelemetry_proto::tonic::metrics::v1::{
    number_data_point, ExponentialHistogramDataPoint, HistogramDataPoint, NumberDataPoint,
    SummaryDataPoint,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::Span;

use crate::pdata::{Metric, MetricData, ResourceGroup, ScopeGroup, SignalBatch, Temporality};

/// A resource identified by its `service.name`.
#[must_use]
pub fn resource(service_name: &str) -> Resource {
    Resource {
        attributes: vec![string_attribute("service.name", service_name)],
        ..Default::default()
    }
}

/// An instrumentation scope with a fixed version.
#[must_use]
pub fn scope(name: &str) -> InstrumentationScope {
    InstrumentationScope {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        ..Default::default()
    }
}

fn string_attribute(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

/// Name of the `index`th generated metric under resource `resource`.
#[must_use]
pub fn metric_name(resource: usize, index: usize) -> String {
    format!("test-metric-int-{resource}-{index}")
}

fn number_points(count: usize) -> impl Iterator<Item = NumberDataPoint> {
    (0..count).map(|i| NumberDataPoint {
        time_unix_nano: i as u64,
        value: Some(number_data_point::Value::AsInt(i as i64)),
        ..Default::default()
    })
}

/// A cumulative, monotonic sum with `points` points stamped 0, 1, ...
#[must_use]
pub fn sum_metric(name: &str, points: usize) -> Metric {
    Metric::new(
        name,
        "a monotonic counter",
        "1",
        MetricData::Sum {
            temporality: Temporality::Cumulative,
            monotonic: true,
            points: number_points(points).collect(),
        },
    )
}

/// A gauge with `points` points stamped 0, 1, ...
#[must_use]
pub fn gauge_metric(name: &str, points: usize) -> Metric {
    Metric::new(
        name,
        "a gauge",
        "ms",
        MetricData::Gauge {
            points: number_points(points).collect(),
        },
    )
}

/// One metric of every kind, two points each, named in order:
/// int gauge, double gauge, int sum, double sum, histogram, summary,
/// exponential histogram.
#[must_use]
pub fn all_kinds_metrics() -> Vec<Metric> {
    let double_points = || {
        (0..2u64)
            .map(|i| NumberDataPoint {
                time_unix_nano: i,
                value: Some(number_data_point::Value::AsDouble(i as f64 + 0.5)),
                ..Default::default()
            })
            .collect()
    };
    let histogram = MetricData::Histogram {
        temporality: Temporality::Cumulative,
        points: (0..2u64)
            .map(|i| HistogramDataPoint {
                time_unix_nano: i,
                count: 3,
                sum: Some(6.0),
                bucket_counts: vec![1, 2],
                explicit_bounds: vec![1.0],
                ..Default::default()
            })
            .collect(),
    };
    let summary = MetricData::Summary {
        points: (0..2u64)
            .map(|i| SummaryDataPoint {
                time_unix_nano: i,
                count: 4,
                sum: 10.0,
                ..Default::default()
            })
            .collect(),
    };
    let exponential = MetricData::ExponentialHistogram {
        temporality: Temporality::Delta,
        points: (0..2u64)
            .map(|i| ExponentialHistogramDataPoint {
                time_unix_nano: i,
                count: 2,
                scale: 3,
                zero_count: 1,
                ..Default::default()
            })
            .collect(),
    };

    vec![
        gauge_metric(&metric_name(0, 0), 2),
        Metric::new(
            metric_name(0, 1),
            "a double gauge",
            "ms",
            MetricData::Gauge {
                points: double_points(),
            },
        ),
        sum_metric(&metric_name(0, 2), 2),
        Metric::new(
            metric_name(0, 3),
            "a double counter",
            "By",
            MetricData::Sum {
                temporality: Temporality::Cumulative,
                monotonic: true,
                points: double_points(),
            },
        ),
        Metric::new(metric_name(0, 4), "a histogram", "ms", histogram),
        Metric::new(metric_name(0, 5), "a summary", "ms", summary),
        Metric::new(metric_name(0, 6), "an exponential histogram", "ms", exponential),
    ]
}

/// Wraps metrics into a batch with one resource and one scope.
#[must_use]
pub fn metrics_batch(resource_index: usize, metrics: Vec<Metric>) -> SignalBatch<Metric> {
    let mut batch = SignalBatch::new();
    batch.push(ResourceGroup::new(
        Some(resource(&format!("resource-{resource_index}"))),
        "",
        vec![ScopeGroup::new(Some(scope("scope-0")), "", metrics)],
    ));
    batch
}

/// `count` two-point sums under a single resource and scope, named
/// `test-metric-int-0-{i}`.
#[must_use]
pub fn metrics_same_resource(count: usize) -> SignalBatch<Metric> {
    metrics_for_resource(0, count)
}

/// Like [`metrics_same_resource`] for resource number `resource_index`.
#[must_use]
pub fn metrics_for_resource(resource_index: usize, count: usize) -> SignalBatch<Metric> {
    let metrics = (0..count)
        .map(|i| sum_metric(&metric_name(resource_index, i), 2))
        .collect();
    metrics_batch(resource_index, metrics)
}

/// A span named `span-{resource}-{scope}-{index}`.
#[must_use]
pub fn span(resource: usize, scope: usize, index: usize) -> Span {
    Span {
        trace_id: vec![resource as u8; 16],
        span_id: vec![index as u8; 8],
        name: format!("span-{resource}-{scope}-{index}"),
        start_time_unix_nano: index as u64,
        end_time_unix_nano: index as u64 + 1,
        ..Default::default()
    }
}

/// A log record whose body is `log-{resource}-{scope}-{index}`.
#[must_use]
pub fn log_record(resource: usize, scope: usize, index: usize) -> LogRecord {
    LogRecord {
        time_unix_nano: index as u64,
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue(format!(
                "log-{resource}-{scope}-{index}"
            ))),
        }),
        ..Default::default()
    }
}

/// Body text of a generated log record.
#[must_use]
pub fn log_body(record: &LogRecord) -> Option<&str> {
    match record.body.as_ref()?.value.as_ref()? {
        any_value::Value::StringValue(body) => Some(body),
        _ => None,
    }
}

/// `resources` × `scopes` × `spans` spans.
#[must_use]
pub fn traces(resources: usize, scopes: usize, spans: usize) -> SignalBatch<Span> {
    generate(resources, scopes, spans, span)
}

/// `resources` × `scopes` × `records` log records.
#[must_use]
pub fn logs(resources: usize, scopes: usize, records: usize) -> SignalBatch<LogRecord> {
    generate(resources, scopes, records, log_record)
}

fn generate<R, F>(resources: usize, scopes: usize, records: usize, make: F) -> SignalBatch<R>
where
    R: crate::pdata::Record,
    F: Fn(usize, usize, usize) -> R,
{
    (0..resources)
        .map(|r| {
            ResourceGroup::new(
                Some(resource(&format!("resource-{r}"))),
                "",
                (0..scopes).map(|s| {
                    ScopeGroup::new(
                        Some(scope(&format!("scope-{s}"))),
                        "",
                        (0..records).map(|i| make(r, s, i)).collect::<Vec<_>>(),
                    )
                }),
            )
        })
        .collect()
}
