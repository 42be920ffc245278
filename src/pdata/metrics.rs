// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metric records.
//!
//! A [`Metric`] is the OTLP metric descriptor (name, description, unit,
//! metadata) plus a [`MetricData`] payload tagged by kind. Splitting only
//! ever touches the payload's data points; the descriptor and the
//! kind-specific fields (temporality, monotonicity) are copied verbatim into
//! every piece.

use std::collections::VecDeque;

use num_enum::{FromPrimitive, IntoPrimitive};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, ExponentialHistogram, ExponentialHistogramDataPoint, Gauge, Histogram,
    HistogramDataPoint, Metric as ProtoMetric, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum,
    Summary, SummaryDataPoint,
};
use prost::encoding::{bool as pb_bool, encoded_len_varint, int32, key_len, message};
use prost::Message;

use super::{Record, SignalKind};

// Field numbers from opentelemetry/proto/metrics/v1/metrics.proto.
const GAUGE_TAG: u32 = 5;
const SUM_TAG: u32 = 7;
const HISTOGRAM_TAG: u32 = 9;
const EXPONENTIAL_HISTOGRAM_TAG: u32 = 10;
const SUMMARY_TAG: u32 = 11;
const DATA_POINTS_TAG: u32 = 1;
const TEMPORALITY_TAG: u32 = 2;
const MONOTONIC_TAG: u32 = 3;

/// Aggregation temporality of sums and histograms.
///
/// Values outside the OTLP enum are kept as `Unknown` so they survive a
/// round trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum Temporality {
    /// AGGREGATION_TEMPORALITY_UNSPECIFIED
    Unspecified = 0,
    /// AGGREGATION_TEMPORALITY_DELTA
    Delta = 1,
    /// AGGREGATION_TEMPORALITY_CUMULATIVE
    Cumulative = 2,
    /// Any other wire value.
    #[num_enum(catch_all)]
    Unknown(i32),
}

/// The kind-specific payload of a metric.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricData {
    /// No payload was set on the metric.
    Empty,
    /// Gauge points.
    Gauge {
        /// Data points in arrival order.
        points: VecDeque<NumberDataPoint>,
    },
    /// Sum points.
    Sum {
        /// Aggregation temporality.
        temporality: Temporality,
        /// Whether the sum is monotonic.
        monotonic: bool,
        /// Data points in arrival order.
        points: VecDeque<NumberDataPoint>,
    },
    /// Explicit-bucket histogram points.
    Histogram {
        /// Aggregation temporality.
        temporality: Temporality,
        /// Data points in arrival order.
        points: VecDeque<HistogramDataPoint>,
    },
    /// Exponential histogram points.
    ExponentialHistogram {
        /// Aggregation temporality.
        temporality: Temporality,
        /// Data points in arrival order.
        points: VecDeque<ExponentialHistogramDataPoint>,
    },
    /// Summary points.
    Summary {
        /// Data points in arrival order.
        points: VecDeque<SummaryDataPoint>,
    },
}

impl MetricData {
    /// Name of the kind, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            MetricData::Empty => "empty",
            MetricData::Gauge { .. } => "gauge",
            MetricData::Sum { .. } => "sum",
            MetricData::Histogram { .. } => "histogram",
            MetricData::ExponentialHistogram { .. } => "exponential_histogram",
            MetricData::Summary { .. } => "summary",
        }
    }

    /// Number of data points.
    #[must_use]
    pub fn point_count(&self) -> usize {
        match self {
            MetricData::Empty => 0,
            MetricData::Gauge { points } | MetricData::Sum { points, .. } => points.len(),
            MetricData::Histogram { points, .. } => points.len(),
            MetricData::ExponentialHistogram { points, .. } => points.len(),
            MetricData::Summary { points } => points.len(),
        }
    }

    /// Moves the first `n` points into a payload of the same kind.
    fn split_front(&mut self, n: usize) -> Self {
        match self {
            MetricData::Empty => MetricData::Empty,
            MetricData::Gauge { points } => MetricData::Gauge {
                points: take_front(points, n),
            },
            MetricData::Sum {
                temporality,
                monotonic,
                points,
            } => MetricData::Sum {
                temporality: *temporality,
                monotonic: *monotonic,
                points: take_front(points, n),
            },
            MetricData::Histogram {
                temporality,
                points,
            } => MetricData::Histogram {
                temporality: *temporality,
                points: take_front(points, n),
            },
            MetricData::ExponentialHistogram {
                temporality,
                points,
            } => MetricData::ExponentialHistogram {
                temporality: *temporality,
                points: take_front(points, n),
            },
            MetricData::Summary { points } => MetricData::Summary {
                points: take_front(points, n),
            },
        }
    }

    /// Length of the `data` oneof field inside an encoded metric.
    fn encoded_len(&self) -> usize {
        let (tag, inner) = match self {
            MetricData::Empty => return 0,
            MetricData::Gauge { points } => (GAUGE_TAG, points_len(points)),
            MetricData::Sum {
                temporality,
                monotonic,
                points,
            } => (
                SUM_TAG,
                points_len(points) + temporality_len(*temporality) + monotonic_len(*monotonic),
            ),
            MetricData::Histogram {
                temporality,
                points,
            } => (
                HISTOGRAM_TAG,
                points_len(points) + temporality_len(*temporality),
            ),
            MetricData::ExponentialHistogram {
                temporality,
                points,
            } => (
                EXPONENTIAL_HISTOGRAM_TAG,
                points_len(points) + temporality_len(*temporality),
            ),
            MetricData::Summary { points } => (SUMMARY_TAG, points_len(points)),
        };
        key_len(tag) + encoded_len_varint(inner as u64) + inner
    }
}

impl From<Option<Data>> for MetricData {
    fn from(data: Option<Data>) -> Self {
        match data {
            None => MetricData::Empty,
            Some(Data::Gauge(gauge)) => MetricData::Gauge {
                points: gauge.data_points.into(),
            },
            Some(Data::Sum(sum)) => MetricData::Sum {
                temporality: Temporality::from(sum.aggregation_temporality),
                monotonic: sum.is_monotonic,
                points: sum.data_points.into(),
            },
            Some(Data::Histogram(histogram)) => MetricData::Histogram {
                temporality: Temporality::from(histogram.aggregation_temporality),
                points: histogram.data_points.into(),
            },
            Some(Data::ExponentialHistogram(histogram)) => MetricData::ExponentialHistogram {
                temporality: Temporality::from(histogram.aggregation_temporality),
                points: histogram.data_points.into(),
            },
            Some(Data::Summary(summary)) => MetricData::Summary {
                points: summary.data_points.into(),
            },
        }
    }
}

impl From<MetricData> for Option<Data> {
    fn from(data: MetricData) -> Self {
        match data {
            MetricData::Empty => None,
            MetricData::Gauge { points } => Some(Data::Gauge(Gauge {
                data_points: points.into(),
            })),
            MetricData::Sum {
                temporality,
                monotonic,
                points,
            } => Some(Data::Sum(Sum {
                data_points: points.into(),
                aggregation_temporality: temporality.into(),
                is_monotonic: monotonic,
            })),
            MetricData::Histogram {
                temporality,
                points,
            } => Some(Data::Histogram(Histogram {
                data_points: points.into(),
                aggregation_temporality: temporality.into(),
            })),
            MetricData::ExponentialHistogram {
                temporality,
                points,
            } => Some(Data::ExponentialHistogram(ExponentialHistogram {
                data_points: points.into(),
                aggregation_temporality: temporality.into(),
            })),
            MetricData::Summary { points } => Some(Data::Summary(Summary {
                data_points: points.into(),
            })),
        }
    }
}

/// A metric: descriptor header plus kind-specific payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    /// The OTLP metric with its `data` field cleared.
    descriptor: ProtoMetric,
    data: MetricData,
}

impl Metric {
    /// Creates a metric from its descriptor fields and payload.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        data: MetricData,
    ) -> Self {
        Self {
            descriptor: ProtoMetric {
                name: name.into(),
                description: description.into(),
                unit: unit.into(),
                ..Default::default()
            },
            data,
        }
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Metric description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    /// Metric unit.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.descriptor.unit
    }

    /// Every descriptor field; `data` is always `None` here.
    #[must_use]
    pub fn descriptor(&self) -> &ProtoMetric {
        &self.descriptor
    }

    /// The payload.
    #[must_use]
    pub fn data(&self) -> &MetricData {
        &self.data
    }

    /// Renames the metric.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.descriptor.name = name.into();
    }
}

impl From<ProtoMetric> for Metric {
    fn from(mut metric: ProtoMetric) -> Self {
        let data = metric.data.take().into();
        Self {
            descriptor: metric,
            data,
        }
    }
}

impl From<Metric> for ProtoMetric {
    fn from(metric: Metric) -> Self {
        let Metric {
            descriptor: mut proto,
            data,
        } = metric;
        proto.data = data.into();
        proto
    }
}

impl Record for Metric {
    const SIGNAL: SignalKind = SignalKind::Metrics;

    fn unit_count(&self) -> usize {
        self.data.point_count()
    }

    fn split_front(&mut self, n: usize) -> Self {
        debug_assert!(n > 0 && n < self.unit_count());
        Self {
            descriptor: self.descriptor.clone(),
            data: self.data.split_front(n),
        }
    }

    fn encoded_len(&self) -> usize {
        self.descriptor.encoded_len() + self.data.encoded_len()
    }
}

otlp_conversions! {
    record: Metric,
    resource: ResourceMetrics { scope_metrics },
    scope: ScopeMetrics { metrics },
    request: ExportMetricsServiceRequest { resource_metrics },
}

fn take_front<P>(points: &mut VecDeque<P>, n: usize) -> VecDeque<P> {
    points.drain(..n).collect()
}

fn points_len<M: Message>(points: &VecDeque<M>) -> usize {
    points
        .iter()
        .map(|point| message::encoded_len(DATA_POINTS_TAG, point))
        .sum()
}

fn temporality_len(temporality: Temporality) -> usize {
    let value: i32 = temporality.into();
    if value == 0 {
        0
    } else {
        int32::encoded_len(TEMPORALITY_TAG, &value)
    }
}

fn monotonic_len(monotonic: bool) -> usize {
    if monotonic {
        pb_bool::encoded_len(MONOTONIC_TAG, &monotonic)
    } else {
        0
    }
}
