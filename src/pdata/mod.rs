// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! In-memory telemetry buffers.
//!
//! A [`SignalBatch`] holds one signal's data as an ordered hierarchy:
//!
//! ```text
//! SignalBatch ─▶ ResourceGroup* ─▶ ScopeGroup* ─▶ Record* ─▶ unit*
//! ```
//!
//! The resource and scope levels are the same for every signal, so the
//! buffer is generic over the [`Record`] type only. Units are the finest
//! countable pieces of a signal: metric data points, spans and log records.
//!
//! Invariants maintained by this module:
//! - no resource or scope group is left without children after a mutation;
//! - `unit_count()` is cached and kept exact across `push`, `merge` and
//!   splitting, without re-walking the hierarchy.

use std::collections::VecDeque;
use std::fmt;

use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::resource::v1::Resource;
use serde::{Deserialize, Serialize};

/// Implements the OTLP conversions for one signal. The resource and scope
/// envelopes only differ in field names between signals.
macro_rules! otlp_conversions {
    (
        record: $record:ty,
        resource: $resource:ident { $scopes:ident },
        scope: $scope:ident { $records:ident },
        request: $request:ident { $resources:ident } $(,)?
    ) => {
        impl From<$scope> for $crate::pdata::ScopeGroup<$record> {
            fn from(scope: $scope) -> Self {
                Self {
                    scope: scope.scope,
                    schema_url: scope.schema_url,
                    records: scope.$records.into_iter().map(Into::into).collect(),
                }
            }
        }

        impl From<$crate::pdata::ScopeGroup<$record>> for $scope {
            fn from(group: $crate::pdata::ScopeGroup<$record>) -> Self {
                Self {
                    scope: group.scope,
                    $records: group.records.into_iter().map(Into::into).collect(),
                    schema_url: group.schema_url,
                }
            }
        }

        impl From<$resource> for $crate::pdata::ResourceGroup<$record> {
            fn from(resource: $resource) -> Self {
                Self {
                    resource: resource.resource,
                    schema_url: resource.schema_url,
                    scopes: resource.$scopes.into_iter().map(Into::into).collect(),
                }
            }
        }

        impl From<$crate::pdata::ResourceGroup<$record>> for $resource {
            fn from(group: $crate::pdata::ResourceGroup<$record>) -> Self {
                Self {
                    resource: group.resource,
                    $scopes: group.scopes.into_iter().map(Into::into).collect(),
                    schema_url: group.schema_url,
                }
            }
        }

        impl From<Vec<$resource>> for $crate::pdata::SignalBatch<$record> {
            fn from(resources: Vec<$resource>) -> Self {
                resources
                    .into_iter()
                    .map($crate::pdata::ResourceGroup::from)
                    .collect()
            }
        }

        impl From<$request> for $crate::pdata::SignalBatch<$record> {
            fn from(request: $request) -> Self {
                request.$resources.into()
            }
        }

        impl From<$crate::pdata::SignalBatch<$record>> for $request {
            fn from(batch: $crate::pdata::SignalBatch<$record>) -> Self {
                Self {
                    $resources: batch.into_iter().map(Into::into).collect(),
                }
            }
        }
    };
}

pub mod logs;
pub mod metrics;
pub mod traces;

pub use metrics::{Metric, MetricData, Temporality};

/// The three telemetry signals. Each is batched on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Metric data points.
    Metrics,
    /// Spans.
    Traces,
    /// Log records.
    Logs,
}

impl SignalKind {
    /// Lowercase name, as used in logs and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SignalKind::Metrics => "metrics",
            SignalKind::Traces => "traces",
            SignalKind::Logs => "logs",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A leaf of the hierarchy carrying zero or more units.
pub trait Record: Sized + Send + 'static {
    /// Signal this record belongs to.
    const SIGNAL: SignalKind;

    /// Number of finest-grain units in this record.
    fn unit_count(&self) -> usize;

    /// Moves the first `n` units out into a new record with the same
    /// descriptor, leaving the rest in `self` in their original order.
    ///
    /// The splitter only calls it with `0 < n < self.unit_count()`; whole
    /// records are moved instead. Single-unit records are therefore never
    /// divided and may hand themselves over whole.
    fn split_front(&mut self, n: usize) -> Self;

    /// Size of the record once encoded as OTLP protobuf.
    fn encoded_len(&self) -> usize;
}

/// Records sharing one instrumentation scope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScopeGroup<R> {
    /// Instrumentation scope, opaque to the batcher.
    pub scope: Option<InstrumentationScope>,
    /// Schema URL of the scope.
    pub schema_url: String,
    /// Records in arrival order.
    pub records: VecDeque<R>,
}

impl<R: Record> ScopeGroup<R> {
    /// Creates a scope group from its descriptor and records.
    pub fn new(
        scope: Option<InstrumentationScope>,
        schema_url: impl Into<String>,
        records: impl IntoIterator<Item = R>,
    ) -> Self {
        Self {
            scope,
            schema_url: schema_url.into(),
            records: records.into_iter().collect(),
        }
    }

    /// Total units of every record.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.records.iter().map(Record::unit_count).sum()
    }

    /// Same descriptor, no records.
    #[must_use]
    pub(crate) fn empty_like(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            schema_url: self.schema_url.clone(),
            records: VecDeque::new(),
        }
    }

    pub(crate) fn same_identity(&self, other: &Self) -> bool {
        self.schema_url == other.schema_url && self.scope == other.scope
    }
}

/// Scope groups sharing one resource.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceGroup<R> {
    /// Resource attributes, opaque to the batcher.
    pub resource: Option<Resource>,
    /// Schema URL of the resource.
    pub schema_url: String,
    /// Scope groups in arrival order.
    pub scopes: VecDeque<ScopeGroup<R>>,
}

impl<R: Record> ResourceGroup<R> {
    /// Creates a resource group from its descriptor and scope groups.
    pub fn new(
        resource: Option<Resource>,
        schema_url: impl Into<String>,
        scopes: impl IntoIterator<Item = ScopeGroup<R>>,
    ) -> Self {
        Self {
            resource,
            schema_url: schema_url.into(),
            scopes: scopes.into_iter().collect(),
        }
    }

    /// Total units below this resource.
    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.scopes.iter().map(ScopeGroup::unit_count).sum()
    }

    /// Same descriptor, no scopes.
    #[must_use]
    pub(crate) fn empty_like(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            schema_url: self.schema_url.clone(),
            scopes: VecDeque::new(),
        }
    }

    pub(crate) fn same_identity(&self, other: &Self) -> bool {
        self.schema_url == other.schema_url && self.resource == other.resource
    }

    /// Drops scope groups without records.
    fn prune(&mut self) {
        self.scopes.retain(|scope| !scope.records.is_empty());
    }
}

/// One signal's buffered data.
///
/// Groups are only reachable immutably from outside the crate so that the
/// cached unit count cannot drift from the contents.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalBatch<R> {
    resources: VecDeque<ResourceGroup<R>>,
    units: usize,
}

impl<R> Default for SignalBatch<R> {
    fn default() -> Self {
        Self {
            resources: VecDeque::new(),
            units: 0,
        }
    }
}

impl<R: Record> SignalBatch<R> {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal carried by this batch.
    #[must_use]
    pub const fn signal(&self) -> SignalKind {
        R::SIGNAL
    }

    /// Appends a resource group as-is, dropping any empty shells inside it.
    pub fn push(&mut self, mut group: ResourceGroup<R>) {
        group.prune();
        if group.scopes.is_empty() {
            return;
        }
        self.units += group.unit_count();
        self.resources.push_back(group);
    }

    /// Moves every group of `other` into this batch.
    ///
    /// When the first incoming resource (or scope) has the same identity as
    /// the current tail, its children are appended to the tail instead of
    /// opening a duplicate group. Leaf data is moved, never copied.
    pub fn merge(&mut self, mut other: SignalBatch<R>) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }
        self.units += other.units;

        if let (Some(tail), Some(head)) = (self.resources.back_mut(), other.resources.front())
        {
            if tail.same_identity(head) {
                if let Some(mut head) = other.resources.pop_front() {
                    merge_scopes(tail, &mut head);
                }
            }
        }
        self.resources.append(&mut other.resources);
    }

    /// Resource groups in order.
    #[must_use]
    pub fn resources(&self) -> &VecDeque<ResourceGroup<R>> {
        &self.resources
    }

    /// Number of resource groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// True iff no groups remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Total finest-grain units. O(1).
    #[must_use]
    pub const fn unit_count(&self) -> usize {
        self.units
    }

    /// Number of records (metrics, spans, log records), counted by walking.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.resources
            .iter()
            .flat_map(|resource| resource.scopes.iter())
            .map(|scope| scope.records.len())
            .sum()
    }

    /// Iterates every record in order.
    pub fn records(&self) -> impl Iterator<Item = &R> {
        self.resources
            .iter()
            .flat_map(|resource| resource.scopes.iter())
            .flat_map(|scope| scope.records.iter())
    }

    /// OTLP-encoded size of the batch's records. Group envelopes are not
    /// included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.records().map(Record::encoded_len).sum()
    }

    pub(crate) fn resources_mut(&mut self) -> &mut VecDeque<ResourceGroup<R>> {
        &mut self.resources
    }

    pub(crate) fn push_counted(&mut self, group: ResourceGroup<R>, units: usize) {
        self.units += units;
        self.resources.push_back(group);
    }

    pub(crate) fn remove_units(&mut self, units: usize) {
        debug_assert!(units <= self.units);
        self.units -= units;
    }
}

impl<R: Record> FromIterator<ResourceGroup<R>> for SignalBatch<R> {
    fn from_iter<I: IntoIterator<Item = ResourceGroup<R>>>(iter: I) -> Self {
        let mut batch = SignalBatch::new();
        for group in iter {
            batch.push(group);
        }
        batch
    }
}

impl<R: Record> IntoIterator for SignalBatch<R> {
    type Item = ResourceGroup<R>;
    type IntoIter = std::collections::vec_deque::IntoIter<ResourceGroup<R>>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

fn merge_scopes<R: Record>(tail: &mut ResourceGroup<R>, head: &mut ResourceGroup<R>) {
    if let (Some(tail_scope), Some(head_scope)) = (tail.scopes.back_mut(), head.scopes.front()) {
        if tail_scope.same_identity(head_scope) {
            if let Some(mut head_scope) = head.scopes.pop_front() {
                tail_scope.records.append(&mut head_scope.records);
            }
        }
    }
    tail.scopes.append(&mut head.scopes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, resource, scope};
    use opentelemetry_proto::tonic::logs::v1::LogRecord;

    #[test]
    fn push_drops_empty_shells() {
        let mut batch: SignalBatch<LogRecord> = SignalBatch::new();
        batch.push(ResourceGroup::new(Some(resource("a")), "", Vec::new()));
        batch.push(ResourceGroup::new(
            Some(resource("b")),
            "",
            vec![ScopeGroup::new(Some(scope("s")), "", Vec::new())],
        ));

        assert!(batch.is_empty());
        assert_eq!(batch.unit_count(), 0);
    }

    #[test]
    fn merge_appends_into_matching_tail() {
        let mut batch = testing::logs(1, 1, 3);
        let other = testing::logs(1, 1, 2);

        batch.merge(other);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.resources()[0].scopes.len(), 1);
        assert_eq!(batch.resources()[0].scopes[0].records.len(), 5);
        assert_eq!(batch.unit_count(), 5);
    }

    #[test]
    fn merge_keeps_distinct_resources_apart() {
        let mut batch = testing::logs(1, 1, 3);
        let mut other = SignalBatch::new();
        other.push(ResourceGroup::new(
            Some(resource("elsewhere")),
            "",
            vec![ScopeGroup::new(
                Some(scope("scope-0")),
                "",
                vec![testing::log_record(0, 0, 0)],
            )],
        ));

        batch.merge(other);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.unit_count(), 4);
        assert_eq!(batch.record_count(), 4);
    }

    #[test]
    fn merge_opens_new_scope_under_matching_resource() {
        let mut batch = testing::logs(1, 1, 2);
        let mut other = SignalBatch::new();
        other.push(ResourceGroup::new(
            Some(resource("resource-0")),
            "",
            vec![ScopeGroup::new(
                Some(scope("other-scope")),
                "",
                vec![testing::log_record(0, 0, 9)],
            )],
        ));

        batch.merge(other);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.resources()[0].scopes.len(), 2);
        assert_eq!(batch.unit_count(), 3);
    }

    #[test]
    fn merge_into_empty_moves_whole_batch() {
        let mut batch = SignalBatch::new();
        let other = testing::metrics_same_resource(4);
        let expected = other.clone();

        batch.merge(other);

        assert_eq!(batch, expected);
        assert_eq!(batch.unit_count(), 8);
    }

    #[test]
    fn signal_kind_names() {
        assert_eq!(SignalKind::Metrics.to_string(), "metrics");
        assert_eq!(
            serde_json::to_string(&SignalKind::Traces).unwrap(),
            "\"traces\""
        );
    }
}
