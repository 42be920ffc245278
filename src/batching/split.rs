// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Size-bounded splitting of a [`SignalBatch`].
//!
//! [`split`] carves at most `max_units` units off the front of a batch:
//! resource groups, then scope groups, then records are visited in order and
//! whole records are moved while they fit. The record that straddles the
//! limit is divided, its earliest units going out and the rest staying
//! behind. Only the groups actually visited are touched, so draining a large
//! batch with repeated calls is linear overall.

use crate::pdata::{Record, ResourceGroup, ScopeGroup, SignalBatch};

/// Moves up to `max_units` units from the front of `batch` into a new batch.
///
/// When `max_units` is zero or covers the whole batch, the batch itself is
/// returned and `batch` is left empty. Neither the output nor the remainder
/// ever contains a group without children.
pub fn split<R: Record>(max_units: usize, batch: &mut SignalBatch<R>) -> SignalBatch<R> {
    if max_units == 0 || max_units >= batch.unit_count() {
        return std::mem::take(batch);
    }

    let mut out = SignalBatch::new();
    let mut budget = max_units;
    let resources = batch.resources_mut();

    while budget > 0 {
        let Some(resource) = resources.front_mut() else {
            break;
        };
        let budget_before = budget;
        let mut out_resource: Option<ResourceGroup<R>> = None;

        while budget > 0 {
            let Some(scope) = resource.scopes.front_mut() else {
                break;
            };
            let out_scope = take_records(scope, &mut budget);
            let scope_drained = scope.records.is_empty();

            if let Some(out_scope) = out_scope {
                out_resource
                    .get_or_insert_with(|| resource.empty_like())
                    .scopes
                    .push_back(out_scope);
            }
            if scope_drained {
                let _ = resource.scopes.pop_front();
            }
        }

        let resource_drained = resource.scopes.is_empty();
        if let Some(out_resource) = out_resource {
            out.push_counted(out_resource, budget_before - budget);
        }
        if resource_drained {
            let _ = resources.pop_front();
        }
    }

    batch.remove_units(max_units - budget);
    out
}

/// Takes records from the front of `scope` until `budget` is spent or the
/// scope is empty. Returns `None` when nothing was taken.
fn take_records<R: Record>(scope: &mut ScopeGroup<R>, budget: &mut usize) -> Option<ScopeGroup<R>> {
    let mut out: Option<ScopeGroup<R>> = None;

    while *budget > 0 {
        let Some(record) = scope.records.front_mut() else {
            break;
        };
        let units = record.unit_count();
        let taken = if units <= *budget {
            *budget -= units;
            match scope.records.pop_front() {
                Some(record) => record,
                None => break,
            }
        } else {
            let front = record.split_front(*budget);
            *budget = 0;
            front
        };
        out.get_or_insert_with(|| scope.empty_like())
            .records
            .push_back(taken);
    }

    out
}

/// Drains a batch into consecutive splits of at most `max_units` units.
///
/// A `max_units` of zero yields the whole batch once.
#[derive(Debug)]
pub struct Splits<R> {
    batch: SignalBatch<R>,
    max_units: usize,
}

impl<R: Record> Splits<R> {
    /// Starts draining `batch`.
    #[must_use]
    pub fn new(batch: SignalBatch<R>, max_units: usize) -> Self {
        Self { batch, max_units }
    }

    /// What has not been yielded yet.
    #[must_use]
    pub fn remaining(&self) -> &SignalBatch<R> {
        &self.batch
    }
}

impl<R: Record> Iterator for Splits<R> {
    type Item = SignalBatch<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch.is_empty() {
            return None;
        }
        Some(split(self.max_units, &mut self.batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdata::{Metric, MetricData, Temporality};
    use crate::testing::{self, metric_name};
    use opentelemetry_proto::tonic::logs::v1::LogRecord;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn names(batch: &SignalBatch<Metric>) -> Vec<String> {
        batch.records().map(|m| m.name().to_string()).collect()
    }

    fn assert_no_empty_shells<R: Record>(batch: &SignalBatch<R>) {
        for resource in batch.resources() {
            assert!(!resource.scopes.is_empty(), "empty resource group");
            for scope in &resource.scopes {
                assert!(!scope.records.is_empty(), "empty scope group");
            }
        }
    }

    fn walked_units<R: Record>(batch: &SignalBatch<R>) -> usize {
        batch.records().map(Record::unit_count).sum()
    }

    #[test]
    fn split_size_covering_batch_moves_it_whole() {
        let mut md = testing::metrics_same_resource(20);
        let original = md.clone();

        let out = split(40, &mut md);

        assert_eq!(out, original);
        assert!(md.is_empty());
        assert_eq!(md.unit_count(), 0);
    }

    #[test]
    fn zero_max_means_unbounded() {
        let mut md = testing::metrics_same_resource(3);
        let original = md.clone();

        assert_eq!(split(0, &mut md), original);
        assert!(md.is_empty());
    }

    #[test]
    fn splits_whole_metrics_in_order() {
        let mut md = testing::metrics_same_resource(20);

        for round in 0..4 {
            let out = split(10, &mut md);
            assert_eq!(out.record_count(), 5);
            assert_eq!(out.unit_count(), 10);
            assert_eq!(md.record_count(), 15 - round * 5);
            assert_eq!(md.unit_count(), 30 - round * 10);
            let expected: Vec<_> = (round * 5..round * 5 + 5).map(|i| metric_name(0, i)).collect();
            assert_eq!(names(&out), expected);
            for metric in out.records() {
                assert_eq!(metric.unit_count(), 2);
            }
        }
        assert!(md.is_empty());
    }

    #[test]
    fn first_split_carries_resource_and_scope() {
        let mut md = testing::metrics_same_resource(20);
        let expected_resource = md.resources()[0].resource.clone();
        let expected_scope = md.resources()[0].scopes[0].scope.clone();

        let out = split(10, &mut md);

        assert_eq!(out.len(), 1);
        assert_eq!(out.resources()[0].resource, expected_resource);
        assert_eq!(out.resources()[0].scopes[0].scope, expected_scope);
        assert_eq!(md.resources()[0].resource, expected_resource);
    }

    #[test]
    fn split_spans_resource_boundary() {
        let mut md = testing::metrics_same_resource(20);
        md.merge(testing::metrics_for_resource(1, 20));
        assert_eq!(md.len(), 2);

        let out = split(25 * 2, &mut md);

        assert_eq!(out.record_count(), 25);
        assert_eq!(md.record_count(), 15);
        assert_eq!(md.len(), 1);
        assert_eq!(out.len(), 2);
        let first = &out.resources()[0];
        let second = &out.resources()[1];
        assert_eq!(first.resource, Some(testing::resource("resource-0")));
        assert_eq!(second.resource, Some(testing::resource("resource-1")));
        assert_eq!(first.scopes[0].records.len(), 20);
        assert_eq!(second.scopes[0].records.len(), 5);
        assert_eq!(first.scopes[0].records[19].name(), metric_name(0, 19));
        assert_eq!(second.scopes[0].records[4].name(), metric_name(1, 4));
        assert_eq!(md.resources()[0].resource, Some(testing::resource("resource-1")));
        assert_eq!(
            md.resources()[0].scopes[0].records[0].name(),
            metric_name(1, 5)
        );
    }

    #[test]
    fn split_spans_scope_boundary() {
        let mut md = testing::metrics_same_resource(20);
        let mut group = md.resources()[0].clone();
        let mut second_scope = group.scopes[0].clone();
        second_scope.scope = Some(testing::scope("scope-1"));
        for metric in second_scope.records.iter_mut() {
            let renamed = metric.name().replace("-0-", "-2-");
            metric.set_name(renamed);
        }
        group.scopes = vec![second_scope].into();
        md.merge(std::iter::once(group).collect());
        assert_eq!(md.len(), 1);
        assert_eq!(md.resources()[0].scopes.len(), 2);

        let out = split(30 * 2, &mut md);

        assert_eq!(out.record_count(), 30);
        assert_eq!(out.resources()[0].scopes.len(), 2);
        assert_eq!(md.record_count(), 10);
        assert_eq!(md.resources()[0].scopes.len(), 1);
        assert_eq!(md.resources()[0].scopes[0].records[0].name(), metric_name(2, 10));
    }

    #[test]
    fn uneven_split_divides_metrics() {
        let mut md = testing::metrics_same_resource(10);

        let out = split(9, &mut md);
        assert_eq!(out.record_count(), 5);
        assert_eq!(out.unit_count(), 9);
        assert_eq!(md.record_count(), 6);
        assert_eq!(names(&out).first(), Some(&metric_name(0, 0)));
        assert_eq!(names(&out).last(), Some(&metric_name(0, 4)));
        assert_eq!(out.records().last().map(Record::unit_count), Some(1));

        let out = split(9, &mut md);
        assert_eq!(out.record_count(), 5);
        assert_eq!(out.unit_count(), 9);
        assert_eq!(md.record_count(), 1);
        assert_eq!(names(&out).first(), Some(&metric_name(0, 4)));
        assert_eq!(names(&out).last(), Some(&metric_name(0, 8)));

        let out = split(9, &mut md);
        assert_eq!(out.record_count(), 1);
        assert_eq!(out.unit_count(), 2);
        assert_eq!(names(&out), vec![metric_name(0, 9)]);
        assert!(md.is_empty());
    }

    #[test]
    fn divided_metric_keeps_point_order() {
        let mut md = testing::metrics_same_resource(1);

        let first = split(1, &mut md);
        let second = split(1, &mut md);

        let time = |batch: &SignalBatch<Metric>| match batch.records().next().map(Metric::data) {
            Some(MetricData::Sum { points, .. }) => points[0].time_unix_nano,
            other => panic!("unexpected payload {other:?}"),
        };
        assert_eq!(time(&first), 0);
        assert_eq!(time(&second), 1);
        assert!(md.is_empty());
    }

    #[test]
    fn descriptors_survive_splitting_every_kind() {
        let metrics = testing::all_kinds_metrics();
        let originals = metrics.clone();
        let mut md = testing::metrics_batch(0, metrics);

        let outputs: Vec<_> = Splits::new(md.clone(), 1).collect();
        assert_eq!(outputs.len(), 14);

        for (i, out) in outputs.iter().enumerate() {
            assert_eq!(out.unit_count(), 1);
            assert_eq!(out.record_count(), 1);
            let piece = out.records().next().expect("one record");
            let original = &originals[i / 2];
            assert_eq!(piece.descriptor(), original.descriptor());
            assert_eq!(piece.data().kind(), original.data().kind());
            match (piece.data(), original.data()) {
                (
                    MetricData::Sum {
                        temporality,
                        monotonic,
                        ..
                    },
                    MetricData::Sum {
                        temporality: expected_temporality,
                        monotonic: expected_monotonic,
                        ..
                    },
                ) => {
                    assert_eq!(temporality, expected_temporality);
                    assert_eq!(*temporality, Temporality::Cumulative);
                    assert_eq!(monotonic, expected_monotonic);
                    assert!(*monotonic);
                }
                (
                    MetricData::Histogram { temporality, .. },
                    MetricData::Histogram {
                        temporality: expected,
                        ..
                    },
                )
                | (
                    MetricData::ExponentialHistogram { temporality, .. },
                    MetricData::ExponentialHistogram {
                        temporality: expected,
                        ..
                    },
                ) => assert_eq!(temporality, expected),
                _ => {}
            }
        }

        // Pairs of two points: each split finishes one metric and starts the next.
        let first = split(1, &mut md);
        assert_eq!(first.record_count(), 1);
        assert_eq!(md.record_count(), 7);
        for remaining in (1..=6).rev() {
            let out = split(2, &mut md);
            assert_eq!(out.record_count(), 2);
            assert_eq!(out.unit_count(), 2);
            assert_eq!(md.record_count(), remaining);
        }
        let last = split(2, &mut md);
        assert_eq!(last.unit_count(), 1);
        assert_eq!(names(&last), vec![metric_name(0, 6)]);
        assert!(md.is_empty());
    }

    #[test]
    fn max_smaller_than_metric_splits_points() {
        let mut md = testing::metrics_same_resource(2);
        let expected = [
            (metric_name(0, 0), 2),
            (metric_name(0, 0), 1),
            (metric_name(0, 1), 1),
            (metric_name(0, 1), 0),
        ];

        for (name, remaining) in expected {
            let out = split(1, &mut md);
            assert_eq!(out.record_count(), 1);
            let metric = out.records().next().expect("one record");
            assert_eq!(metric.name(), name);
            match metric.data() {
                MetricData::Sum {
                    temporality,
                    monotonic,
                    ..
                } => {
                    assert_eq!(*temporality, Temporality::Cumulative);
                    assert!(*monotonic);
                }
                other => panic!("unexpected payload {other:?}"),
            }
            assert_eq!(md.record_count(), remaining);
        }
        assert!(md.is_empty());
    }

    #[test]
    fn zero_point_metrics_travel_with_neighbours() {
        let mut md = testing::metrics_batch(
            0,
            vec![
                testing::sum_metric("a", 2),
                Metric::new("empty", "", "", MetricData::Empty),
                testing::sum_metric("b", 2),
            ],
        );
        assert_eq!(md.unit_count(), 4);

        let out = split(3, &mut md);

        assert_eq!(names(&out), vec!["a", "empty", "b"]);
        assert_eq!(out.unit_count(), 3);
        assert_eq!(md.unit_count(), 1);
        assert_eq!(names(&md), vec!["b"]);
    }

    #[test]
    fn logs_split_across_scopes() {
        let mut ld = testing::logs(2, 2, 3);
        let out = split(4, &mut ld);

        assert_eq!(out.unit_count(), 4);
        assert_eq!(out.len(), 1);
        assert_eq!(out.resources()[0].scopes.len(), 2);
        let bodies: Vec<_> = out.records().filter_map(testing::log_body).collect();
        assert_eq!(
            bodies,
            vec!["log-0-0-0", "log-0-0-1", "log-0-0-2", "log-0-1-0"]
        );
        assert_eq!(ld.unit_count(), 8);
        assert_eq!(
            ld.records().next().and_then(testing::log_body),
            Some("log-0-1-1")
        );
    }

    #[test]
    fn splits_converge() {
        for (total_metrics, max) in [(10, 9), (20, 10), (7, 3), (1, 1), (13, 100)] {
            let md = testing::metrics_same_resource(total_metrics);
            let units = md.unit_count();
            let outputs: Vec<_> = Splits::new(md, max).collect();

            assert_eq!(outputs.len(), units.div_ceil(max));
            let (last, full) = outputs.split_last().expect("at least one split");
            for out in full {
                assert_eq!(out.unit_count(), max);
            }
            assert!(last.unit_count() <= max);
            assert_eq!(
                outputs.iter().map(SignalBatch::unit_count).sum::<usize>(),
                units
            );
        }
    }

    #[test]
    fn random_splits_conserve_and_preserve_order() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..50 {
            let resources = rng.random_range(1..4);
            let scopes = rng.random_range(1..4);
            let records = rng.random_range(1..6);
            let mut ld: SignalBatch<LogRecord> = testing::logs(resources, scopes, records);
            let expected: Vec<String> = ld
                .records()
                .filter_map(testing::log_body)
                .map(str::to_string)
                .collect();

            let mut seen = Vec::new();
            while !ld.is_empty() {
                let before = ld.unit_count();
                let max = rng.random_range(1..8);
                let out = split(max, &mut ld);

                assert_eq!(out.unit_count() + ld.unit_count(), before);
                assert_eq!(out.unit_count(), walked_units(&out));
                assert_eq!(ld.unit_count(), walked_units(&ld));
                assert!(out.unit_count() <= max);
                assert_no_empty_shells(&out);
                assert_no_empty_shells(&ld);
                seen.extend(out.records().filter_map(testing::log_body).map(str::to_string));
            }
            assert_eq!(seen, expected);
        }
    }

    #[test]
    fn random_metric_splits_conserve_points() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..50 {
            let mut md = SignalBatch::new();
            for r in 0..rng.random_range(1..4) {
                let metrics = (0..rng.random_range(1..5))
                    .map(|i| testing::sum_metric(&metric_name(r, i), rng.random_range(0..5)))
                    .collect();
                md.merge(testing::metrics_batch(r, metrics));
            }

            while !md.is_empty() {
                let before = md.unit_count();
                let max = rng.random_range(1..6);
                let out = split(max, &mut md);

                assert_eq!(out.unit_count() + md.unit_count(), before);
                assert_eq!(out.unit_count(), walked_units(&out));
                assert_eq!(md.unit_count(), walked_units(&md));
                assert_no_empty_shells(&out);
                assert_no_empty_shells(&md);
            }
        }
    }
}
