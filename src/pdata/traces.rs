// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Spans as records. A span is one unit; its events and links travel with it.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use prost::Message;

use super::{Record, SignalKind};

impl Record for Span {
    const SIGNAL: SignalKind = SignalKind::Traces;

    fn unit_count(&self) -> usize {
        1
    }

    /// Never reached by the splitter, since a span fits any budget. Hands
    /// the whole record over.
    fn split_front(&mut self, _n: usize) -> Self {
        std::mem::take(self)
    }

    fn encoded_len(&self) -> usize {
        Message::encoded_len(self)
    }
}

otlp_conversions! {
    record: Span,
    resource: ResourceSpans { scope_spans },
    scope: ScopeSpans { spans },
    request: ExportTraceServiceRequest { resource_spans },
}
