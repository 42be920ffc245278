// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Log records. Each record is one unit.

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use prost::Message;

use super::{Record, SignalKind};

impl Record for LogRecord {
    const SIGNAL: SignalKind = SignalKind::Logs;

    fn unit_count(&self) -> usize {
        1
    }

    /// Never reached by the splitter, since a log record fits any budget. Hands
    /// the whole record over.
    fn split_front(&mut self, _n: usize) -> Self {
        std::mem::take(self)
    }

    fn encoded_len(&self) -> usize {
        Message::encoded_len(self)
    }
}

otlp_conversions! {
    record: LogRecord,
    resource: ResourceLogs { scope_logs },
    scope: ScopeLogs { log_records },
    request: ExportLogsServiceRequest { resource_logs },
}
