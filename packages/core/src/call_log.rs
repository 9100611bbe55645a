//! Append-only, thread-safe record of method calls and signal emissions.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;

use crate::path::ObjectPath;
use crate::value::Value;

/// What a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    /// An inbound method invocation.
    Method,
    /// An outbound signal emission.
    Signal,
}

/// One logged invocation or emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    /// Fractional seconds since the Unix epoch, never decreasing within a log.
    pub timestamp: f64,
    #[serde(serialize_with = "serialize_path")]
    pub path: ObjectPath,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
    pub kind: CallKind,
}

fn serialize_path<S: serde::Serializer>(path: &ObjectPath, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(path)
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<CallRecord>,
    last_timestamp: f64,
}

/// The shared call log of one server instance.
///
/// Record order is the order in which `append` acquired the log, which the
/// engine arranges to be the order calls entered it.
#[derive(Debug, Default)]
pub struct CallLog {
    inner: Mutex<Inner>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a record stamped with the current time and return a copy.
    pub fn append(
        &self,
        kind: CallKind,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        args: Vec<Value>,
    ) -> CallRecord {
        let mut inner = self.lock();
        let now = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let timestamp = now.max(inner.last_timestamp);
        inner.last_timestamp = timestamp;

        let record = CallRecord {
            timestamp,
            path: path.clone(),
            interface: interface.to_string(),
            member: member.to_string(),
            args,
            kind,
        };
        inner.records.push(record.clone());
        record
    }

    /// All records in order.
    pub fn records(&self) -> Vec<CallRecord> {
        self.lock().records.clone()
    }

    /// Method-call records for one member name, in order.
    pub fn method_calls(&self, member: &str) -> Vec<CallRecord> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.kind == CallKind::Method && r.member == member)
            .cloned()
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.lock().records.clear();
    }
}
