use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

mod batch;
mod value;

pub use batch::{Batch, BatchStatus, BatchStatusReceiver, EventBatch};
pub use value::Value;

/// Metadata carried alongside an event's fields but never shipped as a column
/// or document field.
#[derive(PartialEq, Debug, Clone, Default, Serialize)]
pub struct EventMetadata {
    pub timestamp: Option<DateTime<Utc>>,
    pub meta: BTreeMap<String, Value>,
}

/// A structured record produced upstream. Sinks only ever read it.
#[derive(PartialEq, Debug, Clone, Default, Serialize)]
pub struct Event {
    fields: BTreeMap<String, Value>,
    #[serde(skip)]
    metadata: EventMetadata,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a field by name.
    ///
    /// An exact top-level key wins; otherwise the name is treated as a dotted
    /// path through nested maps (`"host.name"`). `None` means the field is
    /// absent, which is different from a present `Value::Null`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.fields.get(path) {
            return Some(value);
        }

        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub const fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

impl From<BTreeMap<String, Value>> for Event {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self {
            fields,
            metadata: EventMetadata::default(),
        }
    }
}

impl From<&str> for Event {
    fn from(message: &str) -> Self {
        let mut event = Event::new();
        event.insert("message", message);
        event
    }
}

impl From<String> for Event {
    fn from(message: String) -> Self {
        let mut event = Event::new();
        event.insert("message", message);
        event
    }
}

pub(crate) fn timestamp_to_string(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
