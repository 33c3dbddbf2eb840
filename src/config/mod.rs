use std::{fmt, sync::Arc};

use crate::sinks::{
    util::{MetricsObserver, Observer},
    Group,
};

mod loading;

pub use loading::{load_from_str, Config};

/// A sink configuration, registered under its sink type name.
#[typetag::serde(tag = "type")]
pub trait SinkConfig: core::fmt::Debug + Send + Sync {
    /// Validates the configuration and constructs the sink's clients.
    fn build(&self, cx: SinkContext) -> crate::Result<Group>;

    fn sink_type(&self) -> &'static str;
}

/// What the surrounding pipeline provides to a sink at build time.
#[derive(Clone, Default)]
pub struct SinkContext {
    pub observer: Option<Arc<dyn Observer>>,
}

impl SinkContext {
    #[cfg(test)]
    pub fn new_test() -> Self {
        Self {
            observer: Some(Arc::new(crate::sinks::util::NoopObserver)),
        }
    }

    pub fn with_observer(observer: Arc<dyn Observer>) -> Self {
        Self {
            observer: Some(observer),
        }
    }

    /// The configured observer, or one that reports `metrics` counters
    /// labelled with `sink`.
    pub fn observer(&self, sink: &'static str) -> Arc<dyn Observer> {
        match &self.observer {
            Some(observer) => Arc::clone(observer),
            None => Arc::new(MetricsObserver::new(sink)),
        }
    }
}

impl fmt::Debug for SinkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkContext")
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

pub(crate) const fn default_true() -> bool {
    true
}
