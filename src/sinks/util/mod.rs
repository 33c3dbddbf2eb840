pub mod backoff;
pub mod observer;
pub mod publish;
pub mod uri;

pub use backoff::{BackoffConfig, EqualJitterBackoff};
pub use observer::{MetricsObserver, NoopObserver, Observer};
pub use publish::{extract_payloads, PublishError, Publisher};
pub use uri::{make_url, strip_credentials, UriError};
