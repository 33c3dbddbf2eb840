mod clickhouse;
mod http;
mod http_client;
mod prelude;
mod publish;

pub use self::clickhouse::*;
pub use self::http::*;
pub use self::http_client::*;
pub use self::publish::*;

/// Something worth logging and counting that happened inside a sink.
pub trait InternalEvent {
    fn emit_logs(&self) {}
    fn emit_metrics(&self) {}
}

pub fn emit(event: impl InternalEvent) {
    event.emit_logs();
    event.emit_metrics();
}

#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::internal_events::emit($event)
    };
}
