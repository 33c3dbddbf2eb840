use std::time::Duration;

use metrics::counter;

use super::{
    prelude::{error_stage, error_type},
    InternalEvent,
};

#[derive(Debug)]
pub struct EventsDropped<'a> {
    pub sink: &'a str,
    pub count: usize,
    pub reason: &'static str,
}

impl InternalEvent for EventsDropped<'_> {
    fn emit_logs(&self) {
        warn!(
            message = "Events dropped.",
            sink = %self.sink,
            count = %self.count,
            reason = %self.reason,
        );
    }

    fn emit_metrics(&self) {
        counter!(
            "component_discarded_events_total",
            "sink" => self.sink.to_owned(),
            "intentional" => "false",
        )
        .increment(self.count as u64);
    }
}

#[derive(Debug)]
pub struct EventsRetried<'a> {
    pub sink: &'a str,
    pub count: usize,
    pub error: &'a crate::Error,
}

impl InternalEvent for EventsRetried<'_> {
    fn emit_logs(&self) {
        warn!(
            message = "Publish failed; handing events back for retry.",
            sink = %self.sink,
            count = %self.count,
            error = %self.error,
            error_type = error_type::REQUEST_FAILED,
            stage = error_stage::SENDING,
        );
    }

    fn emit_metrics(&self) {
        counter!(
            "component_errors_total",
            "sink" => self.sink.to_owned(),
            "error_type" => error_type::REQUEST_FAILED,
            "stage" => error_stage::SENDING,
        )
        .increment(1);
        counter!("component_retried_events_total", "sink" => self.sink.to_owned())
            .increment(self.count as u64);
    }
}

#[derive(Debug)]
pub struct BackoffWaiting {
    pub delay: Duration,
}

impl InternalEvent for BackoffWaiting {
    fn emit_logs(&self) {
        debug!(message = "Backing off after failed publish.", delay_ms = %self.delay.as_millis());
    }
}

#[derive(Debug)]
pub struct ConnectionEstablished<'a> {
    pub sink: &'a str,
}

impl InternalEvent for ConnectionEstablished<'_> {
    fn emit_logs(&self) {
        info!(message = "Connected.", sink = %self.sink);
    }

    fn emit_metrics(&self) {
        counter!("connection_established_total", "sink" => self.sink.to_owned()).increment(1);
    }
}

#[derive(Debug)]
pub struct ConnectionReused<'a> {
    pub sink: &'a str,
}

impl InternalEvent for ConnectionReused<'_> {
    fn emit_logs(&self) {
        info!(message = "Connection reuse.", sink = %self.sink);
    }
}

#[derive(Debug)]
pub struct ConnectionClosed<'a> {
    pub sink: &'a str,
}

impl InternalEvent for ConnectionClosed<'_> {
    fn emit_logs(&self) {
        info!(message = "Connection closed.", sink = %self.sink);
    }

    fn emit_metrics(&self) {
        counter!("connection_shutdown_total", "sink" => self.sink.to_owned()).increment(1);
    }
}

#[derive(Debug)]
pub struct ConnectionFailed<'a> {
    pub sink: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl InternalEvent for ConnectionFailed<'_> {
    fn emit_logs(&self) {
        error!(
            message = "Unable to connect.",
            sink = %self.sink,
            error = %self.error,
            error_type = error_type::CONNECTION_FAILED,
            stage = error_stage::SENDING,
        );
    }

    fn emit_metrics(&self) {
        counter!(
            "component_errors_total",
            "sink" => self.sink.to_owned(),
            "error_type" => error_type::CONNECTION_FAILED,
            "stage" => error_stage::SENDING,
        )
        .increment(1);
    }
}
