use metrics::counter;

use super::{
    prelude::{error_stage, error_type},
    InternalEvent,
};

#[derive(Debug)]
pub struct HttpDocumentBuildError<'a> {
    pub error: &'a dyn std::error::Error,
}

impl InternalEvent for HttpDocumentBuildError<'_> {
    fn emit_logs(&self) {
        debug!(
            message = "Unable to build document from event; dropping it.",
            error = %self.error,
            error_type = error_type::CONDITION_FAILED,
            stage = error_stage::PROCESSING,
        );
    }
}

#[derive(Debug)]
pub struct HttpPayloadUnencodable<'a> {
    pub error: &'a dyn std::error::Error,
}

impl InternalEvent for HttpPayloadUnencodable<'_> {
    fn emit_logs(&self) {
        warn!(
            message = "Payload cannot be encoded; skipping it.",
            error = %self.error,
            error_type = error_type::ENCODER_FAILED,
            stage = error_stage::PROCESSING,
        );
    }

    fn emit_metrics(&self) {
        counter!(
            "component_errors_total",
            "sink" => "http",
            "error_type" => error_type::ENCODER_FAILED,
            "stage" => error_stage::PROCESSING,
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct HttpRequestFailed<'a> {
    pub url: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl InternalEvent for HttpRequestFailed<'_> {
    fn emit_logs(&self) {
        error!(
            message = "HTTP request failed.",
            url = %self.url,
            error = %self.error,
            error_type = error_type::REQUEST_FAILED,
            stage = error_stage::SENDING,
        );
    }
}

#[derive(Debug)]
pub struct HttpBodyEncoded {
    pub byte_size: usize,
}

impl InternalEvent for HttpBodyEncoded {
    fn emit_logs(&self) {
        trace!(message = "Request body encoded.", byte_size = %self.byte_size);
    }

    fn emit_metrics(&self) {
        counter!("component_sent_bytes_total", "sink" => "http").increment(self.byte_size as u64);
    }
}
