pub(crate) mod error_stage {
    pub(crate) const PROCESSING: &str = "processing";
    pub(crate) const SENDING: &str = "sending";
}

pub(crate) mod error_type {
    pub(crate) const CONDITION_FAILED: &str = "condition_failed";
    pub(crate) const CONNECTION_FAILED: &str = "connection_failed";
    pub(crate) const ENCODER_FAILED: &str = "encoder_failed";
    pub(crate) const REQUEST_FAILED: &str = "request_failed";
}

pub(crate) fn hyper_error_code(error: &hyper::Error) -> &'static str {
    if error.is_body_write_aborted() {
        "body_write_aborted"
    } else if error.is_canceled() {
        "cancelled"
    } else if error.is_closed() {
        "sender_closed"
    } else if error.is_connect() {
        "connect_error"
    } else if error.is_incomplete_message() {
        "incomplete_message"
    } else if error.is_parse() {
        "parse_error"
    } else if error.is_parse_status() {
        "parse_status_error"
    } else if error.is_parse_too_large() {
        "parse_too_large"
    } else if error.is_timeout() {
        "timeout"
    } else if error.is_user() {
        "user"
    } else {
        "unknown"
    }
}
