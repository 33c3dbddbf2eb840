use metrics::counter;

use super::{
    prelude::{error_stage, error_type},
    InternalEvent,
};

#[derive(Debug)]
pub struct ClickhouseFieldMissing<'a> {
    pub column: &'a str,
}

impl InternalEvent for ClickhouseFieldMissing<'_> {
    fn emit_logs(&self) {
        debug!(
            message = "Event is missing a column; dropping it.",
            column = %self.column,
        );
    }
}

#[derive(Debug)]
pub struct ClickhouseInsertError<'a> {
    pub stage: &'static str,
    pub error: &'a dyn std::error::Error,
}

impl InternalEvent for ClickhouseInsertError<'_> {
    fn emit_logs(&self) {
        error!(
            message = "Batch insert failed.",
            insert_stage = %self.stage,
            error = %self.error,
            error_type = error_type::REQUEST_FAILED,
            stage = error_stage::SENDING,
        );
    }

    fn emit_metrics(&self) {
        counter!(
            "component_errors_total",
            "sink" => "clickhouse",
            "error_code" => self.stage,
            "error_type" => error_type::REQUEST_FAILED,
            "stage" => error_stage::SENDING,
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct ClickhouseRowsInserted<'a> {
    pub table: &'a str,
    pub count: usize,
    pub byte_size: usize,
}

impl InternalEvent for ClickhouseRowsInserted<'_> {
    fn emit_logs(&self) {
        trace!(
            message = "Rows inserted.",
            table = %self.table,
            count = %self.count,
            byte_size = %self.byte_size,
        );
    }

    fn emit_metrics(&self) {
        counter!("clickhouse_rows_inserted_total", "table" => self.table.to_owned())
            .increment(self.count as u64);
        counter!("component_sent_bytes_total", "sink" => "clickhouse")
            .increment(self.byte_size as u64);
    }
}
