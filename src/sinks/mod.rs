use std::fmt;

use async_trait::async_trait;
use snafu::Snafu;

use crate::event::Batch;

pub mod clickhouse;
pub mod http;
pub mod util;

/// A client bound to one downstream endpoint.
///
/// `connect` may be called again on a connected client and succeeds without
/// opening a second resource. `close` is terminal: a closed client never
/// reconnects. `publish` settles the batch exactly once before returning and
/// reports the summary error, if any.
#[async_trait]
pub trait NetworkClient: fmt::Display + Send + Sync {
    async fn connect(&self) -> crate::Result<()>;

    async fn close(&self) -> crate::Result<()>;

    async fn publish(&self, batch: Box<dyn Batch>) -> crate::Result<()>;
}

/// What a sink configuration hands to the upstream scheduler.
pub struct Group {
    pub clients: Vec<Box<dyn NetworkClient>>,
    pub load_balance: bool,
    pub batch_size: usize,
    pub max_retries: usize,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clients: Vec<String> = self.clients.iter().map(ToString::to_string).collect();
        f.debug_struct("Group")
            .field("clients", &clients)
            .field("load_balance", &self.load_balance)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display("{}: {}", source, name))]
    InvalidHeaderName {
        name: String,
        source: ::http::header::InvalidHeaderName,
    },
    #[snafu(display("{}: {}", source, value))]
    InvalidHeaderValue {
        value: String,
        source: ::http::header::InvalidHeaderValue,
    },
    #[snafu(display("{}", source))]
    InvalidHost { source: util::UriError },
    #[snafu(display("At least one host must be configured"))]
    NoHosts,
    #[snafu(display("compression_level must be between 0 and 9, got {}", level))]
    CompressionLevel { level: u32 },
    #[snafu(display("The `sa` channel cannot be combined with the `ndjson` batch format"))]
    UnsupportedBatchFormat,
    #[snafu(display("clickhouse: the table name must be set"))]
    MissingTable,
    #[snafu(display("clickhouse: the table columns must be set"))]
    MissingColumns,
}
