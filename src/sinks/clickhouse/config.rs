use serde::{Deserialize, Serialize};

use super::{client::ClickhouseClient, connection::ConnectionSettings};
use crate::{
    config::{SinkConfig, SinkContext},
    http::{Auth, HttpTransportSettings},
    sinks::{util::BackoffConfig, BuildError, Group},
};

pub(super) const SINK_TYPE: &str = "clickhouse";

/// Configuration for the `clickhouse` sink.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClickhouseConfig {
    /// HTTP interface addresses, tried in order when connecting.
    #[serde(alias = "addresses", default = "default_addr")]
    pub addr: Vec<String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Prepended to `table` when set.
    pub database: Option<String>,

    #[serde(default)]
    pub table: String,

    /// Event fields to insert, in table column order.
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_bulk_max_size")]
    pub bulk_max_size: usize,

    /// Sets `input_format_skip_unknown_fields`.
    #[serde(default)]
    pub skip_unknown_fields: bool,

    /// Sets `date_time_input_format` to `best_effort` so RFC 3339 timestamps parse.
    #[serde(default = "crate::config::default_true")]
    pub date_time_best_effort: bool,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub transport: HttpTransportSettings,
}

fn default_addr() -> Vec<String> {
    vec!["127.0.0.1:8123".to_owned()]
}

const fn default_max_retries() -> usize {
    3
}

const fn default_bulk_max_size() -> usize {
    1000
}

impl Default for ClickhouseConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            username: String::new(),
            password: String::new(),
            database: None,
            table: String::new(),
            columns: Vec::new(),
            max_retries: default_max_retries(),
            bulk_max_size: default_bulk_max_size(),
            skip_unknown_fields: false,
            date_time_best_effort: true,
            backoff: BackoffConfig::default(),
            transport: HttpTransportSettings::default(),
        }
    }
}

impl ClickhouseConfig {
    pub(super) fn validate(&self) -> Result<(), BuildError> {
        if self.table.is_empty() {
            error!(message = "clickhouse: the table name must be set.");
            return Err(BuildError::MissingTable);
        }
        if self.columns.is_empty() {
            error!(message = "clickhouse: the table columns must be set.");
            return Err(BuildError::MissingColumns);
        }
        Ok(())
    }

    pub(super) fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            addresses: self.addr.clone(),
            auth: Auth::basic(&self.username, &self.password),
            database: self.database.clone().filter(|db| !db.is_empty()),
            table: self.table.clone(),
            columns: self.columns.clone(),
            skip_unknown_fields: self.skip_unknown_fields,
            date_time_best_effort: self.date_time_best_effort,
            transport: self.transport,
        }
    }
}

#[typetag::serde(name = "clickhouse")]
impl SinkConfig for ClickhouseConfig {
    fn build(&self, cx: SinkContext) -> crate::Result<Group> {
        self.validate()?;

        let client = ClickhouseClient::new(
            self.connection_settings(),
            cx.observer(SINK_TYPE),
            self.backoff,
        );

        Ok(Group {
            clients: vec![Box::new(client)],
            load_balance: false,
            batch_size: self.bulk_max_size,
            max_retries: self.max_retries,
        })
    }

    fn sink_type(&self) -> &'static str {
        SINK_TYPE
    }
}
