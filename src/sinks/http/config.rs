use std::sync::Arc;

use http::{
    header::{HeaderName, HeaderValue},
    Uri,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::{
    client::{ClientSettings, HttpSinkClient},
    connection::Connection,
    document::Channel,
    encoder::{BodyEncoder, GzipEncoder, JsonEncoder},
    sa::SaEncoder,
};
use crate::{
    config::{SinkConfig, SinkContext},
    http::{Auth, HttpClient, HttpTransportSettings},
    sinks::{
        util::{make_url, strip_credentials, BackoffConfig, Observer},
        BuildError, Group, InvalidHeaderNameSnafu, InvalidHeaderValueSnafu, InvalidHostSnafu,
        NetworkClient,
    },
};

pub(super) const SINK_TYPE: &str = "http";

/// How a batch is laid out in a single request body.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchFormat {
    /// One JSON array holding every document.
    #[default]
    Array,
    /// One JSON document per line.
    Ndjson,
}

/// Configuration for the `http` sink.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Collector hosts. Each one gets its own client.
    #[serde(alias = "addresses")]
    pub hosts: Vec<String>,

    /// Scheme for hosts that don't carry one.
    pub protocol: Option<String>,

    /// Appended to every host's path.
    pub path: Option<String>,

    #[serde(default)]
    pub headers: IndexMap<String, String>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "crate::config::default_true")]
    pub loadbalance: bool,

    /// `0` disables compression, `1` to `9` select a gzip level.
    #[serde(default)]
    pub compression_level: u32,

    #[serde(default = "default_bulk_max_size")]
    pub bulk_max_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Send a whole batch in one request instead of one request per event.
    #[serde(default)]
    pub batch_mode: bool,

    #[serde(default)]
    pub batch_format: BatchFormat,

    #[serde(default)]
    pub channel: Channel,

    #[serde(default)]
    pub app_id: String,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub transport: HttpTransportSettings,
}

const fn default_bulk_max_size() -> usize {
    50
}

const fn default_max_retries() -> usize {
    3
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            protocol: None,
            path: None,
            headers: IndexMap::new(),
            username: String::new(),
            password: String::new(),
            loadbalance: true,
            compression_level: 0,
            bulk_max_size: default_bulk_max_size(),
            max_retries: default_max_retries(),
            batch_mode: false,
            batch_format: BatchFormat::default(),
            channel: Channel::default(),
            app_id: String::new(),
            backoff: BackoffConfig::default(),
            transport: HttpTransportSettings::default(),
        }
    }
}

impl HttpConfig {
    fn validate(&self) -> Result<(), BuildError> {
        if self.hosts.is_empty() {
            return Err(BuildError::NoHosts);
        }
        if self.compression_level > 9 {
            return Err(BuildError::CompressionLevel {
                level: self.compression_level,
            });
        }
        if self.channel == Channel::Sa && self.batch_format == BatchFormat::Ndjson {
            return Err(BuildError::UnsupportedBatchFormat);
        }
        Ok(())
    }

    fn parsed_headers(&self) -> Result<Vec<(HeaderName, HeaderValue)>, BuildError> {
        self.headers
            .iter()
            .map(|(name, value)| {
                let header_name = HeaderName::from_bytes(name.as_bytes())
                    .context(InvalidHeaderNameSnafu { name })?;
                let header_value =
                    HeaderValue::from_str(value).context(InvalidHeaderValueSnafu { value })?;
                Ok((header_name, header_value))
            })
            .collect()
    }

    fn encoder(&self) -> Box<dyn BodyEncoder> {
        match (self.channel, self.compression_level) {
            (Channel::Sa, _) => Box::new(SaEncoder::new()),
            (_, 0) => Box::new(JsonEncoder::new()),
            (_, level) => Box::new(GzipEncoder::new(level)),
        }
    }

    fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            batch_mode: self.batch_mode,
            batch_format: self.batch_format,
            channel: self.channel,
            app_id: self.app_id.clone(),
        }
    }

    fn build_client(
        &self,
        host: &str,
        http: &HttpClient,
        headers: &[(HeaderName, HeaderValue)],
        observer: &Arc<dyn Observer>,
    ) -> crate::Result<HttpSinkClient> {
        let mut url = make_url(self.protocol.as_deref(), self.path.as_deref(), host)
            .context(InvalidHostSnafu)?;

        let auth = match strip_credentials(&mut url) {
            Some((user, password)) => Auth::basic(&user, &password),
            None => Auth::basic(&self.username, &self.password),
        };

        let uri: Uri = url.as_str().parse()?;
        debug!(message = "Building HTTP client.", url = %uri);

        let connection = Connection::new(http.clone(), uri, auth, headers.to_vec(), self.encoder());
        Ok(HttpSinkClient::new(
            connection,
            self.client_settings(),
            Arc::clone(observer),
            self.backoff,
        ))
    }
}

#[typetag::serde(name = "http")]
impl SinkConfig for HttpConfig {
    fn build(&self, cx: SinkContext) -> crate::Result<Group> {
        self.validate()?;
        let headers = self.parsed_headers()?;
        let observer = cx.observer(SINK_TYPE);
        let http = HttpClient::new(&self.transport);

        let clients = self
            .hosts
            .iter()
            .map(|host| {
                self.build_client(host, &http, &headers, &observer)
                    .map(|client| Box::new(client) as Box<dyn NetworkClient>)
            })
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(Group {
            clients,
            load_balance: self.loadbalance,
            batch_size: self.bulk_max_size,
            max_retries: self.max_retries,
        })
    }

    fn sink_type(&self) -> &'static str {
        SINK_TYPE
    }
}
