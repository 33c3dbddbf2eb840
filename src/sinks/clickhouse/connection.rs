use std::sync::Arc;

use bytes::Bytes;
use http::{
    header::{CONTENT_LENGTH, CONTENT_TYPE},
    Request, StatusCode, Uri,
};
use hyper::Body;
use snafu::{ResultExt, Snafu};
use url::Url;

use crate::{
    event::Value,
    http::{Auth, HttpClient, HttpError, HttpTransportSettings},
    sinks::util::{make_url, UriError},
};

#[derive(Debug, Snafu)]
pub enum ClickhouseError {
    #[snafu(display("No ClickHouse address configured"))]
    NoAddresses,
    #[snafu(display("Invalid ClickHouse address: {}", source))]
    Address { source: UriError },
    #[snafu(display("Ping to {} failed: {}", address, source))]
    Ping { address: String, source: HttpError },
    #[snafu(display("Insert request failed: {}", source))]
    Insert { source: HttpError },
    #[snafu(display("Failed to build insert request: {}", source))]
    BuildRequest { source: http::Error },
    #[snafu(display("Invalid insert URI: {}", source))]
    InsertUri { source: http::uri::InvalidUri },
    #[snafu(display("ClickHouse responded with {}: {}", status, body))]
    UnexpectedStatus { status: StatusCode, body: String },
    #[snafu(display("Row {} does not match the insert columns: {}", row, reason))]
    Append { row: usize, reason: String },
    #[snafu(display("Failed to serialize row: {}", source))]
    Serialize { source: serde_json::Error },
    #[snafu(display("Not connected"))]
    NotConnected,
    #[snafu(display("Client is closed"))]
    Closed,
}

/// Everything needed to reach the ClickHouse HTTP interface.
#[derive(Clone, Debug)]
pub struct ConnectionSettings {
    pub addresses: Vec<String>,
    pub auth: Option<Auth>,
    pub database: Option<String>,
    pub table: String,
    pub columns: Vec<String>,
    pub skip_unknown_fields: bool,
    pub date_time_best_effort: bool,
    pub transport: HttpTransportSettings,
}

impl ConnectionSettings {
    /// `INSERT INTO [db.]table(c1,c2,...) FORMAT JSONCompactEachRow`
    pub fn insert_statement(&self) -> String {
        let table = match &self.database {
            Some(database) => format!("{}.{}", database, self.table),
            None => self.table.clone(),
        };
        format!(
            "INSERT INTO {}({}) FORMAT JSONCompactEachRow",
            table,
            self.columns.join(",")
        )
    }
}

/// A live handle on one ClickHouse server that answered a ping.
#[derive(Debug)]
pub struct ClickhouseConnection {
    client: HttpClient,
    auth: Option<Auth>,
    address: String,
    insert_uri: Uri,
    columns: Arc<[String]>,
}

impl ClickhouseConnection {
    /// Tries each configured address in order and keeps the first that
    /// answers `SELECT 1`. The last failure is returned when none does.
    pub async fn open(
        client: &HttpClient,
        settings: &ConnectionSettings,
    ) -> Result<Self, ClickhouseError> {
        let mut last_error = ClickhouseError::NoAddresses;

        for address in &settings.addresses {
            let endpoint = match make_url(None, None, address) {
                Ok(endpoint) => endpoint,
                Err(source) => {
                    last_error = ClickhouseError::Address { source };
                    continue;
                }
            };

            match ping(client, &endpoint, settings.auth.as_ref()).await {
                Ok(()) => {
                    let insert_uri = insert_uri(
                        &endpoint,
                        &settings.insert_statement(),
                        settings.skip_unknown_fields,
                        settings.date_time_best_effort,
                    )?;
                    return Ok(Self {
                        client: client.clone(),
                        auth: settings.auth.clone(),
                        address: address.clone(),
                        insert_uri,
                        columns: settings.columns.clone().into(),
                    });
                }
                Err(error) => {
                    warn!(message = "ClickHouse address unavailable.", %address, %error);
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn prepare_batch(&self) -> InsertBatch {
        InsertBatch::new(Arc::clone(&self.columns))
    }

    /// Sends every appended row in one round trip.
    pub async fn send(&self, batch: InsertBatch) -> Result<usize, ClickhouseError> {
        let byte_size = batch.body.len();
        let mut builder = Request::post(self.insert_uri.clone())
            .header(CONTENT_TYPE, "application/x-ndjson")
            .header(CONTENT_LENGTH, byte_size);
        if let Some(auth) = &self.auth {
            builder = auth.apply_builder(builder);
        }
        let request = builder
            .body(Body::from(batch.body))
            .context(BuildRequestSnafu)?;

        let response = self.client.send(request).await.context(InsertSnafu)?;
        check_status(response.status(), response.body())?;
        Ok(byte_size)
    }
}

async fn ping(
    client: &HttpClient,
    endpoint: &Url,
    auth: Option<&Auth>,
) -> Result<(), ClickhouseError> {
    let address = endpoint.as_str().trim_end_matches('/').to_owned();
    let mut builder = Request::get(format!("{}/?query=SELECT%201", address));
    if let Some(auth) = auth {
        builder = auth.apply_builder(builder);
    }
    let request = builder.body(Body::empty()).context(BuildRequestSnafu)?;

    let response = client
        .send(request)
        .await
        .context(PingSnafu { address })?;
    check_status(response.status(), response.body())
}

fn check_status(status: StatusCode, body: &Bytes) -> Result<(), ClickhouseError> {
    if status.is_success() {
        Ok(())
    } else {
        UnexpectedStatusSnafu {
            status,
            body: String::from_utf8_lossy(body).trim_end().to_owned(),
        }
        .fail()
    }
}

fn insert_uri(
    endpoint: &Url,
    statement: &str,
    skip_unknown: bool,
    date_time_best_effort: bool,
) -> Result<Uri, ClickhouseError> {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("query", statement)
        .finish();

    let mut uri = endpoint.to_string();
    if !uri.ends_with('/') {
        uri.push('/');
    }

    uri.push('?');
    if skip_unknown {
        uri.push_str("input_format_skip_unknown_fields=1&");
    }
    if date_time_best_effort {
        uri.push_str("date_time_input_format=best_effort&");
    }
    uri.push_str(&query);

    uri.parse::<Uri>().context(InsertUriSnafu)
}

/// Rows accumulated for one insert, encoded as `JSONCompactEachRow`.
///
/// Values keep their dynamic type; ClickHouse coerces them into the column
/// types. Every row must still have one value per column.
#[derive(Debug)]
pub struct InsertBatch {
    columns: Arc<[String]>,
    body: Vec<u8>,
    rows: usize,
}

impl InsertBatch {
    fn new(columns: Arc<[String]>) -> Self {
        Self {
            columns,
            body: Vec::new(),
            rows: 0,
        }
    }

    pub fn append(&mut self, row: &[Value]) -> Result<(), ClickhouseError> {
        if row.len() != self.columns.len() {
            return AppendSnafu {
                row: self.rows,
                reason: format!("expected {} values, got {}", self.columns.len(), row.len()),
            }
            .fail();
        }

        // Serialize first so a failed row never leaves half a line behind.
        let line = serde_json::to_vec(row).context(SerializeSnafu)?;
        self.body.extend_from_slice(&line);
        self.body.push(b'\n');
        self.rows += 1;
        Ok(())
    }

    pub const fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn settings(database: Option<&str>) -> ConnectionSettings {
        ConnectionSettings {
            addresses: vec!["localhost:8123".to_owned()],
            auth: None,
            database: database.map(str::to_owned),
            table: "logs".to_owned(),
            columns: vec!["ts".to_owned(), "level".to_owned(), "count".to_owned()],
            skip_unknown_fields: false,
            date_time_best_effort: true,
            transport: HttpTransportSettings::default(),
        }
    }

    fn batch() -> InsertBatch {
        InsertBatch::new(vec!["a".to_owned(), "b".to_owned()].into())
    }

    #[test]
    fn insert_statement_lists_columns() {
        assert_eq!(
            settings(None).insert_statement(),
            "INSERT INTO logs(ts,level,count) FORMAT JSONCompactEachRow"
        );
        assert_eq!(
            settings(Some("app")).insert_statement(),
            "INSERT INTO app.logs(ts,level,count) FORMAT JSONCompactEachRow"
        );
    }

    #[test]
    fn insert_uri_carries_options_and_query() {
        let endpoint = make_url(None, None, "localhost:8123").unwrap();
        let uri = insert_uri(&endpoint, "INSERT INTO logs(a) FORMAT JSONCompactEachRow", true, true)
            .unwrap();
        assert_eq!(
            uri.to_string(),
            "http://localhost:8123/?\
             input_format_skip_unknown_fields=1&\
             date_time_input_format=best_effort&\
             query=INSERT+INTO+logs%28a%29+FORMAT+JSONCompactEachRow"
        );

        let uri = insert_uri(&endpoint, "SELECT", false, false).unwrap();
        assert_eq!(uri.to_string(), "http://localhost:8123/?query=SELECT");
    }

    #[test]
    fn append_writes_compact_rows() {
        let mut batch = batch();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        batch.append(&[Value::from(ts), Value::from(1)]).unwrap();
        batch.append(&[Value::Null, Value::from(2.5)]).unwrap();

        assert_eq!(batch.rows(), 2);
        assert_eq!(
            String::from_utf8(batch.body.clone()).unwrap(),
            "[\"2024-03-01T12:00:00Z\",1]\n[null,2.5]\n"
        );
    }

    #[test]
    fn append_rejects_wrong_width() {
        let mut batch = batch();
        let error = batch.append(&[Value::from("x")]).unwrap_err();
        assert!(matches!(error, ClickhouseError::Append { row: 0, .. }));
        assert!(batch.is_empty());
    }

    #[test]
    fn append_keeps_mixed_value_types() {
        let mut batch = batch();
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        batch.append(&[Value::from(ts), Value::from(1)]).unwrap();
        batch
            .append(&[Value::from("2024-01-01 00:00:01"), Value::from("2")])
            .unwrap();

        assert_eq!(batch.rows(), 2);
        assert_eq!(
            String::from_utf8(batch.body.clone()).unwrap(),
            "[\"2024-01-01T00:00:00Z\",1]\n[\"2024-01-01 00:00:01\",\"2\"]\n"
        );
    }

    #[test]
    fn check_status_keeps_server_message() {
        let body = Bytes::from_static(b"Code: 60. DB::Exception: Table default.nope doesn't exist.\n");
        let error = check_status(StatusCode::NOT_FOUND, &body).unwrap_err();
        assert_eq!(
            error.to_string(),
            "ClickHouse responded with 404 Not Found: Code: 60. DB::Exception: Table default.nope doesn't exist."
        );
    }
}
