use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    config::SINK_TYPE,
    connection::{ClickhouseConnection, ClickhouseError, ConnectionSettings},
};
use crate::{
    event::{Batch, Event, Value},
    http::HttpClient,
    internal_events::{
        ClickhouseFieldMissing, ClickhouseInsertError, ClickhouseRowsInserted,
        ConnectionClosed, ConnectionEstablished, ConnectionFailed, ConnectionReused,
    },
    sinks::{
        util::{extract_payloads, BackoffConfig, Observer, PublishError, Publisher},
        NetworkClient,
    },
};

enum State {
    Unconnected,
    Connected(Arc<ClickhouseConnection>),
    Closed,
}

/// Inserts every batch as one `INSERT` against a fixed column list.
pub struct ClickhouseClient {
    settings: ConnectionSettings,
    http: HttpClient,
    state: Mutex<State>,
    publisher: Publisher,
}

impl ClickhouseClient {
    pub fn new(
        settings: ConnectionSettings,
        observer: Arc<dyn Observer>,
        backoff: BackoffConfig,
    ) -> Self {
        let http = HttpClient::new(&settings.transport);
        Self {
            settings,
            http,
            state: Mutex::new(State::Unconnected),
            publisher: Publisher::new(SINK_TYPE, observer, backoff),
        }
    }

    /// Builds one row per event in column order. Any absent column marks the
    /// event malformed.
    fn match_fields(&self, event: &Event) -> Option<Vec<Value>> {
        let mut row = Vec::with_capacity(self.settings.columns.len());
        for column in &self.settings.columns {
            match event.get(column) {
                Some(value) => row.push(value.clone()),
                None => {
                    emit!(ClickhouseFieldMissing { column });
                    return None;
                }
            }
        }
        Some(row)
    }

    async fn connection(&self) -> Result<Arc<ClickhouseConnection>, ClickhouseError> {
        match &*self.state.lock().await {
            State::Connected(connection) => Ok(Arc::clone(connection)),
            State::Unconnected => Err(ClickhouseError::NotConnected),
            State::Closed => Err(ClickhouseError::Closed),
        }
    }

    async fn publish_events(&self, events: &[Event]) -> Result<(), PublishError> {
        if events.is_empty() {
            return Ok(());
        }

        let (accepted, rows) = extract_payloads(events, |event| self.match_fields(event));
        self.publisher
            .dropped(events.len(), accepted.len(), "missing column");
        if rows.is_empty() {
            return Ok(());
        }

        let connection = match self.connection().await {
            Ok(connection) => connection,
            Err(error) => return Err(PublishError::new(accepted, error)),
        };

        let mut insert = connection.prepare_batch();
        for row in &rows {
            if let Err(error) = insert.append(row) {
                emit!(ClickhouseInsertError {
                    stage: "append",
                    error: &error,
                });
                return Err(PublishError::new(accepted, error));
            }
        }

        match connection.send(insert).await {
            Ok(byte_size) => {
                emit!(ClickhouseRowsInserted {
                    table: &self.settings.table,
                    count: rows.len(),
                    byte_size,
                });
                self.publisher.acked(rows.len());
                Ok(())
            }
            Err(error) => {
                emit!(ClickhouseInsertError {
                    stage: "send",
                    error: &error,
                });
                Err(PublishError::new(accepted, error))
            }
        }
    }
}

#[async_trait]
impl NetworkClient for ClickhouseClient {
    async fn connect(&self) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        match *state {
            State::Connected(_) => {
                emit!(ConnectionReused { sink: SINK_TYPE });
                Ok(())
            }
            State::Closed => Err(ClickhouseError::Closed.into()),
            State::Unconnected => match ClickhouseConnection::open(&self.http, &self.settings).await {
                Ok(connection) => {
                    debug!(message = "Using ClickHouse address.", address = %connection.address());
                    emit!(ConnectionEstablished { sink: SINK_TYPE });
                    *state = State::Connected(Arc::new(connection));
                    Ok(())
                }
                Err(error) => {
                    emit!(ConnectionFailed {
                        sink: SINK_TYPE,
                        error: &error,
                    });
                    Err(error.into())
                }
            },
        }
    }

    async fn close(&self) -> crate::Result<()> {
        emit!(ConnectionClosed { sink: SINK_TYPE });
        *self.state.lock().await = State::Closed;
        self.publisher.shutdown();
        Ok(())
    }

    async fn publish(&self, batch: Box<dyn Batch>) -> crate::Result<()> {
        self.publisher.new_batch(batch.events().len());
        let result = self.publish_events(batch.events()).await;
        self.publisher.finalize(batch, result).await
    }
}

impl fmt::Display for ClickhouseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clickhouse({})", self.settings.addresses.join(","))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use http::StatusCode;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        event::{BatchStatus, EventBatch},
        http::HttpTransportSettings,
        test_util::{drain, next_addr, spawn_test_server, trace_init, CountingObserver},
    };

    fn settings(addresses: Vec<String>) -> ConnectionSettings {
        ConnectionSettings {
            addresses,
            auth: None,
            database: None,
            table: "logs".to_owned(),
            columns: vec!["host".to_owned(), "message".to_owned()],
            skip_unknown_fields: false,
            date_time_best_effort: false,
            transport: HttpTransportSettings {
                timeout_secs: 5,
                idle_timeout_secs: 1,
            },
        }
    }

    fn client(addresses: Vec<String>, observer: Arc<CountingObserver>) -> ClickhouseClient {
        ClickhouseClient::new(
            settings(addresses),
            observer,
            BackoffConfig {
                init_ms: 1,
                max_ms: 2,
            },
        )
    }

    fn event(host: &str, message: &str) -> Event {
        let mut event = Event::new();
        event.insert("host", host);
        event.insert("message", message);
        event
    }

    fn malformed(message: &str) -> Event {
        Event::from(message)
    }

    #[test]
    fn match_fields_requires_every_column() {
        let client = client(vec![], Arc::new(CountingObserver::default()));
        assert_eq!(
            client.match_fields(&event("a", "hi")),
            Some(vec![Value::from("a"), Value::from("hi")])
        );
        assert_eq!(client.match_fields(&malformed("hi")), None);

        let mut nulls = Event::new();
        nulls.insert("host", Value::Null);
        nulls.insert("message", Value::Null);
        assert_eq!(
            client.match_fields(&nulls),
            Some(vec![Value::Null, Value::Null])
        );
    }

    #[tokio::test]
    async fn connects_once_and_reuses() {
        trace_init();
        let (addr, mut rx, _trigger) = spawn_test_server(vec![]);
        let client = client(vec![addr.to_string()], Arc::new(CountingObserver::default()));

        client.connect().await.unwrap();
        client.connect().await.unwrap();

        let requests = drain(&mut rx);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0.uri.query(), Some("query=SELECT%201"));
    }

    #[tokio::test]
    async fn connect_skips_dead_addresses() {
        trace_init();
        let (addr, mut rx, _trigger) = spawn_test_server(vec![]);
        let client = client(
            vec![next_addr().to_string(), addr.to_string()],
            Arc::new(CountingObserver::default()),
        );

        client.connect().await.unwrap();
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn connect_fails_when_ping_is_rejected() {
        trace_init();
        let (addr, _rx, _trigger) =
            spawn_test_server(vec![(StatusCode::UNAUTHORIZED, "Code: 516. Authentication failed")]);
        let client = client(vec![addr.to_string()], Arc::new(CountingObserver::default()));

        let error = client.connect().await.unwrap_err();
        assert!(error.to_string().contains("Code: 516"), "{}", error);

        let (batch, _receiver) = EventBatch::new(vec![event("a", "b")]);
        let error = client.publish(Box::new(batch)).await.unwrap_err();
        assert_eq!(error.to_string(), "Not connected");
    }

    #[tokio::test]
    async fn connect_without_addresses_fails() {
        let client = client(vec![], Arc::new(CountingObserver::default()));
        let error = client.connect().await.unwrap_err();
        assert_eq!(error.to_string(), "No ClickHouse address configured");
    }

    #[tokio::test]
    async fn inserts_surviving_rows_in_one_request() {
        trace_init();
        let (addr, mut rx, _trigger) = spawn_test_server(vec![]);
        let observer = Arc::new(CountingObserver::default());
        let client = client(vec![addr.to_string()], Arc::clone(&observer));
        client.connect().await.unwrap();
        drain(&mut rx);

        let events = vec![
            event("a", "one"),
            malformed("two"),
            event("b", "three"),
        ];
        let (batch, mut receiver) = EventBatch::new(events);
        client.publish(Box::new(batch)).await.unwrap();

        assert_eq!(receiver.try_recv(), Ok(BatchStatus::Acked));
        assert_eq!(observer.events(), 3);
        assert_eq!(observer.dropped(), 1);
        assert_eq!(observer.acked(), 2);
        assert_eq!(observer.failed(), 0);

        let requests = drain(&mut rx);
        assert_eq!(requests.len(), 1);
        let (parts, body) = &requests[0];
        assert_eq!(parts.method, http::Method::POST);
        assert_eq!(
            parts.uri.query(),
            Some("query=INSERT+INTO+logs%28host%2Cmessage%29+FORMAT+JSONCompactEachRow")
        );
        similar_asserts::assert_eq!(
            String::from_utf8_lossy(body),
            "[\"a\",\"one\"]\n[\"b\",\"three\"]\n"
        );
    }

    #[tokio::test]
    async fn failed_insert_retries_every_surviving_event() {
        trace_init();
        let (addr, mut rx, _trigger) = spawn_test_server(vec![
            (StatusCode::OK, "1\n"),
            (StatusCode::INTERNAL_SERVER_ERROR, "Code: 53. Type mismatch"),
        ]);
        let observer = Arc::new(CountingObserver::default());
        let client = client(vec![addr.to_string()], Arc::clone(&observer));
        client.connect().await.unwrap();

        let events = vec![event("a", "one"), malformed("two"), event("b", "three")];
        let (batch, mut receiver) = EventBatch::new(events);
        let error = client.publish(Box::new(batch)).await.unwrap_err();

        assert_eq!(
            error.to_string(),
            "ClickHouse responded with 500 Internal Server Error: Code: 53. Type mismatch"
        );
        assert_eq!(
            receiver.try_recv(),
            Ok(BatchStatus::Retry(vec![event("a", "one"), event("b", "three")]))
        );
        assert_eq!(observer.dropped(), 1);
        assert_eq!(observer.failed(), 2);
        assert_eq!(observer.acked(), 0);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn mixed_value_types_are_inserted_in_one_request() {
        trace_init();
        let (addr, mut rx, _trigger) = spawn_test_server(vec![]);
        let observer = Arc::new(CountingObserver::default());
        let client = client(vec![addr.to_string()], Arc::clone(&observer));
        client.connect().await.unwrap();
        drain(&mut rx);

        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut first = Event::new();
        first.insert("host", ts);
        first.insert("message", "one");
        let mut second = Event::new();
        second.insert("host", "2024-01-01 00:00:01");
        second.insert("message", 2);

        for _ in 0..3 {
            let (batch, mut receiver) = EventBatch::new(vec![first.clone(), second.clone()]);
            client.publish(Box::new(batch)).await.unwrap();
            assert_eq!(receiver.try_recv(), Ok(BatchStatus::Acked));
        }

        assert_eq!(observer.acked(), 6);
        assert_eq!(observer.failed(), 0);
        let requests = drain(&mut rx);
        assert_eq!(requests.len(), 3);
        similar_asserts::assert_eq!(
            String::from_utf8_lossy(&requests[0].1),
            "[\"2024-01-01T00:00:00Z\",\"one\"]\n[\"2024-01-01 00:00:01\",2]\n"
        );
    }

    #[tokio::test]
    async fn all_malformed_is_acked_without_a_request() {
        let observer = Arc::new(CountingObserver::default());
        // Unconnected, so any send attempt would fail.
        let client = client(vec![], Arc::clone(&observer));

        let (batch, mut receiver) = EventBatch::new(vec![malformed("a"), malformed("b")]);
        client.publish(Box::new(batch)).await.unwrap();

        assert_eq!(receiver.try_recv(), Ok(BatchStatus::Acked));
        assert_eq!(observer.dropped(), 2);
        assert_eq!(observer.acked(), 0);
    }

    #[tokio::test]
    async fn closed_client_rejects_everything() {
        trace_init();
        let (addr, _rx, _trigger) = spawn_test_server(vec![]);
        let observer = Arc::new(CountingObserver::default());
        let client = client(vec![addr.to_string()], Arc::clone(&observer));
        client.connect().await.unwrap();

        client.close().await.unwrap();
        client.close().await.unwrap();

        let error = client.connect().await.unwrap_err();
        assert_eq!(error.to_string(), "Client is closed");

        let (batch, mut receiver) = EventBatch::new(vec![event("a", "one")]);
        let error = client.publish(Box::new(batch)).await.unwrap_err();
        assert_eq!(error.to_string(), "Client is closed");
        assert_eq!(
            receiver.try_recv(),
            Ok(BatchStatus::Retry(vec![event("a", "one")]))
        );
    }

    #[test]
    fn display_lists_addresses() {
        let client = client(
            vec!["ch-1:8123".to_owned(), "ch-2:8123".to_owned()],
            Arc::new(CountingObserver::default()),
        );
        assert_eq!(client.to_string(), "clickhouse(ch-1:8123,ch-2:8123)");
    }

    fn arb_event() -> impl Strategy<Value = (bool, Event)> {
        (any::<bool>(), "[a-z]{1,8}").prop_map(|(complete, message)| {
            let mut fields = BTreeMap::new();
            fields.insert("message".to_owned(), Value::from(message.as_str()));
            if complete {
                fields.insert("host".to_owned(), Value::from("h"));
            }
            (complete, Event::from(fields))
        })
    }

    proptest! {
        #[test]
        fn dropped_events_are_counted_and_never_retried(
            input in proptest::collection::vec(arb_event(), 0..20),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let observer = Arc::new(CountingObserver::default());
            // Unconnected, so every surviving event comes back for retry.
            let client = client(vec![], Arc::clone(&observer));

            let malformed = input.iter().filter(|(complete, _)| !complete).count();
            let survivors: Vec<Event> = input
                .iter()
                .filter(|(complete, _)| *complete)
                .map(|(_, event)| event.clone())
                .collect();
            let events: Vec<Event> = input.into_iter().map(|(_, event)| event).collect();

            let (batch, mut receiver) = EventBatch::new(events);
            let result = runtime.block_on(client.publish(Box::new(batch)));

            prop_assert_eq!(observer.dropped(), malformed);
            if survivors.is_empty() {
                prop_assert!(result.is_ok());
                prop_assert_eq!(receiver.try_recv(), Ok(BatchStatus::Acked));
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(receiver.try_recv(), Ok(BatchStatus::Retry(survivors)));
            }
        }
    }
}
