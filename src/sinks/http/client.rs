use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use http::Method;

use super::{
    config::{BatchFormat, SINK_TYPE},
    connection::{Connection, ConnectionError},
    document::{Channel, Document},
    encoder::Payload,
};
use crate::{
    event::{Batch, Event},
    internal_events::{
        ConnectionClosed, ConnectionEstablished, ConnectionReused, HttpDocumentBuildError,
        HttpPayloadUnencodable, HttpRequestFailed,
    },
    sinks::{
        util::{extract_payloads, BackoffConfig, Observer, PublishError, Publisher},
        NetworkClient,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Unconnected,
    Connected,
    Closed,
}

/// Per-client options that shape the documents and requests.
#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub batch_mode: bool,
    pub batch_format: BatchFormat,
    pub channel: Channel,
    pub app_id: String,
}

/// Posts documents built from the `message` field to one collector URL.
pub struct HttpSinkClient {
    url: String,
    settings: ClientSettings,
    connection: Connection,
    state: Mutex<State>,
    publisher: Publisher,
}

impl HttpSinkClient {
    pub fn new(
        connection: Connection,
        settings: ClientSettings,
        observer: Arc<dyn Observer>,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            url: connection.uri().to_string(),
            settings,
            connection,
            state: Mutex::new(State::Unconnected),
            publisher: Publisher::new(SINK_TYPE, observer, backoff),
        }
    }

    fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn make_document(&self, event: &Event) -> Option<Document> {
        match Document::from_event(event, self.settings.channel, &self.settings.app_id) {
            Ok(document) => Some(document),
            Err(error) => {
                emit!(HttpDocumentBuildError { error: &error });
                None
            }
        }
    }

    async fn publish_events(&self, events: &[Event]) -> Result<(), PublishError> {
        if events.is_empty() {
            return Ok(());
        }

        let (accepted, documents) = extract_payloads(events, |event| self.make_document(event));
        self.publisher
            .dropped(events.len(), accepted.len(), "unusable message");
        if documents.is_empty() {
            return Ok(());
        }

        match self.state() {
            State::Connected => {}
            State::Unconnected => {
                return Err(PublishError::new(accepted, ConnectionError::NotConnected));
            }
            State::Closed => {
                return Err(PublishError::new(accepted, ConnectionError::Closed));
            }
        }

        if self.settings.batch_mode {
            let result = match self.settings.batch_format {
                BatchFormat::Array => {
                    self.connection
                        .request(Method::POST, Some(Payload::Many(&documents)))
                        .await
                }
                BatchFormat::Ndjson => self.connection.bulk(&documents).await,
            };
            if let Err(error) = result {
                emit!(HttpRequestFailed {
                    url: &self.url,
                    error: &error,
                });
                return Err(PublishError::new(accepted, error));
            }
        } else {
            for (i, document) in documents.iter().enumerate() {
                match self
                    .connection
                    .request(Method::POST, Some(Payload::One(document)))
                    .await
                {
                    Ok(_) => {}
                    Err(error) if error.is_unencodable() => {
                        emit!(HttpPayloadUnencodable { error: &error });
                    }
                    Err(error) => {
                        emit!(HttpRequestFailed {
                            url: &self.url,
                            error: &error,
                        });
                        if i > 0 {
                            self.publisher.acked(i);
                        }
                        let rest = accepted[i..].to_vec();
                        return Err(PublishError::new(rest, error));
                    }
                }
            }
        }

        self.publisher.acked(documents.len());
        Ok(())
    }
}

#[async_trait]
impl NetworkClient for HttpSinkClient {
    async fn connect(&self) -> crate::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            State::Connected => {
                emit!(ConnectionReused { sink: SINK_TYPE });
                Ok(())
            }
            State::Closed => Err(ConnectionError::Closed.into()),
            State::Unconnected => {
                info!(message = "Connecting.", url = %self.url);
                *state = State::Connected;
                emit!(ConnectionEstablished { sink: SINK_TYPE });
                Ok(())
            }
        }
    }

    async fn close(&self) -> crate::Result<()> {
        emit!(ConnectionClosed { sink: SINK_TYPE });
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = State::Closed;
        self.publisher.shutdown();
        Ok(())
    }

    async fn publish(&self, batch: Box<dyn Batch>) -> crate::Result<()> {
        self.publisher.new_batch(batch.events().len());
        let result = self.publish_events(batch.events()).await;
        self.publisher.finalize(batch, result).await
    }
}

impl fmt::Display for HttpSinkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "httpout({})", self.url)
    }
}
