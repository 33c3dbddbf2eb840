use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use http::{
    header::{HeaderName, ACCEPT, CONTENT_TYPE, HOST},
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri,
};
use hyper::Body;
use snafu::{ResultExt, Snafu};

use super::{
    document::Document,
    encoder::{bulk_encode, BodyEncoder, EncodeError, Payload},
};
use crate::{
    http::{Auth, HttpClient, HttpError},
    internal_events::HttpBodyEncoded,
};

#[derive(Debug, Snafu)]
pub enum ConnectionError {
    #[snafu(display("Failed to encode body: {}", source))]
    Encode { source: EncodeError },
    #[snafu(display("Failed to build request: {}", source))]
    BuildRequest { source: http::Error },
    #[snafu(display("{}", source))]
    Request { source: HttpError },
    #[snafu(display("{}: {}", status, String::from_utf8_lossy(body)))]
    UnexpectedStatus { status: StatusCode, body: Bytes },
    #[snafu(display("Not connected"))]
    NotConnected,
    #[snafu(display("Connection is closed"))]
    Closed,
}

impl ConnectionError {
    /// Whether retrying the same payload can never succeed.
    pub const fn is_unencodable(&self) -> bool {
        matches!(self, ConnectionError::Encode { .. })
    }
}

/// Issues requests to one collector URL.
pub struct Connection {
    client: HttpClient,
    uri: Uri,
    auth: Option<Auth>,
    headers: Vec<(HeaderName, HeaderValue)>,
    encoder: Mutex<Box<dyn BodyEncoder>>,
}

impl Connection {
    /// `uri` must already be free of credentials; `headers` are applied to
    /// every request after the encoder and auth headers.
    pub fn new(
        client: HttpClient,
        uri: Uri,
        auth: Option<Auth>,
        headers: Vec<(HeaderName, HeaderValue)>,
        encoder: Box<dyn BodyEncoder>,
    ) -> Self {
        Self {
            client,
            uri,
            auth,
            headers,
            encoder: Mutex::new(encoder),
        }
    }

    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Sends `payload` (or nothing) with `method`.
    ///
    /// Any status of 300 or above is an error carrying the status and the
    /// response body.
    pub async fn request(
        &self,
        method: Method,
        payload: Option<Payload<'_>>,
    ) -> Result<Response<Bytes>, ConnectionError> {
        let encoded = match payload {
            Some(payload) => Some(self.encode(|encoder| encoder.marshal(payload))?),
            None => None,
        };
        self.exec_request(method, encoded).await
    }

    /// Sends every document as one line of a single request body.
    pub async fn bulk(&self, documents: &[Document]) -> Result<Response<Bytes>, ConnectionError> {
        if documents.is_empty() {
            return Ok(Response::new(Bytes::new()));
        }
        let encoded = self.encode(|encoder| bulk_encode(encoder, documents))?;
        self.exec_request(Method::POST, Some(encoded)).await
    }

    fn encode(
        &self,
        write: impl FnOnce(&mut dyn BodyEncoder) -> Result<(), EncodeError>,
    ) -> Result<(Bytes, HeaderMap), ConnectionError> {
        let mut encoder = self.encoder.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = write(&mut **encoder) {
            warn!(message = "Failed to encode body.", %error);
            return Err(ConnectionError::Encode { source: error });
        }
        let body = encoder.finish().context(EncodeSnafu)?;
        let mut headers = HeaderMap::new();
        encoder.add_headers(&mut headers);

        emit!(HttpBodyEncoded {
            byte_size: body.len()
        });
        Ok((body, headers))
    }

    async fn exec_request(
        &self,
        method: Method,
        encoded: Option<(Bytes, HeaderMap)>,
    ) -> Result<Response<Bytes>, ConnectionError> {
        let mut builder = Request::builder().method(method).uri(self.uri.clone());

        let body = match encoded {
            Some((body, encoder_headers)) => {
                if let Some(headers) = builder.headers_mut() {
                    headers.extend(encoder_headers);
                }
                Body::from(body)
            }
            None => Body::empty(),
        };

        if let Some(headers) = builder.headers_mut() {
            headers.append(ACCEPT, HeaderValue::from_static("application/json"));
            if let Some(auth) = &self.auth {
                auth.apply_headers_map(headers);
            }
            apply_configured_headers(headers, &self.headers);
        }

        let request = builder.body(body).context(BuildRequestSnafu)?;
        let response = self.client.send(request).await.context(RequestSnafu)?;

        let status = response.status();
        if status.as_u16() >= 300 {
            return UnexpectedStatusSnafu {
                status,
                body: response.into_body(),
            }
            .fail();
        }
        Ok(response)
    }
}

/// `Content-Type`, `Accept` and `Host` replace what is already set; any other
/// header is added next to existing values.
fn apply_configured_headers(map: &mut HeaderMap, configured: &[(HeaderName, HeaderValue)]) {
    for (name, value) in configured {
        if *name == CONTENT_TYPE || *name == ACCEPT || *name == HOST {
            map.insert(name.clone(), value.clone());
        } else {
            map.append(name.clone(), value.clone());
        }
    }
}
