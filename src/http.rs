use std::{
    fmt,
    time::{Duration, Instant},
};

use futures::future::BoxFuture;
use headers::{Authorization, HeaderMapExt};
use http::{header::HeaderValue, request::Builder, HeaderMap, Request};
use hyper::{
    body::Body,
    client::{Client, HttpConnector},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tracing::{Instrument, Span};

use crate::internal_events::{AboutToSendHttpRequest, GotHttpError, GotHttpResponse};

#[derive(Debug, Snafu)]
pub enum HttpError {
    #[snafu(display("Failed to make HTTP(S) request: {}", source))]
    CallRequest { source: hyper::Error },
    #[snafu(display("Failed to read HTTP response body: {}", source))]
    ReadBody { source: hyper::Error },
    #[snafu(display("HTTP request timed out after {:?}", timeout))]
    Timeout { timeout: Duration },
}

/// Transport settings shared by every client a sink builds.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct HttpTransportSettings {
    /// Upper bound for one request, including reading the response body.
    pub timeout_secs: u64,

    /// How long an idle pooled connection is kept around.
    pub idle_timeout_secs: u64,
}

impl Default for HttpTransportSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 90,
            idle_timeout_secs: 60,
        }
    }
}

impl HttpTransportSettings {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub struct HttpClient {
    client: Client<HttpConnector, Body>,
    span: Span,
    user_agent: HeaderValue,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(settings: &HttpTransportSettings) -> HttpClient {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_keepalive(Some(Duration::from_secs(settings.idle_timeout_secs)));

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .build(http);

        let user_agent = HeaderValue::from_str(&format!("outlet/{}", crate::get_version()))
            .unwrap_or_else(|_| HeaderValue::from_static("outlet"));

        let span = info_span!("http");

        HttpClient {
            client,
            span,
            user_agent,
            timeout: settings.timeout(),
        }
    }

    /// Sends the request and reads the whole response body.
    pub fn send(
        &self,
        mut request: Request<Body>,
    ) -> BoxFuture<'static, Result<http::Response<bytes::Bytes>, HttpError>> {
        let _enter = self.span.enter();

        default_request_headers(&mut request, &self.user_agent);

        emit!(AboutToSendHttpRequest { request: &request });

        let response = self.client.request(request);
        let timeout = self.timeout;

        let fut = async move {
            let before = Instant::now();

            let exchange = async move {
                let response = match response.await {
                    Ok(response) => response,
                    Err(error) => {
                        emit!(GotHttpError {
                            error: &error,
                            roundtrip: before.elapsed(),
                        });
                        return Err(HttpError::CallRequest { source: error });
                    }
                };

                emit!(GotHttpResponse {
                    response: &response,
                    roundtrip: before.elapsed(),
                });

                let (parts, body) = response.into_parts();
                let body = hyper::body::to_bytes(body).await.context(ReadBodySnafu)?;
                Ok::<_, HttpError>(http::Response::from_parts(parts, body))
            };

            match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => result,
                Err(_) => TimeoutSnafu { timeout }.fail(),
            }
        }
        .instrument(self.span.clone());

        Box::pin(fut)
    }
}

fn default_request_headers<B>(request: &mut Request<B>, user_agent: &HeaderValue) {
    if !request.headers().contains_key("User-Agent") {
        request
            .headers_mut()
            .insert("User-Agent", user_agent.clone());
    }

    if !request.headers().contains_key("Accept-Encoding") {
        request
            .headers_mut()
            .insert("Accept-Encoding", HeaderValue::from_static("identity"));
    }
}

impl Clone for HttpClient {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            span: self.span.clone(),
            user_agent: self.user_agent.clone(),
            timeout: self.timeout,
        }
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("client", &self.client)
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "snake_case", tag = "strategy")]
pub enum Auth {
    Basic { user: String, password: String },
}

impl Auth {
    /// Builds basic credentials, or nothing when both parts are empty.
    pub fn basic(user: &str, password: &str) -> Option<Auth> {
        if user.is_empty() && password.is_empty() {
            None
        } else {
            Some(Auth::Basic {
                user: user.to_owned(),
                password: password.to_owned(),
            })
        }
    }

    pub fn apply<B>(&self, req: &mut Request<B>) {
        self.apply_headers_map(req.headers_mut())
    }

    pub fn apply_builder(&self, mut builder: Builder) -> Builder {
        if let Some(map) = builder.headers_mut() {
            self.apply_headers_map(map)
        }
        builder
    }

    pub fn apply_headers_map(&self, map: &mut HeaderMap) {
        match &self {
            Auth::Basic { user, password } => {
                let auth = Authorization::basic(user, password);
                map.typed_insert(auth);
            }
        }
    }
}
