use std::{
    collections::VecDeque,
    future::Future,
    net::{SocketAddr, TcpListener},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use bytes::Bytes;
use futures::{channel::mpsc, FutureExt, TryFutureExt};
use http::{request::Parts, StatusCode};
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server,
};
use stream_cancel::{Trigger, Tripwire};

use crate::{sinks::util::Observer, Error};

pub fn trace_init() {
    let levels = std::env::var("TEST_LOG").unwrap_or_else(|_| "error".to_string());
    crate::trace::init(&levels);
}

/// An address nothing is listening on.
pub fn next_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Counts everything a sink reports.
#[derive(Debug, Default)]
pub struct CountingObserver {
    events: AtomicUsize,
    dropped: AtomicUsize,
    failed: AtomicUsize,
    acked: AtomicUsize,
}

impl CountingObserver {
    pub fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }
}

impl Observer for CountingObserver {
    fn new_batch(&self, count: usize) {
        self.events.fetch_add(count, Ordering::SeqCst);
    }

    fn dropped(&self, count: usize) {
        self.dropped.fetch_add(count, Ordering::SeqCst);
    }

    fn failed(&self, count: usize) {
        self.failed.fetch_add(count, Ordering::SeqCst);
    }

    fn acked(&self, count: usize) {
        self.acked.fetch_add(count, Ordering::SeqCst);
    }
}

pub type Received = mpsc::UnboundedReceiver<(Parts, Bytes)>;

/// Starts building an HTTP server that records every request it receives.
///
/// Responses follow `script` in order; once it runs out every request gets
/// `200 OK` with an empty body. The server stops when the trigger is
/// cancelled or dropped.
pub fn build_test_server(
    script: Vec<(StatusCode, &'static str)>,
) -> (
    SocketAddr,
    Received,
    Trigger,
    impl Future<Output = Result<(), ()>>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let (tx, rx) = mpsc::unbounded();
    let script = Arc::new(Mutex::new(VecDeque::from(script)));
    let service = make_service_fn(move |_| {
        let tx = tx.clone();
        let script = Arc::clone(&script);
        async {
            Ok::<_, Error>(service_fn(move |req: Request<Body>| {
                let tx = tx.clone();
                let script = Arc::clone(&script);
                async move {
                    let (parts, body) = req.into_parts();
                    let bytes = hyper::body::to_bytes(body).await?;
                    // Recorded before answering so the client sees it on return.
                    let _ = tx.unbounded_send((parts, bytes));

                    let (status, body) = script
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or((StatusCode::OK, ""));
                    let mut response = Response::new(Body::from(body));
                    *response.status_mut() = status;
                    Ok::<_, Error>(response)
                }
            }))
        }
    });

    let (trigger, tripwire) = Tripwire::new();
    let server = Server::from_tcp(listener)
        .unwrap()
        .serve(service)
        .with_graceful_shutdown(tripwire.map(|_| ()))
        .map_err(|error| panic!("Server error: {}", error));

    (addr, rx, trigger, server)
}

/// Spawns a recording server on the current runtime.
pub fn spawn_test_server(
    script: Vec<(StatusCode, &'static str)>,
) -> (SocketAddr, Received, Trigger) {
    let (addr, rx, trigger, server) = build_test_server(script);
    tokio::spawn(server);
    (addr, rx, trigger)
}

/// Everything received so far, without waiting.
pub fn drain(rx: &mut Received) -> Vec<(Parts, Bytes)> {
    let mut received = Vec::new();
    while let Ok(Some(item)) = rx.try_next() {
        received.push(item);
    }
    received
}
