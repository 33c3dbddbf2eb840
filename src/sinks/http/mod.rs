//! The `http` sink.
//!
//! Each event's `message` field becomes one JSON document, optionally wrapped
//! in a collector-specific envelope, and is posted to every configured host
//! either one request per event or one request per batch.

mod client;
mod config;
mod connection;
mod document;
mod encoder;
mod sa;

pub use self::{
    client::{ClientSettings, HttpSinkClient},
    config::{BatchFormat, HttpConfig},
    connection::{Connection, ConnectionError},
    document::{Channel, Document, DocumentError},
    encoder::{bulk_encode, BodyEncoder, EncodeError, GzipEncoder, JsonEncoder, Payload},
    sa::SaEncoder,
};
