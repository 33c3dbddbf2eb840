//! The `clickhouse` sink.
//!
//! Rows are built from a fixed, ordered column list and inserted through the
//! ClickHouse HTTP interface as `JSONCompactEachRow`, one request per batch.

mod client;
mod config;
mod connection;

pub use self::{
    client::ClickhouseClient,
    config::ClickhouseConfig,
    connection::{ClickhouseConnection, ClickhouseError, ConnectionSettings, InsertBatch},
};
