#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::type_complexity)]

//! Network output clients for an event shipping agent.
//!
//! Two sinks live here: `clickhouse`, which inserts rows built from a fixed
//! column list, and `http`, which posts JSON documents (optionally wrapped in
//! a vendor envelope) to one or more collectors. Both implement
//! [`sinks::NetworkClient`] and hand every batch back to the upstream
//! scheduler either fully acknowledged or with the exact subset to retry.

#[macro_use]
extern crate tracing;

#[macro_use]
pub mod internal_events;

pub mod config;
pub mod event;
pub mod http;
pub mod sinks;
#[cfg(test)]
pub mod test_util;
pub mod trace;

pub use event::{Event, Value};

pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}
