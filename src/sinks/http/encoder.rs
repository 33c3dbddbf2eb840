use std::{io::Write, mem};

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use http::{
    header::{CONTENT_ENCODING, CONTENT_TYPE},
    HeaderMap, HeaderValue,
};
use snafu::{ResultExt, Snafu};

use super::document::Document;

#[derive(Debug, Snafu)]
pub enum EncodeError {
    #[snafu(display("Failed to serialize body: {}", source))]
    Json { source: serde_json::Error },
    #[snafu(display("Failed to compress body: {}", source))]
    Io { source: std::io::Error },
    #[snafu(display("Empty event list"))]
    EmptyEventList,
    #[snafu(display("Document has no `#originMsg` payload"))]
    MissingOriginMessage,
    #[snafu(display("{} is not supported by this encoder", operation))]
    NotSupported { operation: &'static str },
}

/// What a single request body is built from.
#[derive(Clone, Copy, Debug)]
pub enum Payload<'a> {
    One(&'a Document),
    Many(&'a [Document]),
}

/// Turns documents into a request body and describes it with headers.
///
/// Encoders keep their buffer between requests: `marshal` and `reset` clear
/// it without giving the allocation back.
pub trait BodyEncoder: Send {
    /// Clears any previous body.
    fn reset(&mut self);

    /// Replaces the body with `payload`.
    fn marshal(&mut self, payload: Payload<'_>) -> Result<(), EncodeError>;

    /// Adds one document to the body as its own line.
    fn append(&mut self, document: &Document) -> Result<(), EncodeError>;

    fn add_headers(&self, headers: &mut HeaderMap);

    /// Completes the body and returns a copy of it.
    fn finish(&mut self) -> Result<Bytes, EncodeError>;
}

/// Resets `encoder` and appends every document. The first error aborts the
/// whole body.
pub fn bulk_encode(encoder: &mut dyn BodyEncoder, documents: &[Document]) -> Result<(), EncodeError> {
    encoder.reset();
    for document in documents {
        encoder.append(document)?;
    }
    Ok(())
}

fn write_payload(writer: impl Write, payload: Payload<'_>) -> Result<(), EncodeError> {
    match payload {
        Payload::One(document) => serde_json::to_writer(writer, document),
        Payload::Many(documents) => serde_json::to_writer(writer, documents),
    }
    .context(JsonSnafu)
}

fn write_line(mut writer: impl Write, document: &Document) -> Result<(), EncodeError> {
    // Serialize first so a bad document never leaves half a line behind.
    let line = serde_json::to_vec(document).context(JsonSnafu)?;
    writer.write_all(&line).context(IoSnafu)?;
    writer.write_all(b"\n").context(IoSnafu)
}

#[derive(Debug, Default)]
pub struct JsonEncoder {
    buf: Vec<u8>,
}

impl JsonEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BodyEncoder for JsonEncoder {
    fn reset(&mut self) {
        self.buf.clear();
    }

    fn marshal(&mut self, payload: Payload<'_>) -> Result<(), EncodeError> {
        self.reset();
        let result = write_payload(&mut self.buf, payload);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn append(&mut self, document: &Document) -> Result<(), EncodeError> {
        write_line(&mut self.buf, document)
    }

    fn add_headers(&self, headers: &mut HeaderMap) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    fn finish(&mut self) -> Result<Bytes, EncodeError> {
        Ok(Bytes::copy_from_slice(&self.buf))
    }
}

pub struct GzipEncoder {
    level: Compression,
    gzip: GzEncoder<Vec<u8>>,
}

impl GzipEncoder {
    /// `level` is a gzip level from 1 to 9.
    pub fn new(level: u32) -> Self {
        let level = Compression::new(level);
        Self {
            level,
            gzip: GzEncoder::new(Vec::new(), level),
        }
    }
}

impl BodyEncoder for GzipEncoder {
    fn reset(&mut self) {
        let mut buf = mem::take(self.gzip.get_mut());
        buf.clear();
        self.gzip = GzEncoder::new(buf, self.level);
    }

    fn marshal(&mut self, payload: Payload<'_>) -> Result<(), EncodeError> {
        self.reset();
        let result = write_payload(&mut self.gzip, payload);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn append(&mut self, document: &Document) -> Result<(), EncodeError> {
        write_line(&mut self.gzip, document)
    }

    fn add_headers(&self, headers: &mut HeaderMap) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }

    fn finish(&mut self) -> Result<Bytes, EncodeError> {
        self.gzip.try_finish().context(IoSnafu)?;
        Ok(Bytes::copy_from_slice(self.gzip.get_ref()))
    }
}
