use std::io::Write;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use http::{
    header::{CONTENT_ENCODING, CONTENT_TYPE},
    HeaderMap, HeaderValue,
};

use super::{
    document::{Document, ORIGIN_MSG_KEY},
    encoder::{BodyEncoder, EncodeError, Payload},
};

/// Form encoder for the `sa` collector.
///
/// The raw message of one document, or a JSON array of the raw messages of
/// several, is gzipped and base64 encoded into a form field:
/// `data=<...>&gzip=1` for one document, `data_list=<...>&gzip=1` for more.
#[derive(Debug, Default)]
pub struct SaEncoder {
    buf: Vec<u8>,
}

impl SaEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

fn origin_message(document: &Document) -> Result<&str, EncodeError> {
    document
        .get(ORIGIN_MSG_KEY)
        .filter(|message| !message.is_empty())
        .ok_or(EncodeError::MissingOriginMessage)
}

fn gzip(payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(payload)
        .and_then(|()| gz.finish())
        .map_err(|source| EncodeError::Io { source })
}

impl BodyEncoder for SaEncoder {
    fn reset(&mut self) {
        self.buf.clear();
    }

    fn marshal(&mut self, payload: Payload<'_>) -> Result<(), EncodeError> {
        self.reset();

        let (field, message) = match payload {
            Payload::One(document) => ("data", origin_message(document)?.to_owned()),
            Payload::Many([]) => return Err(EncodeError::EmptyEventList),
            Payload::Many([document]) => ("data", origin_message(document)?.to_owned()),
            Payload::Many(documents) => {
                let mut list = String::from("[");
                for (i, document) in documents.iter().enumerate() {
                    if i > 0 {
                        list.push(',');
                    }
                    list.push_str(origin_message(document)?);
                }
                list.push(']');
                ("data_list", list)
            }
        };

        let compressed = gzip(message.as_bytes())?;
        let encoded = BASE64_STANDARD.encode(compressed);

        self.buf.extend_from_slice(field.as_bytes());
        self.buf.push(b'=');
        for chunk in url::form_urlencoded::byte_serialize(encoded.as_bytes()) {
            self.buf.extend_from_slice(chunk.as_bytes());
        }
        self.buf.extend_from_slice(b"&gzip=1");
        Ok(())
    }

    fn append(&mut self, _document: &Document) -> Result<(), EncodeError> {
        Err(EncodeError::NotSupported {
            operation: "append",
        })
    }

    fn add_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    }

    fn finish(&mut self) -> Result<Bytes, EncodeError> {
        Ok(Bytes::copy_from_slice(&self.buf))
    }
}
