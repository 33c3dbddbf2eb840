use std::fmt;

use indexmap::IndexMap;
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use snafu::{ResultExt, Snafu};

use crate::event::Event;

/// Key under which the `sa` channel keeps the untouched message.
pub const ORIGIN_MSG_KEY: &str = "#originMsg";

const MESSAGE_FIELD: &str = "message";

/// Payload envelope expected by the downstream collector.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// The message is a JSON object and is sent as is.
    #[default]
    Default,
    /// `{"data": <message>, "appid": "<app_id>"}`
    Shushu,
    /// `{"content": "<message as a JSON string>"}`
    Openobserve,
    /// The message is kept under `#originMsg` for the form encoder.
    Sa,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Default => "default",
            Channel::Shushu => "shushu",
            Channel::Openobserve => "openobserve",
            Channel::Sa => "sa",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Snafu)]
pub enum DocumentError {
    #[snafu(display("Event has no non-empty `message` field"))]
    EmptyMessage,
    #[snafu(display("Message is not a JSON object: {}", source))]
    NotAnObject { source: serde_json::Error },
}

/// One outgoing document: keys mapped to raw JSON fragments.
///
/// Fragments are not checked when the document is built. Serializing a
/// document with a fragment that is not valid JSON fails, which is how an
/// unencodable payload surfaces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Document(IndexMap<String, String>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, fragment: impl Into<String>) {
        self.0.insert(key.into(), fragment.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Builds the document for `event` according to `channel`.
    pub fn from_event(event: &Event, channel: Channel, app_id: &str) -> Result<Self, DocumentError> {
        let message = message_body(event)?;

        let mut document = Document::new();
        match channel {
            Channel::Shushu => {
                document.insert("data", message);
                document.insert("appid", serde_json::Value::from(app_id).to_string());
            }
            Channel::Openobserve => {
                document.insert("content", serde_json::Value::from(message).to_string());
            }
            Channel::Sa => {
                document.insert(ORIGIN_MSG_KEY, message);
            }
            Channel::Default => {
                let fields: IndexMap<String, Box<RawValue>> =
                    serde_json::from_str(message).context(NotAnObjectSnafu)?;
                for (key, value) in fields {
                    document.insert(key, value.get());
                }
            }
        }
        Ok(document)
    }
}

fn message_body(event: &Event) -> Result<&str, DocumentError> {
    event
        .get(MESSAGE_FIELD)
        .and_then(|value| value.as_str())
        .filter(|message| !message.is_empty())
        .ok_or(DocumentError::EmptyMessage)
}

impl Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, fragment) in &self.0 {
            let raw: &RawValue = serde_json::from_str(fragment).map_err(|error| {
                <S::Error as serde::ser::Error>::custom(format!(
                    "field {:?} is not valid JSON: {}",
                    key, error
                ))
            })?;
            map.serialize_entry(key, raw)?;
        }
        map.end()
    }
}
