use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{SinkConfig, SinkContext};
use crate::sinks::Group;

/// A set of named outputs, as read from a TOML document:
///
/// ```toml
/// [outputs.events]
/// type = "http"
/// hosts = ["collector:8080"]
/// ```
#[derive(Deserialize, Serialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub outputs: IndexMap<String, Box<dyn SinkConfig>>,
}

impl Config {
    /// Builds every output, collecting one message per output that failed.
    pub fn build(&self, cx: &SinkContext) -> Result<IndexMap<String, Group>, Vec<String>> {
        let mut groups = IndexMap::new();
        let mut errors = Vec::new();

        for (name, output) in &self.outputs {
            match output.build(cx.clone()) {
                Ok(group) => {
                    debug!(
                        message = "Output built.",
                        output = %name,
                        sink = output.sink_type(),
                        clients = group.clients.len(),
                    );
                    groups.insert(name.clone(), group);
                }
                Err(error) => errors.push(format!("Output \"{}\": {}", name, error)),
            }
        }

        if errors.is_empty() {
            Ok(groups)
        } else {
            Err(errors)
        }
    }
}

pub fn load_from_str(input: &str) -> Result<Config, Vec<String>> {
    let config: Config = toml::from_str(input).map_err(|error| vec![error.to_string()])?;
    if config.outputs.is_empty() {
        warn!("No outputs configured.");
    }
    Ok(config)
}
