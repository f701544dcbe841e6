// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Environment variable loader
///
/// With a prefix, `SWITCHYARD_SWR_RETRY_DELAY_MS` becomes the key
/// `swr.retry_delay_ms`: the prefix is dropped, the name is lowercased and
/// the first underscore separates the section from the field.
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load all environment variables
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.collect(env::vars()))
    }

    fn collect(&self, vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
        let mut config = HashMap::new();

        for (key, value) in vars {
            match &self.prefix {
                Some(prefix) => {
                    let Some(rest) = key
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_prefix('_'))
                    else {
                        continue;
                    };
                    if !rest.is_empty() {
                        config.insert(env_key_to_path(rest), value);
                    }
                }
                None => {
                    config.insert(key.to_lowercase(), value);
                }
            }
        }

        config
    }

    /// Load a specific variable by its dotted key, e.g. `swr.retry`
    pub fn load_var(&self, key: &str) -> Result<String> {
        let name = key.replace('.', "_").to_uppercase();
        let full_key = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, name),
            None => name,
        };

        env::var(&full_key).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

/// `SWR_RETRY_DELAY_MS` -> `swr.retry_delay_ms`
pub(crate) fn env_key_to_path(name: &str) -> String {
    let name = name.to_lowercase();
    match name.split_once('_') {
        Some((section, field)) if !section.is_empty() && !field.is_empty() => {
            format!("{}.{}", section, field)
        }
        _ => name,
    }
}
