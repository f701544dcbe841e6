// Configuration file loaders

use crate::env::env_key_to_path;
use crate::{ConfigError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Json,
    Toml,
    Env,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "env" => Some(FileFormat::Env),
            _ => None,
        }
    }
}

/// Configuration file loader
///
/// Every format is read into a JSON object. Nested tables become dotted
/// keys through [`ConfigLoader::flatten`].
pub struct ConfigLoader {
    format: FileFormat,
}

impl ConfigLoader {
    pub fn new(format: FileFormat) -> Self {
        Self { format }
    }

    /// Auto-detect format from file extension
    pub fn auto(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let format = FileFormat::from_extension(ext)
            .ok_or_else(|| ConfigError::LoadError(format!("Unsupported format: {}", ext)))?;

        Ok(Self::new(format))
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Value> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.parse(&content)
    }

    /// Parse configuration from string
    pub fn parse(&self, content: &str) -> Result<Value> {
        match self.format {
            FileFormat::Json => parse_json(content),
            FileFormat::Toml => parse_toml(content),
            FileFormat::Env => Ok(parse_env(content)),
        }
    }

    /// Turn nested objects into dotted keys: `{"swr": {"retry": 5}}`
    /// yields `("swr.retry", 5)`. Arrays and scalars are leaves.
    pub fn flatten(value: Value) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        if let Value::Object(map) = value {
            flatten_into(&mut out, None, map);
        }
        out
    }
}

fn flatten_into(out: &mut Vec<(String, Value)>, prefix: Option<&str>, map: Map<String, Value>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key,
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&path), inner),
            leaf => out.push((path, leaf)),
        }
    }
}

fn parse_json(content: &str) -> Result<Value> {
    serde_json::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("JSON parse error: {}", e)))
}

fn parse_toml(content: &str) -> Result<Value> {
    let toml_value: toml::Value = toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    serde_json::to_value(toml_value)
        .map_err(|e| ConfigError::ParseError(format!("TOML to JSON conversion error: {}", e)))
}

/// `KEY=value` lines; keys map like environment variables
fn parse_env(content: &str) -> Value {
    let mut map = Map::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            map.insert(env_key_to_path(key.trim()), Value::String(value.to_string()));
        }
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json() {
        let loader = ConfigLoader::new(FileFormat::Json);
        let result = loader.parse(r#"{"swr": {"retry": 2}}"#).unwrap();
        assert_eq!(result["swr"]["retry"], 2);
    }

    #[test]
    fn test_parse_toml_sections() {
        let loader = ConfigLoader::new(FileFormat::Toml);
        let toml = r#"
            [swr]
            cache_time_secs = 60
            enable_background_refresh = true

            [log]
            level = "debug"
        "#;

        let flat = ConfigLoader::flatten(loader.parse(toml).unwrap());
        assert!(flat.contains(&("swr.cache_time_secs".to_string(), json!(60))));
        assert!(flat.contains(&("swr.enable_background_refresh".to_string(), json!(true))));
        assert!(flat.contains(&("log.level".to_string(), json!("debug"))));
    }

    #[test]
    fn test_parse_env() {
        let loader = ConfigLoader::new(FileFormat::Env);
        let env = r#"
            SWR_RETRY=4
            # Comment
            LOG_FORMAT="pretty"
        "#;

        let result = loader.parse(env).unwrap();
        assert_eq!(result["swr.retry"], "4");
        assert_eq!(result["log.format"], "pretty");
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConfigLoader::new(FileFormat::Json).parse("{").is_err());
        assert!(ConfigLoader::new(FileFormat::Toml).parse("= nope").is_err());
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(FileFormat::from_extension("json"), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_extension("TOML"), Some(FileFormat::Toml));
        assert_eq!(FileFormat::from_extension("env"), Some(FileFormat::Env));
        assert_eq!(FileFormat::from_extension("yaml"), None);
        assert!(ConfigLoader::auto("switchyard.toml").is_ok());
        assert!(ConfigLoader::auto("switchyard").is_err());
    }
}
