use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::validation::validate_config;
use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 4] = ["max_tokens", "total_tokens", "token_count", "tokens"];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("DOCS_RAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Loads `config.yml` and `secrets.yaml`, secrets taking precedence.
    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        let merged = deep_merge(&public_config, &secrets_config);
        validate_config(&merged)?;
        Ok(merged)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, ApiError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|err| {
        ApiError::Configuration(format!("Failed to read {}: {}", path.display(), err))
    })?;
    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_yaml::from_str::<Value>(&contents) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(_) => Err(ApiError::Configuration(format!(
            "{} must contain a mapping at the top level",
            path.display()
        ))),
        Err(err) => Err(ApiError::Configuration(format!(
            "Failed to parse {}: {}",
            path.display(),
            err
        ))),
    }
}

pub(crate) fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "llm": { "provider": "openai", "temperature": 0.2 },
            "rag": { "top_k": 6 }
        });
        let override_value = json!({
            "llm": { "openai_api_key": "sk-test" },
            "rag": { "top_k": 4 }
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "llm": { "provider": "openai", "temperature": 0.2, "openai_api_key": "sk-test" },
                "rag": { "top_k": 4 }
            })
        );
    }

    #[test]
    fn redaction_hides_keys_but_keeps_token_limits() {
        let input = json!({
            "llm": {
                "openai_api_key": "sk-live",
                "max_tokens": 1024,
                "provider": "openai"
            }
        });

        let redacted = redact_sensitive_values(&input);

        assert_eq!(redacted["llm"]["openai_api_key"], json!("****"));
        assert_eq!(redacted["llm"]["max_tokens"], json!(1024));
        assert_eq!(redacted["llm"]["provider"], json!("openai"));
    }

    #[test]
    fn load_yaml_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yml");
        fs::write(&path, "llm: [unclosed").expect("write");

        let err = load_yaml_file(&path).expect_err("invalid yaml must fail");
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[test]
    fn load_yaml_treats_missing_and_empty_files_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.yml");
        assert_eq!(load_yaml_file(&missing).expect("missing"), json!({}));

        let empty = dir.path().join("empty.yml");
        fs::write(&empty, "\n").expect("write");
        assert_eq!(load_yaml_file(&empty).expect("empty"), json!({}));
    }
}
