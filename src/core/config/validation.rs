use serde_json::{Map, Value};

use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.provider", "provider")?;
        validate_optional_string_field(llm, "llm.chat_model", "chat_model")?;
        validate_optional_string_field(llm, "llm.embedding_model", "embedding_model")?;
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 1.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 200_000)?;
        validate_u64_field(
            llm,
            "llm.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
        for key in [
            "openai_api_key",
            "anthropic_api_key",
            "google_api_key",
            "openai_base_url",
            "anthropic_base_url",
            "google_base_url",
        ] {
            validate_optional_string_field(llm, &format!("llm.{}", key), key)?;
        }
    }

    if let Some(docs) = expect_optional_object(root, "docs")? {
        validate_optional_string_field(docs, "docs.dir", "dir")?;
        validate_bool_field(docs, "docs.page_files_only", "page_files_only")?;
        validate_string_array_field(docs, "docs.extensions", "extensions")?;
    }

    if let Some(index) = expect_optional_object(root, "index")? {
        validate_u64_field(index, "index.chunk_size", "chunk_size", 2, 100_000)?;
        validate_u64_field(index, "index.chunk_overlap", "chunk_overlap", 1, 99_999)?;
        validate_u64_field(
            index,
            "index.max_block_chars",
            "max_block_chars",
            1,
            10_000_000,
        )?;
        validate_bool_field(index, "index.warm_on_startup", "warm_on_startup")?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_u64_field(rag, "rag.top_k", "top_k", 1, 50)?;
        validate_u64_field(
            rag,
            "rag.max_context_chars",
            "max_context_chars",
            100,
            1_000_000,
        )?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(config_type_error(key, "object")),
    }
}

fn validate_bool_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.as_bool().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "boolean"))
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(ApiError::Configuration(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::Configuration(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::Configuration(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
