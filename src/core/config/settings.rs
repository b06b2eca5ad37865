//! Typed settings resolved from the merged YAML config plus environment
//! overrides. Environment variables win over file values.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::paths::AppPaths;
use crate::core::errors::ApiError;

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_MAX_BLOCK_CHARS: usize = 200_000;
pub const DEFAULT_TOP_K: usize = 6;
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

const DEFAULT_EXTENSIONS: [&str; 4] = [".ts", ".tsx", ".js", ".jsx"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        match raw.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "google" => Ok(ProviderKind::Google),
            other => Err(ApiError::Configuration(format!(
                "Invalid LLM_PROVIDER: {}. Must be one of: openai, anthropic, google",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::Google => "Google",
        }
    }

    pub fn default_chat_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-3-5-sonnet-20241022",
            ProviderKind::Google => "gemini-2.5-flash-lite",
        }
    }

    /// Anthropic has no embeddings API; its default points at the OpenAI
    /// model used by the fallback embedder.
    pub fn default_embedding_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi | ProviderKind::Anthropic => "text-embedding-3-small",
            ProviderKind::Google => "text-embedding-004",
        }
    }

    pub fn has_native_embeddings(&self) -> bool {
        !matches!(self, ProviderKind::Anthropic)
    }

    pub fn credential_env(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::Google => "GOOGLE_API_KEY",
        }
    }

    fn credential_config_key(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai_api_key",
            ProviderKind::Anthropic => "anthropic_api_key",
            ProviderKind::Google => "google_api_key",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Google => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct ProviderEndpoint {
    pub api_key: Option<String>,
    pub base_url: String,
}

impl fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub provider: ProviderKind,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub openai: ProviderEndpoint,
    pub anthropic: ProviderEndpoint,
    pub google: ProviderEndpoint,
}

impl LlmSettings {
    pub fn endpoint(&self, kind: ProviderKind) -> &ProviderEndpoint {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
            ProviderKind::Google => &self.google,
        }
    }

    pub fn display_name(&self) -> String {
        format!("{} ({})", self.provider.display_name(), self.chat_model)
    }
}

#[derive(Debug, Clone)]
pub struct DocsSettings {
    /// Directory the scanner walks; document paths stay relative to `root`.
    pub dir: PathBuf,
    pub root: PathBuf,
    pub page_files_only: bool,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_block_chars: usize,
    pub warm_on_startup: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_block_chars: DEFAULT_MAX_BLOCK_CHARS,
            warm_on_startup: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub top_k: usize,
    pub max_context_chars: usize,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub llm: LlmSettings,
    pub docs: DocsSettings,
    pub index: IndexSettings,
    pub rag: RagSettings,
    pub server: ServerSettings,
}

impl AppSettings {
    pub fn from_env(config: &Value, paths: &AppPaths) -> Result<Self, ApiError> {
        Self::resolve(config, paths, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(config: &Value, paths: &AppPaths, env: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            llm: resolve_llm(config.get("llm"), &env)?,
            docs: resolve_docs(config.get("docs"), paths),
            index: resolve_index(config.get("index")),
            rag: resolve_rag(config.get("rag")),
            server: resolve_server(config.get("server"), &env),
        })
    }
}

fn resolve_llm<F>(section: Option<&Value>, env: &F) -> Result<LlmSettings, ApiError>
where
    F: Fn(&str) -> Option<String>,
{
    let text = |key: &str| {
        section
            .and_then(|s| s.get(key))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let provider_raw = env("LLM_PROVIDER")
        .or_else(|| text("provider"))
        .unwrap_or_else(|| "openai".to_string());
    let provider = ProviderKind::parse(&provider_raw)?;

    let temperature = match env("LLM_TEMPERATURE") {
        Some(raw) => raw.trim().parse::<f32>().map_err(|_| {
            ApiError::Configuration(format!("Invalid LLM_TEMPERATURE: {}", raw))
        })?,
        None => section
            .and_then(|s| s.get("temperature"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0) as f32,
    };
    if !(0.0..=1.0).contains(&temperature) {
        return Err(ApiError::Configuration(format!(
            "Temperature must be between 0 and 1, got {}",
            temperature
        )));
    }

    let endpoint = |kind: ProviderKind| ProviderEndpoint {
        api_key: env(kind.credential_env()).or_else(|| text(kind.credential_config_key())),
        base_url: text(&format!("{}_base_url", kind.as_str()))
            .unwrap_or_else(|| kind.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string(),
    };

    let settings = LlmSettings {
        provider,
        chat_model: env("LLM_CHAT_MODEL")
            .or_else(|| text("chat_model"))
            .unwrap_or_else(|| provider.default_chat_model().to_string()),
        embedding_model: env("LLM_EMBEDDING_MODEL")
            .or_else(|| text("embedding_model"))
            .unwrap_or_else(|| provider.default_embedding_model().to_string()),
        temperature,
        max_tokens: section
            .and_then(|s| s.get("max_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(1024) as u32,
        request_timeout: Duration::from_secs(
            section
                .and_then(|s| s.get("request_timeout_secs"))
                .and_then(|v| v.as_u64())
                .unwrap_or(120),
        ),
        openai: endpoint(ProviderKind::OpenAi),
        anthropic: endpoint(ProviderKind::Anthropic),
        google: endpoint(ProviderKind::Google),
    };

    if settings.endpoint(provider).api_key.is_none() {
        return Err(ApiError::Configuration(format!(
            "Missing API key for {}. Please set {} in your environment variables.",
            provider,
            provider.credential_env()
        )));
    }

    Ok(settings)
}

fn resolve_docs(section: Option<&Value>, paths: &AppPaths) -> DocsSettings {
    let dir = section
        .and_then(|s| s.get("dir"))
        .and_then(|v| v.as_str())
        .unwrap_or("app");
    let extensions = section
        .and_then(|s| s.get("extensions"))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(normalize_extension)
                .collect::<Vec<_>>()
        })
        .filter(|items| !items.is_empty())
        .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect());

    DocsSettings {
        dir: paths.resolve(dir),
        root: paths.project_root.clone(),
        page_files_only: section
            .and_then(|s| s.get("page_files_only"))
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        extensions,
    }
}

fn normalize_extension(raw: &str) -> String {
    let trimmed = raw.trim().to_lowercase();
    if trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

fn resolve_index(section: Option<&Value>) -> IndexSettings {
    let number = |key: &str, default: usize| {
        section
            .and_then(|s| s.get(key))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(default)
    };
    IndexSettings {
        chunk_size: number("chunk_size", DEFAULT_CHUNK_SIZE),
        chunk_overlap: number("chunk_overlap", DEFAULT_CHUNK_OVERLAP),
        max_block_chars: number("max_block_chars", DEFAULT_MAX_BLOCK_CHARS),
        warm_on_startup: section
            .and_then(|s| s.get("warm_on_startup"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    }
}

fn resolve_rag(section: Option<&Value>) -> RagSettings {
    let number = |key: &str, default: usize| {
        section
            .and_then(|s| s.get(key))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(default)
    };
    RagSettings {
        top_k: number("top_k", DEFAULT_TOP_K),
        max_context_chars: number("max_context_chars", DEFAULT_MAX_CONTEXT_CHARS),
    }
}

fn resolve_server<F>(section: Option<&Value>, env: &F) -> ServerSettings
where
    F: Fn(&str) -> Option<String>,
{
    let port = env("PORT")
        .and_then(|raw| raw.parse::<u16>().ok())
        .or_else(|| {
            section
                .and_then(|s| s.get("port"))
                .and_then(|v| v.as_u64())
                .map(|v| v as u16)
        })
        .unwrap_or(3000);

    ServerSettings {
        host: section
            .and_then(|s| s.get("host"))
            .and_then(|v| v.as_str())
            .unwrap_or("127.0.0.1")
            .to_string(),
        port,
        cors_allowed_origins: section
            .and_then(|s| s.get("cors_allowed_origins"))
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|item| item.as_str())
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    }
}
