use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::error::{ImageError, Result};
use crate::openai::DEFAULT_BASE_URL;
use crate::options::AllowedModelSet;
use crate::sanitizer::{DEFAULT_MAX_PROMPT_CHARS, PromptSanitizer};

/// Bearer credential for the image API. Held in memory only and never printed.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Stdio,
    Http,
}

#[derive(Debug, Parser)]
#[command(
    name = "image-gen-rmcp",
    version,
    about = "MCP server exposing text-to-image and image-to-image tools backed by the OpenAI Images API"
)]
pub struct Cli {
    /// API credential. Without it the server still answers tool discovery.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Allowed model identifiers; the first one is the default.
    #[arg(long, num_args = 1.., value_delimiter = ',', env = "IMAGE_MODELS")]
    pub models: Vec<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Timeout for a single request to the image API, in seconds.
    #[arg(long, env = "IMAGE_REQUEST_TIMEOUT_SECS", default_value_t = 300)]
    pub timeout_secs: u64,

    /// Directory used when a tool call has no outputPath. Defaults to the working directory.
    #[arg(long, env = "IMAGE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, env = "PROMPT_MAX_CHARS", default_value_t = DEFAULT_MAX_PROMPT_CHARS)]
    pub prompt_max_chars: usize,

    /// Case-insensitive terms that are rejected in prompts.
    #[arg(long, value_delimiter = ',', env = "PROMPT_BLOCKLIST")]
    pub prompt_blocklist: Vec<String>,

    #[arg(long, value_enum, env = "MCP_TRANSPORT", default_value_t = TransportKind::Stdio)]
    pub transport: TransportKind,

    #[arg(long, env = "MCP_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Prefixes the HTTP endpoint path as `/{secret}/mcp`.
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Print the tool schemas as JSON and exit.
    #[arg(long, conflicts_with = "call")]
    pub list_tools: bool,

    /// Invoke one tool and print its result instead of serving.
    #[arg(long, value_name = "TOOL")]
    pub call: Option<String>,

    /// JSON object of arguments for `--call`.
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub arguments: String,
}

/// Process-lifetime configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub api_key: Option<ApiKey>,
    pub allowed_models: AllowedModelSet,
    pub base_url: Url,
    pub request_timeout: Duration,
    pub output_dir: Option<PathBuf>,
    pub sanitizer: PromptSanitizer,
    pub transport: TransportKind,
    pub port: u16,
    pub secret_key: Option<String>,
}

impl ServerConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let api_key = non_blank(cli.api_key.as_deref()).map(ApiKey::new);
        let allowed_models = if api_key.is_some() {
            AllowedModelSet::from_allow_list(&cli.models)
        } else {
            AllowedModelSet::discovery()
        };
        if cli.timeout_secs == 0 {
            return Err(ImageError::Configuration(
                "IMAGE_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            api_key,
            allowed_models,
            base_url: validate_base_url(&cli.base_url)?,
            request_timeout: Duration::from_secs(cli.timeout_secs),
            output_dir: cli.output_dir.clone(),
            sanitizer: PromptSanitizer::new(cli.prompt_max_chars, cli.prompt_blocklist.clone()),
            transport: cli.transport,
            port: cli.port,
            secret_key: non_blank(cli.secret_key.as_deref()),
        })
    }

    pub fn mcp_path(&self) -> String {
        match self.secret_key.as_deref() {
            Some(value) => format!("/{value}/mcp"),
            None => "/mcp".to_string(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn validate_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).map_err(|err| {
        ImageError::Configuration(format!("invalid OPENAI_BASE_URL '{trimmed}': {err}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(ImageError::Configuration(format!(
            "OPENAI_BASE_URL must use http or https, got {scheme}"
        ))),
    }
}
