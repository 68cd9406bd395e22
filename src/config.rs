use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Absolute directory every operation is confined to.
    /// Supports ${ENV_VAR} substitution
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// OpenAI-compatible chat completions URL
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    /// Bearer credential. Supports ${ENV_VAR} substitution
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// External command-line tools used by some operations.
#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    /// Upper bound for a single external command run
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_git")]
    pub git: String,
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    /// ImageMagick `convert` (or `magick`)
    #[serde(default = "default_convert")]
    pub convert: String,
    #[serde(default = "default_whisper")]
    pub whisper: String,
    #[serde(default = "default_prettier")]
    pub prettier: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout(),
            git: default_git(),
            tesseract: default_tesseract(),
            convert: default_convert(),
            whisper: default_whisper(),
            prettier: default_prettier(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_tool_timeout() -> u64 {
    120
}

fn default_git() -> String {
    "git".to_string()
}

fn default_tesseract() -> String {
    "tesseract".to_string()
}

fn default_convert() -> String {
    "convert".to_string()
}

fn default_whisper() -> String {
    "whisper".to_string()
}

fn default_prettier() -> String {
    "prettier".to_string()
}

impl ServerConfig {
    /// Socket address string for the listener, e.g. `"127.0.0.1:8000"`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses TOML content after expanding environment variables
    /// like ${AIPROXY_TOKEN}.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }
}
