use serde::Deserialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Cap on the inbound multipart body — also bounds what the extractor
    /// ever sees downstream
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 8080 }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    /// Responses API endpoint (full URL, POSTed to directly)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Falls back to the OPENAI_API_KEY env var when unset
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_prompt_path")]
    pub prompt_path: String,
}

fn default_endpoint() -> String { "https://api.openai.com/v1/responses".into() }
fn default_model() -> String { "gpt-5-mini".into() }
fn default_timeout() -> u64 { 60 }
fn default_prompt_path() -> String { "prompts/car_identification.txt".into() }

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout(),
            prompt_path: default_prompt_path(),
        }
    }
}

impl VisionConfig {
    /// Config key wins; empty strings count as unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplyConfig {
    /// Photo bundled into every successful reply alongside the car JSON
    #[serde(default = "default_sample_photo")]
    pub sample_photo_path: String,
}

fn default_sample_photo() -> String { "car2.jpg".into() }

impl Default for ReplyConfig {
    fn default() -> Self {
        Self { sample_photo_path: default_sample_photo() }
    }
}

impl Config {
    /// Load from TOML; a missing file is fine, everything has a default.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!("config file {} not found, using defaults", path.display());
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gets_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.vision.model, "gpt-5-mini");
        assert_eq!(config.vision.timeout_secs, 60);
        assert_eq!(config.reply.sample_photo_path, "car2.jpg");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            "[vision]\nmodel = \"gpt-5\"\n\n[server]\nport = 9000\n",
        )
        .unwrap();
        assert_eq!(config.vision.model, "gpt-5");
        assert_eq!(config.vision.endpoint, "https://api.openai.com/v1/responses");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_empty_api_key_counts_as_unset() {
        let vision = VisionConfig { api_key: Some(String::new()), ..Default::default() };
        // either None or whatever the environment provides — never Some("")
        assert_ne!(vision.resolve_api_key(), Some(String::new()));
    }
}
