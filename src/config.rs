use anyhow::{anyhow, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm_providers::{LLMProviderType, RequestOptions};
use crate::prompt::PromptBoilerplate;
use crate::retry::RetryPolicy;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub reading: ReadingConfig,
    pub catalog: CatalogConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Credentials and endpoint for one backend. A missing key keeps the provider out of the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCredentials {
    pub provider_type: LLMProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub order: Vec<LLMProviderType>,
    pub openai: ProviderCredentials,
    pub gemini: ProviderCredentials,
    pub huggingface: ProviderCredentials,
}

/// Tunables for the reading chain
#[derive(Debug, Clone)]
pub struct ReadingConfig {
    pub retry: RetryPolicy,
    pub request: RequestOptions,
    pub min_reading_chars: usize,
    pub deadline: Option<Duration>,
    pub boilerplate: PromptBoilerplate,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub path: String,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

pub const DEFAULT_MIN_READING_CHARS: usize = 50;

const MAX_TRIES_LIMIT: u32 = 20;
const MAX_BACKOFF_BASE: Duration = Duration::from_secs(60);

const PLACEHOLDER_KEYS: [&str; 3] = ["", "default_key", "your-api-key"];

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        log_system_event!(config, "Loading application configuration");

        let config = Config {
            providers: ProvidersConfig::from_lookup(&lookup)?,
            reading: ReadingConfig::from_lookup(&lookup)?,
            catalog: CatalogConfig {
                path: lookup("CARD_CATALOG_PATH").unwrap_or_else(|| "data/cards.json".to_string()),
            },
            server: ServerConfig::from_lookup(&lookup)?,
            logging: LoggingConfig::from_lookup(&lookup),
        };

        log_system_event!(config, "Configuration loaded successfully");
        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    pub fn log_configuration_summary(&self) {
        let configured: Vec<&str> = self
            .providers
            .chain()
            .filter(|c| c.api_key.is_some())
            .map(|c| c.provider_type.name())
            .collect();

        info!(
            provider_order = ?self.providers.order,
            configured_providers = ?configured,
            openai_key = %self.providers.openai.masked_key(),
            gemini_key = %self.providers.gemini.masked_key(),
            huggingface_key = %self.providers.huggingface.masked_key(),
            max_tries = self.reading.retry.max_tries,
            min_reading_chars = self.reading.min_reading_chars,
            catalog_path = %self.catalog.path,
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        let retry = &self.reading.retry;
        if retry.max_tries == 0 || retry.max_tries > MAX_TRIES_LIMIT {
            return Err(anyhow!(
                "READING_MAX_TRIES must be between 1 and {}",
                MAX_TRIES_LIMIT
            ));
        }
        if retry.base_delay > MAX_BACKOFF_BASE {
            return Err(anyhow!(
                "READING_BACKOFF_BASE_MS must be at most {}",
                MAX_BACKOFF_BASE.as_millis()
            ));
        }
        if !(retry.multiplier.is_finite() && retry.multiplier >= 1.0) {
            return Err(anyhow!("READING_BACKOFF_MULTIPLIER must be a finite number >= 1.0"));
        }
        if self.reading.request.timeout.is_zero() {
            return Err(anyhow!("READING_TIMEOUT_SECS must be greater than 0"));
        }

        if self.providers.chain().all(|c| c.api_key.is_none()) {
            warn!("No LLM provider credentials configured - every reading will use the deterministic fallback");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
        {
            warn!("Log filter '{}' does not start with a plain level", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl ProviderCredentials {
    fn from_lookup<F>(lookup: &F, provider_type: LLMProviderType, prefix: &str) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut api_key = lookup(&format!("{}_API_KEY", prefix));
        if provider_type == LLMProviderType::HuggingFace && api_key.is_none() {
            api_key = lookup("HF_TOKEN");
        }

        Self {
            provider_type,
            api_key: api_key
                .map(|k| k.trim().to_string())
                .filter(|k| !PLACEHOLDER_KEYS.contains(&k.as_str())),
            base_url: lookup(&format!("{}_BASE_URL", prefix)).filter(|v| !v.trim().is_empty()),
            model: lookup(&format!("{}_MODEL", prefix)).filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn masked_key(&self) -> String {
        match &self.api_key {
            Some(key) => mask_sensitive_data(key),
            None => "<unset>".to_string(),
        }
    }
}

impl ProvidersConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let order_str = lookup("READING_PROVIDER_ORDER")
            .unwrap_or_else(|| "openai,gemini,huggingface".to_string());

        Ok(ProvidersConfig {
            order: parse_provider_order(&order_str)?,
            openai: ProviderCredentials::from_lookup(lookup, LLMProviderType::OpenAI, "OPENAI"),
            gemini: ProviderCredentials::from_lookup(lookup, LLMProviderType::Gemini, "GEMINI"),
            huggingface: ProviderCredentials::from_lookup(
                lookup,
                LLMProviderType::HuggingFace,
                "HUGGINGFACE",
            ),
        })
    }

    pub fn credentials(&self, provider_type: LLMProviderType) -> &ProviderCredentials {
        match provider_type {
            LLMProviderType::OpenAI => &self.openai,
            LLMProviderType::Gemini => &self.gemini,
            LLMProviderType::HuggingFace => &self.huggingface,
        }
    }

    /// Credentials in configured priority order
    pub fn chain(&self) -> impl Iterator<Item = &ProviderCredentials> {
        self.order.iter().map(|t| self.credentials(*t))
    }
}

fn parse_provider_order(value: &str) -> Result<Vec<LLMProviderType>> {
    let mut order = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let provider = LLMProviderType::parse(name)
            .ok_or_else(|| anyhow!("Unknown provider '{}' in READING_PROVIDER_ORDER", name))?;
        if !order.contains(&provider) {
            order.push(provider);
        }
    }
    Ok(order)
}

impl ReadingConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_tries: parse_or(lookup, "READING_MAX_TRIES", defaults.max_tries)?,
            base_delay: Duration::from_millis(parse_or(
                lookup,
                "READING_BACKOFF_BASE_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            multiplier: parse_or(lookup, "READING_BACKOFF_MULTIPLIER", defaults.multiplier)?,
            busy_wait_cap: Duration::from_secs(parse_or(
                lookup,
                "READING_BUSY_WAIT_CAP_SECS",
                defaults.busy_wait_cap.as_secs(),
            )?),
            default_busy_wait: defaults.default_busy_wait,
        };

        let request_defaults = RequestOptions::default();
        let request = RequestOptions {
            timeout: Duration::from_secs(parse_or(
                lookup,
                "READING_TIMEOUT_SECS",
                request_defaults.timeout.as_secs(),
            )?),
            ..request_defaults
        };

        let deadline = match lookup("READING_DEADLINE_SECS") {
            Some(raw) if !raw.trim().is_empty() => Some(Duration::from_secs(
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| anyhow!("Invalid READING_DEADLINE_SECS value: '{}'", raw))?,
            )),
            _ => None,
        };

        let mut boilerplate = PromptBoilerplate::default();
        if let Some(system) = lookup("READING_SYSTEM_PROMPT").filter(|s| !s.trim().is_empty()) {
            boilerplate.system = system;
        }
        if let Some(directive) = lookup("READING_DIRECTIVE").filter(|s| !s.trim().is_empty()) {
            boilerplate.directive = directive;
        }

        Ok(ReadingConfig {
            retry,
            request,
            min_reading_chars: parse_or(lookup, "READING_MIN_CHARS", DEFAULT_MIN_READING_CHARS)?,
            deadline,
            boilerplate,
        })
    }
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request: RequestOptions::default(),
            min_reading_chars: DEFAULT_MIN_READING_CHARS,
            deadline: None,
            boilerplate: PromptBoilerplate::default(),
        }
    }
}

impl ServerConfig {
    fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port_str = lookup("PORT").unwrap_or_else(|| "5000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or(true)
        };

        LoggingConfig {
            level: lookup("RUST_LOG").unwrap_or_else(|| "info,tarot_reading=debug".to_string()),
            file_enabled: flag("LOG_FILE_ENABLED"),
            console_enabled: flag("LOG_CONSOLE_ENABLED"),
            log_directory: lookup("LOG_DIRECTORY").unwrap_or_else(|| "logs".to_string()),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'", key, raw)),
        _ => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sk-1234567890abcdef"), "sk-1***cdef");
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(
            config.providers.order,
            vec![
                LLMProviderType::OpenAI,
                LLMProviderType::Gemini,
                LLMProviderType::HuggingFace
            ]
        );
        assert!(config.providers.chain().all(|c| c.api_key.is_none()));
        assert_eq!(config.reading.retry, RetryPolicy::default());
        assert_eq!(config.reading.min_reading_chars, 50);
        assert_eq!(config.reading.deadline, None);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.catalog.path, "data/cards.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_placeholder_keys_are_absent() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "default_key"),
            ("GEMINI_API_KEY", "  "),
            ("HF_TOKEN", "hf_real_token"),
        ]))
        .unwrap();

        assert_eq!(config.providers.openai.api_key, None);
        assert_eq!(config.providers.gemini.api_key, None);
        assert_eq!(
            config.providers.huggingface.api_key,
            Some("hf_real_token".to_string())
        );
    }

    #[test]
    fn test_provider_order_parsing() {
        assert_eq!(
            parse_provider_order("hf, openai, hf").unwrap(),
            vec![LLMProviderType::HuggingFace, LLMProviderType::OpenAI]
        );
        assert!(parse_provider_order("openai,claude").is_err());
        assert!(parse_provider_order("").unwrap().is_empty());
    }

    #[test]
    fn test_reading_tunables() {
        let config = Config::from_lookup(lookup_from(&[
            ("READING_MAX_TRIES", "3"),
            ("READING_BACKOFF_BASE_MS", "250"),
            ("READING_BACKOFF_MULTIPLIER", "2.0"),
            ("READING_MIN_CHARS", "80"),
            ("READING_DEADLINE_SECS", "20"),
            ("READING_DIRECTIVE", "Plain text please."),
        ]))
        .unwrap();

        assert_eq!(config.reading.retry.max_tries, 3);
        assert_eq!(config.reading.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.reading.retry.multiplier, 2.0);
        assert_eq!(config.reading.min_reading_chars, 80);
        assert_eq!(config.reading.deadline, Some(Duration::from_secs(20)));
        assert_eq!(config.reading.boilerplate.directive, "Plain text please.");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup_from(&[("PORT", "not-a-number")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("READING_MAX_TRIES", "many")])).is_err());

        let config = Config::from_lookup(lookup_from(&[("READING_MAX_TRIES", "0")])).unwrap();
        assert!(config.validate().is_err());

        let config =
            Config::from_lookup(lookup_from(&[("READING_BACKOFF_MULTIPLIER", "0.5")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_lookup(lookup_from(&[("READING_MAX_TRIES", "100000")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_lookup(lookup_from(&[(
            "READING_BACKOFF_BASE_MS",
            "18446744073709551615",
        )]))
        .unwrap();
        assert!(config.validate().is_err());
    }
}
