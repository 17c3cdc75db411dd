use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::prompt::ResponseFormat;

const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub response_format: ResponseFormat,
    pub timeout: Option<Duration>,
    pub uploads_dir: PathBuf,
    pub bind_addr: String,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("GROQ_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::Missing("GROQ_API_KEY"))?;

        let temperature = match lookup("LLM_TEMPERATURE") {
            Some(raw) => raw
                .trim()
                .parse::<f32>()
                .ok()
                .filter(|t| (0.0..=2.0).contains(t))
                .ok_or(ConfigError::Invalid {
                    name: "LLM_TEMPERATURE",
                    value: raw,
                })?,
            None => DEFAULT_TEMPERATURE,
        };

        let response_format = match lookup("RESPONSE_FORMAT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "RESPONSE_FORMAT",
                value: raw,
            })?,
            None => ResponseFormat::Tagged,
        };

        let timeout = match lookup("LLM_TIMEOUT_SECS") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::Invalid {
                        name: "LLM_TIMEOUT_SECS",
                        value: raw,
                    })?,
            ),
            None => None,
        };

        Ok(Self {
            api_key,
            api_url: lookup("GROQ_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: lookup("GROQ_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            response_format,
            timeout,
            uploads_dir: lookup("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOADS_DIR)),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
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
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("GROQ_API_KEY", "test-key")])).unwrap();
        assert_eq!(config.model, "llama-3.3-70b-versatile");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.response_format, ResponseFormat::Tagged);
        assert_eq!(config.uploads_dir, PathBuf::from("uploads"));
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("GROQ_API_KEY")));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("GROQ_API_KEY", "k"),
            ("LLM_TEMPERATURE", "0.3"),
            ("RESPONSE_FORMAT", "bare"),
            ("LLM_TIMEOUT_SECS", "45"),
        ]))
        .unwrap();
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.response_format, ResponseFormat::Bare);
        assert_eq!(config.timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_invalid_temperature() {
        let err = Config::from_lookup(lookup_from(&[
            ("GROQ_API_KEY", "k"),
            ("LLM_TEMPERATURE", "hot"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "LLM_TEMPERATURE", .. }));
    }
}
