use serde::Deserialize;
use std::env;

use crate::constants::{
    DEFAULT_CLASSIFIER_TEMPERATURE, DEFAULT_CLIENT_RATE_LIMIT_PER_WINDOW, DEFAULT_COMPLETION_TIMEOUT_MS, DEFAULT_GENERATOR_TEMPERATURE,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL, DEFAULT_PENDING_TRANSFER_TTL_SECS,
    DEFAULT_MAX_SESSIONS, DEFAULT_PORT, DEFAULT_RATE_LIMIT_PER_WINDOW, DEFAULT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_SESSION_IDLE_TTL_SECS, DEFAULT_TOKEN_SYMBOL, DEFAULT_TRANSFER_TIMEOUT_MS,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Completion service
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub classifier_temperature: f32,
    pub generator_temperature: f32,
    pub completion_timeout_ms: u64,

    // Ledger
    pub ledger_rpc_url: Option<String>,
    pub ledger_sender_address: Option<String>,
    pub ledger_token_symbol: String,
    pub transfer_timeout_ms: u64,

    // Sessions
    pub pending_transfer_ttl_secs: u64,
    pub session_idle_ttl_secs: u64,
    pub max_sessions: usize,

    // Rate Limiting
    pub rate_limit_per_window: u32,
    pub client_rate_limit_per_window: u32,
    pub rate_limit_window_secs: u64,

    // CORS
    pub cors_allowed_origins: String,
}

// Reads an optional variable, treating blank values as unset.
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            openai_api_key: optional_var("OPENAI_API_KEY"),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
            classifier_temperature: env::var("CLASSIFIER_TEMPERATURE")
                .unwrap_or_else(|_| DEFAULT_CLASSIFIER_TEMPERATURE.to_string())
                .parse()?,
            generator_temperature: env::var("GENERATOR_TEMPERATURE")
                .unwrap_or_else(|_| DEFAULT_GENERATOR_TEMPERATURE.to_string())
                .parse()?,
            completion_timeout_ms: env::var("COMPLETION_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_COMPLETION_TIMEOUT_MS.to_string())
                .parse()?,

            ledger_rpc_url: optional_var("LEDGER_RPC_URL"),
            ledger_sender_address: optional_var("LEDGER_SENDER_ADDRESS"),
            ledger_token_symbol: env::var("LEDGER_TOKEN_SYMBOL")
                .unwrap_or_else(|_| DEFAULT_TOKEN_SYMBOL.to_string()),
            transfer_timeout_ms: env::var("TRANSFER_TIMEOUT_MS")
                .unwrap_or_else(|_| DEFAULT_TRANSFER_TIMEOUT_MS.to_string())
                .parse()?,

            pending_transfer_ttl_secs: env::var("PENDING_TRANSFER_TTL_SECS")
                .unwrap_or_else(|_| DEFAULT_PENDING_TRANSFER_TTL_SECS.to_string())
                .parse()?,
            session_idle_ttl_secs: env::var("SESSION_IDLE_TTL_SECS")
                .unwrap_or_else(|_| DEFAULT_SESSION_IDLE_TTL_SECS.to_string())
                .parse()?,
            max_sessions: env::var("MAX_SESSIONS")
                .unwrap_or_else(|_| DEFAULT_MAX_SESSIONS.to_string())
                .parse()?,

            rate_limit_per_window: env::var("RATE_LIMIT_PER_WINDOW")
                .unwrap_or_else(|_| DEFAULT_RATE_LIMIT_PER_WINDOW.to_string())
                .parse()?,
            client_rate_limit_per_window: env::var("CLIENT_RATE_LIMIT_PER_WINDOW")
                .unwrap_or_else(|_| DEFAULT_CLIENT_RATE_LIMIT_PER_WINDOW.to_string())
                .parse()?,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(|_| DEFAULT_RATE_LIMIT_WINDOW_SECS.to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.openai_base_url)
            .map_err(|e| anyhow::anyhow!("OPENAI_BASE_URL is invalid: {}", e))?;
        if let Some(rpc_url) = &self.ledger_rpc_url {
            url::Url::parse(rpc_url)
                .map_err(|e| anyhow::anyhow!("LEDGER_RPC_URL is invalid: {}", e))?;
        }
        if self.openai_model.trim().is_empty() {
            anyhow::bail!("OPENAI_MODEL is empty");
        }
        if !(0.0..=2.0).contains(&self.classifier_temperature)
            || !(0.0..=2.0).contains(&self.generator_temperature)
        {
            anyhow::bail!("Sampling temperatures must be within 0.0..=2.0");
        }
        if self.completion_timeout_ms == 0 || self.transfer_timeout_ms == 0 {
            anyhow::bail!("Timeouts must be > 0");
        }
        if self.max_sessions == 0 {
            anyhow::bail!("MAX_SESSIONS must be > 0");
        }

        if self.openai_api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set; every chat message will fail upstream");
        }
        if self.ledger_rpc_url.is_none() {
            tracing::warn!("LEDGER_RPC_URL is not set; confirmed transfers will be rejected");
        }
        if self.ledger_sender_address.is_none() {
            tracing::warn!("LEDGER_SENDER_ADDRESS is not set; sessions start without an account");
        }
        if self.classifier_temperature > self.generator_temperature {
            tracing::warn!(
                "Classifier temperature {} is above generator temperature {}",
                self.classifier_temperature,
                self.generator_temperature
            );
        }
        if self.pending_transfer_ttl_secs == 0 {
            tracing::warn!("PENDING_TRANSFER_TTL_SECS=0; pending transfers never expire");
        }
        if self.rate_limit_per_window == 0
            || self.client_rate_limit_per_window == 0
            || self.rate_limit_window_secs == 0
        {
            tracing::warn!("Rate limit values should be > 0");
        }
        if self.client_rate_limit_per_window < self.rate_limit_per_window {
            tracing::warn!(
                "CLIENT_RATE_LIMIT_PER_WINDOW {} is below the per-session limit {}",
                self.client_rate_limit_per_window,
                self.rate_limit_per_window
            );
        }
        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn completion_configured(&self) -> bool {
        self.openai_api_key.is_some()
    }

    pub fn ledger_configured(&self) -> bool {
        self.ledger_rpc_url.is_some()
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: DEFAULT_PORT,
        environment: "test".to_string(),
        openai_api_key: None,
        openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        openai_model: DEFAULT_OPENAI_MODEL.to_string(),
        classifier_temperature: DEFAULT_CLASSIFIER_TEMPERATURE,
        generator_temperature: DEFAULT_GENERATOR_TEMPERATURE,
        completion_timeout_ms: 1_000,
        ledger_rpc_url: None,
        ledger_sender_address: Some("5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".to_string()),
        ledger_token_symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
        transfer_timeout_ms: 1_000,
        pending_transfer_ttl_secs: DEFAULT_PENDING_TRANSFER_TTL_SECS,
        session_idle_ttl_secs: DEFAULT_SESSION_IDLE_TTL_SECS,
        max_sessions: 1_000,
        rate_limit_per_window: 100,
        client_rate_limit_per_window: 1_000,
        rate_limit_window_secs: 60,
        cors_allowed_origins: "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_test_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn validate_rejects_broken_ledger_url() {
        let mut config = test_config();
        config.ledger_rpc_url = Some("not a url".to_string());
        let err = config.validate().expect_err("must reject");
        assert!(err.to_string().contains("LEDGER_RPC_URL"));
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let mut config = test_config();
        config.transfer_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_session_cap() {
        let mut config = test_config();
        config.max_sessions = 0;
        let err = config.validate().expect_err("must reject");
        assert!(err.to_string().contains("MAX_SESSIONS"));
    }

    #[test]
    fn configured_flags_follow_optional_values() {
        let mut config = test_config();
        assert!(!config.completion_configured());
        assert!(!config.ledger_configured());
        config.openai_api_key = Some("sk-test".to_string());
        config.ledger_rpc_url = Some("http://127.0.0.1:9944".to_string());
        assert!(config.completion_configured());
        assert!(config.ledger_configured());
    }
}
