// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::retry::RetryPolicy;
use crate::domain::error::AppError;
use crate::infrastructure::data::abi;
use alloy::primitives::{Address, B256};
use alloy::sol_types::SolEvent;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct GlobalSettings {
    // General
    #[serde(default = "default_debug")]
    pub debug: bool,
    /// HTTP RPC endpoints; accepts a list or a comma-separated string.
    #[serde(default, deserialize_with = "deserialize_endpoint_list")]
    pub rpc_endpoints: Vec<String>,
    /// Shares contract emitting the Trade event.
    #[serde(default)]
    pub contract_address: Address,
    /// topic0 of the Trade event; defaults to the generated signature hash.
    pub event_signature: Option<B256>,
    pub database_url: Option<String>,

    // Scanning
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Enrichment
    pub profile_api_url: Option<String>,
    pub profile_api_token: Option<String>,
    #[serde(default = "default_score_api_url")]
    pub score_api_url: String,
    pub score_api_key: Option<String>,
    #[serde(default = "default_enrich_interval_secs")]
    pub enrich_interval_secs: u64,
    #[serde(default = "default_enrichment_batch")]
    pub enrichment_batch: u32,
    #[serde(default = "default_enrichment_attempts")]
    pub enrichment_attempts: u32,

    // Observability
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_debug() -> bool {
    false
}
fn default_batch_size() -> u64 {
    50
}
fn default_scan_interval_secs() -> u64 {
    5
}
fn default_enrich_interval_secs() -> u64 {
    5
}
fn default_retry_interval_ms() -> u64 {
    1_000
}
fn default_request_timeout_secs() -> u64 {
    12
}
fn default_score_api_url() -> String {
    "https://twitterscore.io/api/v1".to_string()
}
fn default_enrichment_batch() -> u32 {
    30
}
fn default_enrichment_attempts() -> u32 {
    10
}
fn default_metrics_port() -> u16 {
    9000
}

pub fn parse_endpoint_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn deserialize_endpoint_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{SeqAccess, Visitor};
    use std::fmt;

    struct EndpointVisitor;

    impl<'de> Visitor<'de> for EndpointVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a sequence of RPC URLs or a comma-separated string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(parse_endpoint_list(v))
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = Vec::new();
            while let Some(elem) = seq.next_element::<String>()? {
                out.push(elem);
            }
            Ok(out)
        }
    }

    deserializer.deserialize_any(EndpointVisitor)
}

impl GlobalSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let selected_config = resolve_config_path(path);
        let mut builder = Config::builder();

        if let Some(ref selected_path) = selected_config {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default());

        let mut settings: GlobalSettings = builder.build()?.try_deserialize()?;

        // Allow RPC_ENDPOINTS env to be a comma/space separated string
        if let Ok(endpoints_str) = std::env::var("RPC_ENDPOINTS") {
            settings.rpc_endpoints = parse_endpoint_list(&endpoints_str);
        }

        settings.ensure_valid()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    pub(crate) fn ensure_valid(&self) -> Result<(), AppError> {
        if self.rpc_endpoints.is_empty() {
            return Err(AppError::Config("RPC_ENDPOINTS is missing".to_string()));
        }
        if self.contract_address == Address::ZERO {
            return Err(AppError::Config("CONTRACT_ADDRESS is missing".to_string()));
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database_url.clone())
            .unwrap_or_else(|| "sqlite://shares.db".to_string())
    }

    pub fn event_signature(&self) -> B256 {
        self.event_signature.unwrap_or(abi::Trade::SIGNATURE_HASH)
    }

    /// Unbounded fixed-interval policy; the interval has a 100 ms floor so a
    /// zeroed config cannot busy-loop the retry path.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::forever(Duration::from_millis(self.retry_interval_ms.max(100)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.clamp(1, 60))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }

    pub fn enrich_interval(&self) -> Duration {
        Duration::from_secs(self.enrich_interval_secs.max(1))
    }

    fn env_override(key: &str, configured: Option<&str>) -> Option<String> {
        std::env::var(key)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                configured
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
            })
    }

    pub fn profile_api_url_value(&self) -> Option<String> {
        Self::env_override("PROFILE_API_URL", self.profile_api_url.as_deref())
    }

    pub fn profile_api_token_value(&self) -> Option<String> {
        Self::env_override("PROFILE_API_TOKEN", self.profile_api_token.as_deref())
    }

    pub fn score_api_url_value(&self) -> String {
        Self::env_override("SCORE_API_URL", Some(self.score_api_url.as_str()))
            .unwrap_or_else(default_score_api_url)
    }

    pub fn score_api_key_value(&self) -> Option<String> {
        Self::env_override("SCORE_API_KEY", self.score_api_key.as_deref())
    }

    /// Enrichment runs only when a profile directory is configured.
    pub fn enrichment_enabled(&self) -> bool {
        self.profile_api_url_value().is_some()
    }
}

fn resolve_config_path(path: Option<&str>) -> Option<String> {
    if let Some(path) = path {
        return Some(path.to_string());
    }
    for candidate in ["config.toml", "config/default.toml"] {
        if Path::new(candidate).is_file() {
            return Some(candidate.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn base_settings() -> GlobalSettings {
        GlobalSettings {
            debug: default_debug(),
            rpc_endpoints: vec!["http://localhost:8545".to_string()],
            contract_address: Address::repeat_byte(0x11),
            event_signature: None,
            database_url: None,
            batch_size: default_batch_size(),
            scan_interval_secs: default_scan_interval_secs(),
            retry_interval_ms: default_retry_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            profile_api_url: None,
            profile_api_token: None,
            score_api_url: default_score_api_url(),
            score_api_key: None,
            enrich_interval_secs: default_enrich_interval_secs(),
            enrichment_batch: default_enrichment_batch(),
            enrichment_attempts: default_enrichment_attempts(),
            metrics_port: default_metrics_port(),
        }
    }

    #[test]
    fn endpoint_list_parses_comma_separated_string() {
        let parsed = parse_endpoint_list("http://a ,http://b,, http://c\nhttp://d");
        assert_eq!(parsed, vec!["http://a", "http://b", "http://c", "http://d"]);
    }

    #[test]
    fn endpoint_list_deserializes_from_string_or_sequence() {
        let from_string: GlobalSettings = serde_json::from_value(serde_json::json!({
            "rpc_endpoints": "http://a, http://b",
            "contract_address": "0x1111111111111111111111111111111111111111",
        }))
        .expect("string form");
        assert_eq!(from_string.rpc_endpoints.len(), 2);

        let from_seq: GlobalSettings = serde_json::from_value(serde_json::json!({
            "rpc_endpoints": ["http://a", "http://b", "http://c"],
            "contract_address": "0x1111111111111111111111111111111111111111",
        }))
        .expect("sequence form");
        assert_eq!(from_seq.rpc_endpoints.len(), 3);
    }

    #[test]
    fn validation_requires_endpoints_and_contract() {
        let mut settings = base_settings();
        settings.rpc_endpoints.clear();
        assert!(matches!(settings.ensure_valid(), Err(AppError::Config(_))));

        let mut settings = base_settings();
        settings.contract_address = Address::ZERO;
        assert!(matches!(settings.ensure_valid(), Err(AppError::Config(_))));

        assert!(base_settings().ensure_valid().is_ok());
    }

    #[test]
    fn database_url_prefers_env_then_config_then_default() {
        let _env_lock = env_lock_guard();
        let old = std::env::var("DATABASE_URL").ok();

        unsafe { std::env::remove_var("DATABASE_URL") };
        let mut settings = base_settings();
        assert_eq!(settings.database_url(), "sqlite://shares.db");

        settings.database_url = Some("sqlite://configured.db".to_string());
        assert_eq!(settings.database_url(), "sqlite://configured.db");

        unsafe { std::env::set_var("DATABASE_URL", "sqlite::memory:") };
        assert_eq!(settings.database_url(), "sqlite::memory:");

        match old {
            Some(v) => unsafe { std::env::set_var("DATABASE_URL", v) },
            None => unsafe { std::env::remove_var("DATABASE_URL") },
        }
    }

    #[test]
    fn event_signature_defaults_to_generated_hash() {
        let settings = base_settings();
        assert_eq!(settings.event_signature(), abi::Trade::SIGNATURE_HASH);

        let mut settings = base_settings();
        settings.event_signature = Some(B256::repeat_byte(0x22));
        assert_eq!(settings.event_signature(), B256::repeat_byte(0x22));
    }

    #[test]
    fn retry_and_timeout_values_have_safe_floors() {
        let mut settings = base_settings();
        settings.retry_interval_ms = 0;
        settings.request_timeout_secs = 0;
        settings.scan_interval_secs = 0;
        assert_eq!(
            settings.retry_policy(),
            RetryPolicy::forever(Duration::from_millis(100))
        );
        assert_eq!(settings.request_timeout(), Duration::from_secs(1));
        assert_eq!(settings.scan_interval(), Duration::from_secs(1));
    }

    #[test]
    fn enrichment_disabled_without_profile_api() {
        let _env_lock = env_lock_guard();
        let old = std::env::var("PROFILE_API_URL").ok();
        unsafe { std::env::remove_var("PROFILE_API_URL") };

        let mut settings = base_settings();
        assert!(!settings.enrichment_enabled());

        settings.profile_api_url = Some("https://prod-api.example".to_string());
        assert!(settings.enrichment_enabled());

        unsafe { std::env::set_var("PROFILE_API_URL", "https://env-api.example") };
        assert_eq!(
            settings.profile_api_url_value().as_deref(),
            Some("https://env-api.example")
        );

        match old {
            Some(v) => unsafe { std::env::set_var("PROFILE_API_URL", v) },
            None => unsafe { std::env::remove_var("PROFILE_API_URL") },
        }
    }

    #[test]
    fn explicit_config_path_wins() {
        let resolved = resolve_config_path(Some("custom-config.toml"));
        assert_eq!(resolved.as_deref(), Some("custom-config.toml"));
    }
}
