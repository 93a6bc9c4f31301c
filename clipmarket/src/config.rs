//! Runtime configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration for the three runtime services.

use std::time::Duration;

/// Markers that identify an unfilled provider setting copied from a template.
const PLACEHOLDER_MARKERS: [&str; 4] = ["your-project", "your_", "placeholder", "example"];

/// Sentinel value that explicitly requests demo mode.
pub const DEMO_SENTINEL: &str = "demo";

/// Operating mode of the authentication layer, decided once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Offline mode backed by a fixed directory of mock accounts
    Demo,
    /// Mode backed by a reachable identity provider
    Live,
}

/// Complete runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Identity provider settings
    pub provider: ProviderConfig,
    /// Authentication timing
    pub auth: AuthTimingConfig,
    /// Realtime channel settings
    pub realtime: RealtimeConfig,
    /// HTTP backend settings
    pub api: ApiConfig,
}

/// Identity provider endpoint and public key
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Provider base URL
    pub url: Option<String>,
    /// Public (anonymous) API key
    pub api_key: Option<String>,
}

/// Authentication timing configuration
#[derive(Debug, Clone)]
pub struct AuthTimingConfig {
    /// Safety timer for the initial session fetch
    pub init_timeout: Duration,
    /// Simulated latency of demo operations
    pub demo_latency: Duration,
}

/// Realtime channel configuration
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Base URL of the persistent connection endpoint (ws:// or wss://)
    pub url: String,
    /// Backoff base; attempt `n` waits `reconnect_interval * 2^n`
    pub reconnect_interval: Duration,
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// Keep-alive period while connected
    pub heartbeat_interval: Duration,
}

/// HTTP backend configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL every request path is appended to
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for AuthTimingConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(8),
            demo_latency: Duration::from_millis(800),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3001/ws".to_string(),
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ProviderConfig {
    /// Decide the operating mode from the configured endpoint and key.
    ///
    /// Absent, blank, placeholder or sentinel values select demo mode.
    pub fn detect_mode(&self) -> AuthMode {
        if is_usable(self.url.as_deref()) && is_usable(self.api_key.as_deref()) {
            AuthMode::Live
        } else {
            AuthMode::Demo
        }
    }
}

fn is_usable(value: Option<&str>) -> bool {
    let Some(value) = value.map(str::trim) else {
        return false;
    };
    if value.is_empty() || value.eq_ignore_ascii_case(DEMO_SENTINEL) {
        return false;
    }
    let lowered = value.to_ascii_lowercase();
    !PLACEHOLDER_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// Missing provider variables are not an error: they select demo mode.
    ///
    /// # Errors
    ///
    /// Returns error if a loaded value fails validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = ProviderConfig {
            url: std::env::var("IDENTITY_PROVIDER_URL").ok(),
            api_key: std::env::var("IDENTITY_PROVIDER_KEY").ok(),
        };

        let auth = AuthTimingConfig {
            init_timeout: millis_env_or("AUTH_INIT_TIMEOUT_MS", 8_000),
            demo_latency: millis_env_or("DEMO_LATENCY_MS", 800),
        };

        let realtime = RealtimeConfig {
            url: std::env::var("REALTIME_URL")
                .unwrap_or_else(|_| RealtimeConfig::default().url),
            reconnect_interval: millis_env_or("REALTIME_RECONNECT_INTERVAL_MS", 1_000),
            max_reconnect_attempts: parse_env_or("REALTIME_MAX_RECONNECT_ATTEMPTS", 5),
            heartbeat_interval: millis_env_or("REALTIME_HEARTBEAT_INTERVAL_MS", 30_000),
        };

        let api = ApiConfig {
            base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| ApiConfig::default().base_url),
            request_timeout: millis_env_or("API_TIMEOUT_MS", 30_000),
        };

        let config = RuntimeConfig {
            provider,
            auth,
            realtime,
            api,
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration that always runs in demo mode with default timings
    pub fn demo() -> Self {
        Self {
            provider: ProviderConfig::default(),
            auth: AuthTimingConfig::default(),
            realtime: RealtimeConfig::default(),
            api: ApiConfig::default(),
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.init_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "AUTH_INIT_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if !(self.realtime.url.starts_with("ws://") || self.realtime.url.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                var: "REALTIME_URL".to_string(),
                reason: format!("Must use ws:// or wss:// (got {})", self.realtime.url),
            });
        }

        if self.realtime.reconnect_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "REALTIME_RECONNECT_INTERVAL_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.realtime.heartbeat_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "REALTIME_HEARTBEAT_INTERVAL_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                var: "API_BASE_URL".to_string(),
                reason: format!("Must use http:// or https:// (got {})", self.api.base_url),
            });
        }

        if self.api.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "API_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn millis_env_or(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(parse_env_or(key, default_ms))
}
