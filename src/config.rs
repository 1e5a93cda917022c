use std::env;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://discord.com/api/v10";
pub const DEFAULT_GLOBAL_LIMIT: u32 = 50;

/// Retry pacing for transient failures (network errors and 5xx).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Transient failures tolerated per call before giving up.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to each backoff.
    pub jitter: Duration,
    /// Ceiling on the cumulative rate-limit wait of one call; `None` waits as
    /// long as the server asks.
    pub max_rate_limit_wait: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
            max_rate_limit_wait: None,
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the `failures`-th transient failure
    /// (1-based): `base * 2^(failures-1)`, capped, plus jitter.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(fastrand::u64(0..=jitter_ms))
        };
        base + jitter
    }
}

/// Runtime configuration for the REST client.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub api_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Requests per second across all routes; `None` disables local pacing
    /// (global 429s are still honoured).
    pub global_limit: Option<u32>,
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot ({}, {})",
        env!("CARGO_PKG_HOMEPAGE"),
        env!("CARGO_PKG_VERSION")
    )
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, String> {
    match env::var(key) {
        Ok(s) if !s.trim().is_empty() => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("Invalid value for {key}: {s:?}")),
        _ => Ok(None),
    }
}

impl Config {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        // Accept tokens pasted with their scheme prefix.
        let token = token.strip_prefix("Bot ").unwrap_or(&token).trim().to_string();
        Self {
            token,
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: default_user_agent(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
            global_limit: Some(DEFAULT_GLOBAL_LIMIT),
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_global_limit(mut self, limit: Option<u32>) -> Self {
        self.global_limit = limit.filter(|l| *l > 0);
        self
    }

    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - DISCORD_TOKEN [required]
    /// - DISCORD_API_URL (default: https://discord.com/api/v10)
    /// - DISCORD_HTTP_TIMEOUT_SECS (default: 30)
    /// - DISCORD_USER_AGENT (default: DiscordBot (<homepage>, <version>))
    /// - DISCORD_MAX_ATTEMPTS (default: 5)
    /// - DISCORD_BACKOFF_BASE_MS / DISCORD_BACKOFF_MAX_MS / DISCORD_BACKOFF_JITTER_MS
    /// - DISCORD_MAX_RATE_LIMIT_WAIT_SECS (default: unbounded)
    /// - DISCORD_GLOBAL_LIMIT (default: 50, 0 disables)
    pub fn from_env() -> Result<Self, String> {
        let token = env::var("DISCORD_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| "Missing DISCORD_TOKEN".to_string())?;
        let mut cfg = Self::new(token);

        if let Ok(api_url) = env::var("DISCORD_API_URL") {
            cfg.api_url = api_url;
        }
        url::Url::parse(&cfg.api_url)
            .map_err(|e| format!("Invalid DISCORD_API_URL {:?}: {}", cfg.api_url, e))?;
        cfg.api_url = cfg.api_url.trim_end_matches('/').to_string();

        if let Some(t) = env_parse::<u64>("DISCORD_HTTP_TIMEOUT_SECS")? {
            cfg.timeout_secs = t;
        }
        if let Ok(ua) = env::var("DISCORD_USER_AGENT") {
            cfg.user_agent = ua;
        }
        if let Some(n) = env_parse::<u32>("DISCORD_MAX_ATTEMPTS")? {
            cfg.retry.max_attempts = n.max(1);
        }
        if let Some(ms) = env_parse::<u64>("DISCORD_BACKOFF_BASE_MS")? {
            cfg.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("DISCORD_BACKOFF_MAX_MS")? {
            cfg.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("DISCORD_BACKOFF_JITTER_MS")? {
            cfg.retry.jitter = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("DISCORD_MAX_RATE_LIMIT_WAIT_SECS")? {
            cfg.retry.max_rate_limit_wait = Some(Duration::from_secs(secs));
        }
        if let Some(limit) = env_parse::<u32>("DISCORD_GLOBAL_LIMIT")? {
            cfg = cfg.with_global_limit(Some(limit));
        }
        Ok(cfg)
    }
}
