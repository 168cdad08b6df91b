use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub server: ServerSettings,
    pub coordinator: CoordinatorSettings,
    pub match_tracking: MatchTrackingSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        println!("Loading configuration for RUN_MODE: {}", &run_mode);

        let s = Config::builder()
            // Load environment-specific file (e.g., development.toml, production.toml)
            .add_source(
                File::with_name(&format!("config/{}", run_mode))
                    .format(FileFormat::Toml)
                    .required(true),
            )
            // Add environment variables (e.g., APP_COORDINATOR__BASE_URL=...)
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    pub metrics_auth_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub directory: String,
    pub filename: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoordinatorSettings {
    pub base_url: String,
    /// Per-attempt reply timeout.
    pub request_timeout_ms: u64,
    /// Retry spacing floor, measured from the start of the failed attempt.
    pub min_retry_delay_ms: u64,
    /// Upper bound for a growing retry floor. Ignored when the multiplier is 1.0.
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
    pub heartbeat_interval_seconds: u64,
}

fn default_retry_multiplier() -> f64 {
    1.0
}

impl CoordinatorSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn min_retry_delay(&self) -> Duration {
        Duration::from_millis(self.min_retry_delay_ms)
    }

    /// 재시도 간격 정책. max_elapsed_time 이 None 이므로 절대 포기하지 않는다.
    pub fn retry_backoff(&self) -> backoff::ExponentialBackoff {
        let floor = self.min_retry_delay();
        backoff::ExponentialBackoff {
            current_interval: floor,
            initial_interval: floor,
            randomization_factor: 0.0,
            multiplier: self.retry_multiplier.max(1.0),
            max_interval: Duration::from_millis(self.max_retry_delay_ms).max(floor),
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:27020".to_string(),
            request_timeout_ms: 30_000,
            min_retry_delay_ms: 1_000,
            max_retry_delay_ms: 1_000,
            retry_multiplier: 1.0,
            heartbeat_interval_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchTrackingSettings {
    /// Accumulated disconnected time after which a player is charged an abandon.
    pub abandon_threshold_seconds: u64,
    /// Delay between a rolling-match request and the local switch to the new match.
    pub new_match_delay_seconds: u64,
    pub think_interval_ms: u64,
    pub stats_resend_interval_seconds: u64,
    /// Game events that force an immediate stats resend.
    #[serde(default)]
    pub stats_resend_events: Vec<String>,
    /// Route vote kicks through the coordinator before any vote starts.
    #[serde(default)]
    pub vote_kick_requires_coordinator: bool,
}

impl MatchTrackingSettings {
    pub fn abandon_threshold(&self) -> Duration {
        Duration::from_secs(self.abandon_threshold_seconds)
    }

    pub fn new_match_delay(&self) -> Duration {
        Duration::from_secs(self.new_match_delay_seconds)
    }

    pub fn think_interval(&self) -> Duration {
        Duration::from_millis(self.think_interval_ms)
    }

    pub fn stats_resend_interval(&self) -> Duration {
        Duration::from_secs(self.stats_resend_interval_seconds)
    }
}

impl Default for MatchTrackingSettings {
    fn default() -> Self {
        Self {
            abandon_threshold_seconds: 180,
            new_match_delay_seconds: 10,
            think_interval_ms: 1_000,
            stats_resend_interval_seconds: 60,
            stats_resend_events: vec!["mvm_wave_complete".to_string()],
            vote_kick_requires_coordinator: true,
        }
    }
}
