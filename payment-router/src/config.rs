use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Primary and secondary processors must use different URLs")]
    DuplicateUpstream,

    #[error("Router needs at least one worker")]
    NoWorkers,

    #[error("Router queue size cannot be 0")]
    EmptyQueue,

    #[error("max_attempts cannot be 0")]
    ZeroMaxAttempts,

    #[error("{0} cannot be 0")]
    ZeroDuration(&'static str),
}

/// Payment gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the public payment endpoints
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    /// Name of this instance, used in logs only
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// The two upstream payment processors
    pub processors: ProcessorsConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub router: RouterConfig,
    /// The other gateway instance whose local summary is merged into ours.
    /// Without it the gateway runs standalone.
    pub peer: Option<PeerConfig>,
}

fn default_instance_name() -> String {
    "app1".to_string()
}

impl Config {
    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.processors.validate()?;
        self.health.validate()?;
        self.router.validate()?;

        if let Some(peer) = &self.peer {
            peer.validate()?;
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Base URL of the processor; request paths are appended to it
    pub url: Url,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProcessorsConfig {
    pub primary: UpstreamConfig,
    pub secondary: UpstreamConfig,
    #[serde(default)]
    pub timeouts: ProcessorTimeouts,
}

impl ProcessorsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.primary.url == self.secondary.url {
            return Err(ValidationError::DuplicateUpstream);
        }
        self.timeouts.validate()
    }
}

/// Timeouts applied to every call made to a processor
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessorTimeouts {
    /// Total budget for one payment submission, connection included
    pub submit_timeout_ms: u64,
    /// Total budget for one health probe
    pub health_timeout_ms: u64,
}

impl Default for ProcessorTimeouts {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 5000,
            health_timeout_ms: 1000,
        }
    }
}

impl ProcessorTimeouts {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.submit_timeout_ms == 0 {
            return Err(ValidationError::ZeroDuration("submit_timeout_ms"));
        }
        if self.health_timeout_ms == 0 {
            return Err(ValidationError::ZeroDuration("health_timeout_ms"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// How long a probe result is reused before the next probe
    pub ttl_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { ttl_ms: 5000 }
    }
}

impl HealthConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.ttl_ms == 0 {
            return Err(ValidationError::ZeroDuration("ttl_ms"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Number of payments processed concurrently
    pub workers: usize,
    /// Accepted payments waiting for a worker
    pub queue_size: usize,
    /// Pause after both processors failed, before the next attempt
    pub backoff_ms: u64,
    /// How long an accept waits for queue space before rejecting
    pub enqueue_timeout_ms: u64,
    /// Attempts per payment before it is abandoned. Unbounded when unset.
    pub max_attempts: Option<u32>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_size: 30_000,
            backoff_ms: 2000,
            enqueue_timeout_ms: 100,
            max_attempts: None,
        }
    }
}

impl RouterConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::NoWorkers);
        }
        if self.queue_size == 0 {
            return Err(ValidationError::EmptyQueue);
        }
        if self.max_attempts == Some(0) {
            return Err(ValidationError::ZeroMaxAttempts);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PeerConfig {
    /// Base URL of the other gateway instance
    pub url: Url,
    /// Budget for fetching the peer's local summary
    #[serde(default = "default_peer_timeout_ms")]
    pub timeout_ms: u64,
    /// Delay between reachability checks at startup
    #[serde(default = "default_startup_check_interval_ms")]
    pub startup_check_interval_ms: u64,
}

fn default_peer_timeout_ms() -> u64 {
    3000
}

fn default_startup_check_interval_ms() -> u64 {
    1000
}

impl PeerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn startup_check_interval(&self) -> Duration {
        Duration::from_millis(self.startup_check_interval_ms)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 {
            return Err(ValidationError::ZeroDuration("peer timeout_ms"));
        }
        if self.startup_check_interval_ms == 0 {
            return Err(ValidationError::ZeroDuration("startup_check_interval_ms"));
        }
        Ok(())
    }
}
