use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{DispatchError, Result};

/// Comprehensive dispatch engine configuration
///
/// The main configuration structure covering every tunable of the dispatch
/// core, from network binding to matcher radii and acceptance windows.
///
/// # Configuration Sections
///
/// - [`general`]: binding address and system-wide limits
/// - [`presence`]: location-freshness policy for lawyer eligibility
/// - [`matcher`]: search radii, expansion policy, and candidate limits
/// - [`dispatch`]: acceptance window and retry bounds
/// - [`metrics`]: sliding-window sizes for response-time statistics
/// - [`database`]: optional SQLite persistence
///
/// # Examples
///
/// ```
/// use juricall_dispatch_engine::config::DispatchConfig;
///
/// let mut config = DispatchConfig::default();
/// config.dispatch.max_attempts = 3;
/// config.matcher.initial_radius_km = 5.0;
/// config.validate().expect("configuration should be valid");
/// ```
///
/// [`general`]: GeneralConfig
/// [`presence`]: PresenceConfig
/// [`matcher`]: MatcherConfig
/// [`dispatch`]: DispatchPolicyConfig
/// [`metrics`]: MetricsConfig
/// [`database`]: DatabaseConfig
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DispatchConfig {
    /// General system settings
    pub general: GeneralConfig,

    /// Lawyer presence and staleness settings
    pub presence: PresenceConfig,

    /// Geospatial matcher settings
    pub matcher: MatcherConfig,

    /// Dispatch state machine policy
    pub dispatch: DispatchPolicyConfig,

    /// Metrics aggregation settings
    pub metrics: MetricsConfig,

    /// Optional persistent storage
    pub database: DatabaseConfig,
}

/// General dispatch system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Address the REST API binds to.
    pub bind_addr: SocketAddr,

    /// Maximum number of non-terminal calls the engine will hold at once.
    ///
    /// Intake rejects new calls beyond this limit so a flood of requests
    /// cannot exhaust the dispatcher.
    pub max_active_calls: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().expect("valid default addr"),
            max_active_calls: 1000,
        }
    }
}

/// Presence freshness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// How long after the last location ping a lawyer remains eligible.
    ///
    /// Staleness is evaluated lazily at match time, not by a background
    /// sweep, so there is no race between an eligibility check and a ping.
    pub staleness_threshold: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::from_secs(45),
        }
    }
}

/// Geospatial matcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Search radius for the first matching pass, in kilometers.
    pub initial_radius_km: f64,

    /// Hard ceiling on the search radius. Expansion never exceeds this.
    pub max_radius_km: f64,

    /// Maximum number of radius doublings before the matcher reports
    /// no candidates. Bounds the search on sparse maps.
    pub max_expansions: u32,

    /// Maximum number of ranked candidates returned per query.
    pub candidate_limit: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            initial_radius_km: 2.0,
            max_radius_km: 50.0,
            max_expansions: 5,
            candidate_limit: 10,
        }
    }
}

/// Dispatch state machine policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchPolicyConfig {
    /// How long an offered lawyer has to confirm before the offer times
    /// out and the call re-dispatches.
    pub acceptance_window: Duration,

    /// Maximum dispatch attempts per call before it is escalated to
    /// operators instead of retried.
    pub max_attempts: u32,
}

impl Default for DispatchPolicyConfig {
    fn default() -> Self {
        Self {
            acceptance_window: Duration::from_secs(20),
            max_attempts: 5,
        }
    }
}

/// Metrics aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Sliding window over which average response and wait times are
    /// computed.
    pub response_window: Duration,

    /// Response-time samples retained per lawyer for the matcher's
    /// historical-median tie-break.
    pub history_per_lawyer: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            response_window: Duration::from_secs(3600),
            history_per_lawyer: 50,
        }
    }
}

/// Database configuration for persistent storage
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// SQLite database path. `None` runs the engine fully in memory.
    pub path: Option<String>,
}

impl DispatchConfig {
    /// Validate the configuration, rejecting values the engine cannot
    /// operate with.
    pub fn validate(&self) -> Result<()> {
        if self.general.max_active_calls == 0 {
            return Err(DispatchError::configuration(
                "general.max_active_calls must be greater than zero",
            ));
        }
        if self.presence.staleness_threshold.is_zero() {
            return Err(DispatchError::configuration(
                "presence.staleness_threshold must be greater than zero",
            ));
        }
        if self.matcher.initial_radius_km <= 0.0 {
            return Err(DispatchError::configuration(
                "matcher.initial_radius_km must be positive",
            ));
        }
        if self.matcher.max_radius_km < self.matcher.initial_radius_km {
            return Err(DispatchError::configuration(
                "matcher.max_radius_km must be at least initial_radius_km",
            ));
        }
        if self.matcher.candidate_limit == 0 {
            return Err(DispatchError::configuration(
                "matcher.candidate_limit must be greater than zero",
            ));
        }
        if self.dispatch.acceptance_window.is_zero() {
            return Err(DispatchError::configuration(
                "dispatch.acceptance_window must be greater than zero",
            ));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(DispatchError::configuration(
                "dispatch.max_attempts must be greater than zero",
            ));
        }
        if self.metrics.response_window.is_zero() {
            return Err(DispatchError::configuration(
                "metrics.response_window must be greater than zero",
            ));
        }
        if self.metrics.history_per_lawyer == 0 {
            return Err(DispatchError::configuration(
                "metrics.history_per_lawyer must be greater than zero",
            ));
        }
        Ok(())
    }
}
