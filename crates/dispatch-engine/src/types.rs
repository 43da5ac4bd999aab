//! Core identifier and geographic types shared across the dispatch engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{DispatchError, Result};

/// Unique emergency call identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    /// Generate a fresh call id.
    pub fn new() -> Self {
        CallId(Uuid::new_v4().to_string())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        CallId(s)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        CallId(s.to_string())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CallId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strongly-typed lawyer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LawyerId(pub String);

impl From<String> for LawyerId {
    fn from(s: String) -> Self {
        LawyerId(s)
    }
}

impl From<&str> for LawyerId {
    fn from(s: &str) -> Self {
        LawyerId(s.to_string())
    }
}

impl fmt::Display for LawyerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for LawyerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strongly-typed client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub String);

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        ClientId(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        ClientId(s.to_string())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A WGS84 coordinate pair.
///
/// Construction goes through [`GeoPoint::new`], which enforces the valid
/// latitude/longitude ranges so the rest of the engine never sees a
/// malformed coordinate.
///
/// # Examples
///
/// ```
/// use juricall_dispatch_engine::types::GeoPoint;
///
/// let moscow = GeoPoint::new(55.751, 37.618).unwrap();
/// assert!(GeoPoint::new(91.0, 0.0).is_err());
/// assert!(GeoPoint::new(0.0, -181.0).is_err());
/// # let _ = moscow;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, [-90, 90].
    pub latitude: f64,
    /// Longitude in degrees, [-180, 180].
    pub longitude: f64,
}

impl GeoPoint {
    /// Validate and construct a coordinate pair.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(DispatchError::validation(format!(
                "latitude {} out of range [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(DispatchError::validation(format!(
                "longitude {} out of range [-180, 180]",
                longitude
            )));
        }
        Ok(GeoPoint { latitude, longitude })
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// The principal behind a mutating operation.
///
/// Every state-changing call takes an explicit actor instead of relying on
/// ambient "current user" context, so authorization checks happen at the
/// same point as the transition they guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// The client who opened the call.
    Client(ClientId),
    /// A lawyer responding to an offer.
    Lawyer(LawyerId),
    /// An operator acting through the admin console.
    Admin(String),
    /// The engine itself (timers, recovery, collaborator callbacks).
    System,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin(_))
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Client(id) => write!(f, "client:{}", id),
            Actor::Lawyer(id) => write!(f, "lawyer:{}", id),
            Actor::Admin(id) => write!(f, "admin:{}", id),
            Actor::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "system" {
            return Ok(Actor::System);
        }
        match s.split_once(':') {
            Some(("client", id)) => Ok(Actor::Client(ClientId::from(id))),
            Some(("lawyer", id)) => Ok(Actor::Lawyer(LawyerId::from(id))),
            Some(("admin", id)) => Ok(Actor::Admin(id.to_string())),
            _ => Err(format!("unknown actor: {}", s)),
        }
    }
}
