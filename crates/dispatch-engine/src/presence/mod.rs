//! # Lawyer Presence Registry
//!
//! Tracks each lawyer's last reported location, explicit availability
//! toggle, and ping freshness — the ground truth the geospatial matcher
//! queries. Presence is upserted on every location ping; staleness is
//! evaluated lazily at match time rather than by a background sweep, so an
//! eligibility check can never race a concurrent ping.

mod registry;

pub use registry::{EligibleLawyer, PresenceRegistry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GeoPoint, LawyerId};

/// A lawyer's current presence record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LawyerPresence {
    pub lawyer_id: LawyerId,

    /// Last reported location.
    pub location: GeoPoint,

    /// Explicit opt-in toggled by the lawyer, independent of both
    /// location freshness and assignment state.
    pub is_available: bool,

    /// Bumped on every location ping.
    pub last_seen_at: DateTime<Utc>,

    /// Marketplace review score, used only as a ranking tie-break.
    pub rating: f32,
}

impl LawyerPresence {
    /// Whether the last ping is within the staleness threshold.
    pub fn is_fresh(&self, now: DateTime<Utc>, staleness: chrono::Duration) -> bool {
        now - self.last_seen_at <= staleness
    }
}

/// Seam between presence and the dispatch state machine: eligibility
/// requires that the lawyer holds no non-terminal emergency assignment,
/// which only the claim ledger knows.
pub trait AssignmentProbe: Send + Sync {
    fn is_claimed(&self, lawyer_id: &LawyerId) -> bool;
}
