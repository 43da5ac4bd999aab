//! Registry implementation over a concurrent map.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::error::Result;
use crate::types::{GeoPoint, LawyerId};

use super::{AssignmentProbe, LawyerPresence};

/// Snapshot entry handed to the matcher.
#[derive(Debug, Clone)]
pub struct EligibleLawyer {
    pub lawyer_id: LawyerId,
    pub location: GeoPoint,
    pub rating: f32,
}

/// Shared registry of lawyer presence.
///
/// All operations are keyed by lawyer id on a concurrent map; the registry
/// exclusively owns `LawyerPresence` and is read (never mutated) by the
/// matcher.
pub struct PresenceRegistry {
    lawyers: DashMap<LawyerId, LawyerPresence>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            lawyers: DashMap::new(),
        }
    }

    /// Upsert location and bump `last_seen_at`. Does not change the
    /// availability toggle; a ping from an opted-out lawyer keeps them
    /// opted out.
    pub fn update_location(&self, lawyer_id: &LawyerId, lat: f64, lon: f64) -> Result<()> {
        let location = GeoPoint::new(lat, lon)?;
        let now = Utc::now();
        self.lawyers
            .entry(lawyer_id.clone())
            .and_modify(|p| {
                p.location = location;
                p.last_seen_at = now;
            })
            .or_insert_with(|| LawyerPresence {
                lawyer_id: lawyer_id.clone(),
                location,
                is_available: false,
                last_seen_at: now,
                rating: 0.0,
            });
        Ok(())
    }

    /// Explicit opt-in/out, independent of location freshness.
    pub fn set_availability(&self, lawyer_id: &LawyerId, available: bool) {
        let now = Utc::now();
        self.lawyers
            .entry(lawyer_id.clone())
            .and_modify(|p| p.is_available = available)
            .or_insert_with(|| LawyerPresence {
                lawyer_id: lawyer_id.clone(),
                location: GeoPoint {
                    latitude: 0.0,
                    longitude: 0.0,
                },
                is_available: available,
                last_seen_at: now,
                rating: 0.0,
            });
        debug!("lawyer {} availability set to {}", lawyer_id, available);
    }

    /// Combined upsert backing the presence endpoint: location ping plus
    /// availability toggle, with an optional rating refresh.
    pub fn update_presence(
        &self,
        lawyer_id: &LawyerId,
        lat: f64,
        lon: f64,
        is_available: bool,
        rating: Option<f32>,
    ) -> Result<LawyerPresence> {
        let location = GeoPoint::new(lat, lon)?;
        let now = Utc::now();
        let entry = self
            .lawyers
            .entry(lawyer_id.clone())
            .and_modify(|p| {
                p.location = location;
                p.is_available = is_available;
                p.last_seen_at = now;
                if let Some(r) = rating {
                    p.rating = r;
                }
            })
            .or_insert_with(|| LawyerPresence {
                lawyer_id: lawyer_id.clone(),
                location,
                is_available,
                last_seen_at: now,
                rating: rating.unwrap_or(0.0),
            });
        Ok(entry.value().clone())
    }

    pub fn get(&self, lawyer_id: &LawyerId) -> Option<LawyerPresence> {
        self.lawyers.get(lawyer_id).map(|p| p.clone())
    }

    /// Drop a lawyer from the registry entirely.
    pub fn remove(&self, lawyer_id: &LawyerId) -> Option<LawyerPresence> {
        self.lawyers.remove(lawyer_id).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.lawyers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lawyers.is_empty()
    }

    /// Pure eligibility check: available AND fresh AND claim-free.
    pub fn is_eligible(
        &self,
        lawyer_id: &LawyerId,
        now: DateTime<Utc>,
        staleness: chrono::Duration,
        probe: &dyn AssignmentProbe,
    ) -> bool {
        self.lawyers
            .get(lawyer_id)
            .map(|p| p.is_available && p.is_fresh(now, staleness) && !probe.is_claimed(lawyer_id))
            .unwrap_or(false)
    }

    /// Snapshot of currently eligible lawyers for the matcher.
    ///
    /// The snapshot can go stale the instant it is taken — there is no
    /// lock across match + offer. The claim CAS in the state machine is
    /// what actually decides.
    pub fn list_eligible(
        &self,
        now: DateTime<Utc>,
        staleness: chrono::Duration,
        probe: &dyn AssignmentProbe,
    ) -> Vec<EligibleLawyer> {
        self.lawyers
            .iter()
            .filter(|p| {
                p.is_available && p.is_fresh(now, staleness) && !probe.is_claimed(&p.lawyer_id)
            })
            .map(|p| EligibleLawyer {
                lawyer_id: p.lawyer_id.clone(),
                location: p.location,
                rating: p.rating,
            })
            .collect()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
