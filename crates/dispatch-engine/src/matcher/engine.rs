use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::{MatcherConfig, PresenceConfig};
use crate::error::{DispatchError, Result};
use crate::presence::{AssignmentProbe, PresenceRegistry};
use crate::types::{GeoPoint, LawyerId};

use super::geo::haversine_km;
use super::ResponseHistory;

/// A ranked candidate for an offer.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub lawyer_id: LawyerId,
    pub distance_km: f64,
}

/// The candidate search engine.
///
/// Stateless between queries: each `find_candidates` call pulls a fresh
/// eligibility snapshot from the presence registry and ranks it. Callers
/// must tolerate the snapshot going stale immediately — the claim CAS in
/// the state machine is the final arbiter.
pub struct MatcherEngine {
    registry: Arc<PresenceRegistry>,
    history: Arc<dyn ResponseHistory>,
    config: MatcherConfig,
    staleness: chrono::Duration,
}

struct Scored {
    lawyer_id: LawyerId,
    distance_km: f64,
    median_response: f64,
    rating: f32,
}

impl MatcherEngine {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        history: Arc<dyn ResponseHistory>,
        config: MatcherConfig,
        presence: &PresenceConfig,
    ) -> Self {
        let staleness = chrono::Duration::from_std(presence.staleness_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(45));
        Self {
            registry,
            history,
            config,
            staleness,
        }
    }

    /// Find up to `candidate_limit` lawyers for a call at `origin`,
    /// ordered by (distance asc, median response asc, rating desc,
    /// lawyer id asc), excluding `excluded` lawyers already attempted in
    /// this dispatch cycle.
    ///
    /// The radius starts at `initial_radius_km` and doubles (capped at
    /// `max_radius_km`) until candidates appear or `max_expansions`
    /// doublings are spent, at which point `NoCandidates` is returned.
    pub fn find_candidates(
        &self,
        origin: GeoPoint,
        excluded: &HashSet<LawyerId>,
        probe: &dyn AssignmentProbe,
        now: DateTime<Utc>,
    ) -> Result<Vec<Candidate>> {
        let snapshot = self.registry.list_eligible(now, self.staleness, probe);

        let scored: Vec<Scored> = snapshot
            .into_iter()
            .filter(|e| !excluded.contains(&e.lawyer_id))
            .map(|e| Scored {
                distance_km: haversine_km(origin, e.location),
                median_response: self
                    .history
                    .median_response_seconds(&e.lawyer_id)
                    .unwrap_or(f64::INFINITY),
                rating: e.rating,
                lawyer_id: e.lawyer_id,
            })
            .collect();

        let mut radius = self.config.initial_radius_km;
        let mut expansions = 0u32;
        loop {
            let mut within: Vec<&Scored> =
                scored.iter().filter(|s| s.distance_km <= radius).collect();
            if !within.is_empty() {
                within.sort_by(|a, b| Self::rank(a, b));
                debug!(
                    "matcher: {} candidate(s) within {:.1} km after {} expansion(s)",
                    within.len(),
                    radius,
                    expansions
                );
                let candidates = within
                    .into_iter()
                    .take(self.config.candidate_limit)
                    .map(|s| Candidate {
                        lawyer_id: s.lawyer_id.clone(),
                        distance_km: s.distance_km,
                    })
                    .collect();
                return Ok(candidates);
            }

            if expansions >= self.config.max_expansions || radius >= self.config.max_radius_km {
                debug!(
                    "matcher: no candidates within {:.1} km after {} expansion(s)",
                    radius, expansions
                );
                return Err(DispatchError::NoCandidates {
                    expansions,
                    radius_km: radius,
                });
            }
            radius = (radius * 2.0).min(self.config.max_radius_km);
            expansions += 1;
        }
    }

    fn rank(a: &Scored, b: &Scored) -> Ordering {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.median_response
                    .partial_cmp(&b.median_response)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                b.rating
                    .partial_cmp(&a.rating)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.lawyer_id.cmp(&b.lawyer_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatcherConfig, PresenceConfig};
    use crate::matcher::NoHistory;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct NoClaims;

    impl AssignmentProbe for NoClaims {
        fn is_claimed(&self, _lawyer_id: &LawyerId) -> bool {
            false
        }
    }

    struct FixedHistory(Mutex<HashMap<LawyerId, f64>>);

    impl FixedHistory {
        fn new(entries: &[(&str, f64)]) -> Self {
            Self(Mutex::new(
                entries
                    .iter()
                    .map(|(id, secs)| (LawyerId::from(*id), *secs))
                    .collect(),
            ))
        }
    }

    impl ResponseHistory for FixedHistory {
        fn median_response_seconds(&self, lawyer_id: &LawyerId) -> Option<f64> {
            self.0.lock().unwrap().get(lawyer_id).copied()
        }
    }

    fn origin() -> GeoPoint {
        GeoPoint::new(55.751, 37.618).unwrap()
    }

    /// Place a lawyer roughly `km` kilometers north of the origin.
    fn north_of(registry: &PresenceRegistry, id: &str, km: f64) {
        let lat = 55.751 + km / 111.19;
        registry
            .update_presence(&LawyerId::from(id), lat, 37.618, true, None)
            .unwrap();
    }

    fn matcher_with(
        registry: Arc<PresenceRegistry>,
        history: Arc<dyn ResponseHistory>,
        config: MatcherConfig,
    ) -> MatcherEngine {
        MatcherEngine::new(registry, history, config, &PresenceConfig::default())
    }

    fn default_matcher(registry: Arc<PresenceRegistry>) -> MatcherEngine {
        matcher_with(registry, Arc::new(NoHistory), MatcherConfig::default())
    }

    #[test]
    fn candidates_come_back_in_distance_order() {
        let registry = Arc::new(PresenceRegistry::new());
        north_of(&registry, "far", 3.4);
        north_of(&registry, "near", 1.2);
        north_of(&registry, "mid", 2.0);

        let matcher = default_matcher(Arc::clone(&registry));
        let candidates = matcher
            .find_candidates(origin(), &HashSet::new(), &NoClaims, Utc::now())
            .unwrap();

        let ids: Vec<&str> = candidates.iter().map(|c| c.lawyer_id.as_ref()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
        assert!(candidates.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn identical_distances_tie_break_by_id() {
        let registry = Arc::new(PresenceRegistry::new());
        north_of(&registry, "lawyer-b", 1.0);
        north_of(&registry, "lawyer-a", 1.0);

        let matcher = default_matcher(Arc::clone(&registry));
        let candidates = matcher
            .find_candidates(origin(), &HashSet::new(), &NoClaims, Utc::now())
            .unwrap();
        let ids: Vec<&str> = candidates.iter().map(|c| c.lawyer_id.as_ref()).collect();
        assert_eq!(ids, vec!["lawyer-a", "lawyer-b"]);
    }

    #[test]
    fn faster_historical_response_wins_at_equal_distance() {
        let registry = Arc::new(PresenceRegistry::new());
        north_of(&registry, "slow", 1.0);
        north_of(&registry, "quick", 1.0);
        north_of(&registry, "unknown", 1.0);

        let history = FixedHistory::new(&[("slow", 40.0), ("quick", 8.0)]);
        let matcher = matcher_with(
            Arc::clone(&registry),
            Arc::new(history),
            MatcherConfig::default(),
        );
        let candidates = matcher
            .find_candidates(origin(), &HashSet::new(), &NoClaims, Utc::now())
            .unwrap();
        let ids: Vec<&str> = candidates.iter().map(|c| c.lawyer_id.as_ref()).collect();
        // No history ranks after proven responders.
        assert_eq!(ids, vec!["quick", "slow", "unknown"]);
    }

    #[test]
    fn higher_rating_wins_when_distance_and_history_tie() {
        let registry = Arc::new(PresenceRegistry::new());
        let low = LawyerId::from("low");
        let high = LawyerId::from("high");
        registry
            .update_presence(&low, 55.751 + 1.0 / 111.19, 37.618, true, Some(3.1))
            .unwrap();
        registry
            .update_presence(&high, 55.751 + 1.0 / 111.19, 37.618, true, Some(4.9))
            .unwrap();

        let matcher = default_matcher(Arc::clone(&registry));
        let candidates = matcher
            .find_candidates(origin(), &HashSet::new(), &NoClaims, Utc::now())
            .unwrap();
        assert_eq!(candidates[0].lawyer_id, high);
    }

    #[test]
    fn radius_expands_until_a_distant_lawyer_is_found() {
        let registry = Arc::new(PresenceRegistry::new());
        north_of(&registry, "remote", 14.0); // needs 2 -> 4 -> 8 -> 16

        let matcher = default_matcher(Arc::clone(&registry));
        let candidates = matcher
            .find_candidates(origin(), &HashSet::new(), &NoClaims, Utc::now())
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].lawyer_id, LawyerId::from("remote"));
    }

    #[test]
    fn empty_map_fails_after_exactly_the_configured_expansions() {
        let registry = Arc::new(PresenceRegistry::new());
        let matcher = default_matcher(Arc::clone(&registry));

        match matcher.find_candidates(origin(), &HashSet::new(), &NoClaims, Utc::now()) {
            Err(DispatchError::NoCandidates { expansions, .. }) => {
                assert_eq!(expansions, MatcherConfig::default().max_expansions);
            }
            other => panic!("expected NoCandidates, got {:?}", other),
        }
    }

    #[test]
    fn lawyers_beyond_the_ceiling_are_never_matched() {
        let registry = Arc::new(PresenceRegistry::new());
        north_of(&registry, "too-far", 80.0); // beyond the 50 km ceiling

        let matcher = default_matcher(Arc::clone(&registry));
        assert!(matches!(
            matcher.find_candidates(origin(), &HashSet::new(), &NoClaims, Utc::now()),
            Err(DispatchError::NoCandidates { .. })
        ));
    }

    #[test]
    fn excluded_lawyers_are_not_reoffered() {
        let registry = Arc::new(PresenceRegistry::new());
        north_of(&registry, "declined", 1.0);
        north_of(&registry, "fresh", 2.0);

        let matcher = default_matcher(Arc::clone(&registry));
        let excluded: HashSet<LawyerId> = [LawyerId::from("declined")].into_iter().collect();
        let candidates = matcher
            .find_candidates(origin(), &excluded, &NoClaims, Utc::now())
            .unwrap();
        let ids: Vec<&str> = candidates.iter().map(|c| c.lawyer_id.as_ref()).collect();
        assert_eq!(ids, vec!["fresh"]);
    }

    #[test]
    fn candidate_limit_caps_the_list() {
        let registry = Arc::new(PresenceRegistry::new());
        for i in 0..15 {
            north_of(&registry, &format!("lawyer-{:02}", i), 0.5 + i as f64 * 0.05);
        }
        let config = MatcherConfig {
            candidate_limit: 4,
            ..MatcherConfig::default()
        };
        let matcher = matcher_with(Arc::clone(&registry), Arc::new(NoHistory), config);
        let candidates = matcher
            .find_candidates(origin(), &HashSet::new(), &NoClaims, Utc::now())
            .unwrap();
        assert_eq!(candidates.len(), 4);
    }
}
