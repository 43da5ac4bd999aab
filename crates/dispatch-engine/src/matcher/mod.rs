//! # Geospatial Matcher
//!
//! Ranks currently-eligible lawyers for a call by great-circle distance,
//! with historical responsiveness and rating as tie-breaks. Search starts
//! at a configured radius and doubles geometrically up to a ceiling; a
//! capped number of expansions bounds the search on sparse maps, and
//! exhausting the cap surfaces an explicit no-candidates outcome rather
//! than looping.

pub mod geo;

mod engine;

pub use engine::{Candidate, MatcherEngine};

use crate::types::LawyerId;

/// Read-side seam to historical response times, implemented by the
/// metrics aggregator. The matcher uses the median as its primary
/// tie-break between equally distant lawyers.
pub trait ResponseHistory: Send + Sync {
    /// Median confirmed response time in seconds, if the lawyer has any
    /// history at all.
    fn median_response_seconds(&self, lawyer_id: &LawyerId) -> Option<f64>;
}

/// History source for tests and fresh deployments: no data for anyone.
pub struct NoHistory;

impl ResponseHistory for NoHistory {
    fn median_response_seconds(&self, _lawyer_id: &LawyerId) -> Option<f64> {
        None
    }
}
