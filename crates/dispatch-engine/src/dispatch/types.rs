//! Call lifecycle types for the dispatch state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Actor, CallId, ClientId, GeoPoint, LawyerId};

/// Emergency call status
///
/// The status advances along `pending → assigned → active → completed`,
/// with `cancelled` reachable from any non-terminal state. `Completed`
/// and `Cancelled` are terminal. All transitions go through the claim
/// ledger; nothing else writes the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Waiting for a lawyer; a dispatch cycle may be in flight.
    Pending,
    /// A lawyer holds the claim but has not yet confirmed.
    Assigned,
    /// The assigned lawyer confirmed within the acceptance window.
    Active,
    /// The consultation finished.
    Completed,
    /// Withdrawn by the client or closed administratively.
    Cancelled,
}

impl CallStatus {
    /// Whether the status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Cancelled)
    }

    /// Whether `self → to` is a legal edge of the state diagram.
    pub fn can_transition_to(&self, to: CallStatus) -> bool {
        use CallStatus::*;
        matches!(
            (self, to),
            (Pending, Assigned)
                | (Assigned, Active)
                | (Assigned, Pending)
                | (Active, Completed)
                | (Pending, Cancelled)
                | (Assigned, Cancelled)
                | (Active, Cancelled)
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Pending => "pending",
            CallStatus::Assigned => "assigned",
            CallStatus::Active => "active",
            CallStatus::Completed => "completed",
            CallStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(CallStatus::Pending),
            "assigned" => Ok(CallStatus::Assigned),
            "active" => Ok(CallStatus::Active),
            "completed" => Ok(CallStatus::Completed),
            "cancelled" => Ok(CallStatus::Cancelled),
            _ => Err(format!("unknown call status: {}", s)),
        }
    }
}

/// How a cancelled call was resolved.
///
/// The actor distinguishes client withdrawal from administrative closure;
/// the free-text reason is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    /// Who cancelled the call.
    pub actor: Actor,
    /// Optional human-readable reason.
    pub reason: Option<String>,
}

/// An emergency legal-help request and its lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCall {
    /// Opaque call identifier.
    pub id: CallId,

    /// The client who requested help.
    pub client_id: ClientId,

    /// Set once a claim succeeds; cleared when an offer is released.
    pub lawyer_id: Option<LawyerId>,

    /// Where help is needed.
    pub location: GeoPoint,

    /// Free-text address supplied at intake.
    pub address: String,

    /// Current lifecycle state.
    pub status: CallStatus,

    /// Priority flag, set at intake, immutable afterwards.
    pub is_urgent: bool,

    /// Optional free text from the client.
    pub notes: Option<String>,

    /// Dispatch cycles consumed so far.
    pub attempt_count: u32,

    /// Distinguished pending sub-state: the retry bound was exhausted and
    /// the call now needs operator intervention.
    pub escalated: bool,

    /// Present once the call is cancelled.
    pub cancellation: Option<Cancellation>,

    /// Intake timestamp.
    pub created_at: DateTime<Utc>,

    /// When the assigned lawyer confirmed.
    pub accepted_at: Option<DateTime<Utc>>,

    /// When the consultation finished.
    pub completed_at: Option<DateTime<Utc>>,

    /// Bumped on every transition.
    pub updated_at: DateTime<Utc>,
}

impl EmergencyCall {
    /// Build a fresh `pending` call at intake time.
    pub fn new(
        client_id: ClientId,
        location: GeoPoint,
        address: String,
        is_urgent: bool,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CallId::new(),
            client_id,
            lawyer_id: None,
            location,
            address,
            status: CallStatus::Pending,
            is_urgent,
            notes,
            attempt_count: 0,
            escalated: false,
            cancellation: None,
            created_at: now,
            accepted_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Time the client has been (or was) waiting for a confirmed lawyer.
    ///
    /// While pending/assigned this is `now - created_at`; once accepted it
    /// freezes at `accepted_at - created_at`.
    pub fn wait_time(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.accepted_at {
            Some(accepted) => accepted - self.created_at,
            None => now - self.created_at,
        }
    }

    /// `accepted_at - created_at`, once a lawyer has confirmed.
    pub fn response_time(&self) -> Option<chrono::Duration> {
        self.accepted_at.map(|accepted| accepted - self.created_at)
    }
}

/// Outcome of a single offer within a dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Offer outstanding; the acceptance window is running.
    Pending,
    /// The lawyer confirmed.
    Accepted,
    /// The lawyer declined.
    Rejected,
    /// The acceptance window elapsed without confirmation.
    TimedOut,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttemptOutcome::Pending => "pending",
            AttemptOutcome::Accepted => "accepted",
            AttemptOutcome::Rejected => "rejected",
            AttemptOutcome::TimedOut => "timed_out",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AttemptOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptOutcome::Pending),
            "accepted" => Ok(AttemptOutcome::Accepted),
            "rejected" => Ok(AttemptOutcome::Rejected),
            "timed_out" => Ok(AttemptOutcome::TimedOut),
            _ => Err(format!("unknown attempt outcome: {}", s)),
        }
    }
}

/// One offer of a call to a lawyer. Internal to the dispatcher; used to
/// avoid re-offering within a cycle and to bound attempts per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub call_id: CallId,
    pub lawyer_id: LawyerId,
    pub offered_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> EmergencyCall {
        EmergencyCall::new(
            ClientId::from("client-1"),
            GeoPoint::new(55.751, 37.618).unwrap(),
            "Tverskaya 1".to_string(),
            false,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn new_call_starts_pending_without_lawyer() {
        let c = call();
        assert_eq!(c.status, CallStatus::Pending);
        assert!(c.lawyer_id.is_none());
        assert!(!c.escalated);
        assert_eq!(c.attempt_count, 0);
    }

    #[test]
    fn transition_table_matches_state_diagram() {
        use CallStatus::*;
        assert!(Pending.can_transition_to(Assigned));
        assert!(Assigned.can_transition_to(Active));
        assert!(Assigned.can_transition_to(Pending));
        assert!(Active.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Cancelled));

        assert!(!Completed.can_transition_to(Assigned));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Active));
        assert!(!Active.can_transition_to(Assigned));
    }

    #[test]
    fn wait_time_freezes_at_acceptance() {
        let mut c = call();
        let accepted = c.created_at + chrono::Duration::seconds(30);
        c.accepted_at = Some(accepted);
        let much_later = c.created_at + chrono::Duration::seconds(500);
        assert_eq!(c.wait_time(much_later).num_seconds(), 30);
        assert_eq!(c.response_time().unwrap().num_seconds(), 30);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            CallStatus::Pending,
            CallStatus::Assigned,
            CallStatus::Active,
            CallStatus::Completed,
            CallStatus::Cancelled,
        ] {
            assert_eq!(s.to_string().parse::<CallStatus>().unwrap(), s);
        }
    }
}
