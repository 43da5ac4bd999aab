//! # Claim Ledger
//!
//! The single linearization point for the `(status, lawyer_id, claim)`
//! triple. Every mutation of a call's status or lawyer binding happens as
//! one conditional critical section under one mutex — no separate lock
//! service, no await while the lock is held. Two concurrent offers for the
//! same call, or for the same lawyer, can never both win.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{DispatchError, Result};
use crate::presence::AssignmentProbe;
use crate::types::{Actor, CallId, LawyerId};

use super::types::{
    AttemptOutcome, CallStatus, Cancellation, DispatchAttempt, EmergencyCall,
};

/// Snapshot of live status gauges, taken under the ledger lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub assigned: usize,
    pub active: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub escalated: usize,
}

impl StatusCounts {
    /// Calls that still need dispatcher attention.
    pub fn open(&self) -> usize {
        self.pending + self.assigned + self.active
    }
}

#[derive(Default)]
struct LedgerState {
    calls: HashMap<CallId, EmergencyCall>,
    /// lawyer -> call holding the non-terminal claim. At most one entry
    /// per lawyer at any instant.
    claims: HashMap<LawyerId, CallId>,
    attempts: HashMap<CallId, Vec<DispatchAttempt>>,
}

/// In-memory call store plus the lawyer-claim table.
///
/// All methods take `&self` and lock internally; critical sections are
/// await-free, which makes each operation linearizable with respect to a
/// given `call_id` and `lawyer_id`.
pub struct ClaimLedger {
    inner: Mutex<LedgerState>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerState::default()),
        }
    }

    /// Admit a freshly validated call in `pending` state.
    pub fn insert_call(&self, call: EmergencyCall) -> Result<()> {
        let mut state = self.inner.lock().expect("ledger poisoned");
        if state.calls.contains_key(&call.id) {
            return Err(DispatchError::conflict(format!(
                "call {} already exists",
                call.id
            )));
        }
        state.calls.insert(call.id.clone(), call);
        Ok(())
    }

    /// Restore a call (and its attempt history) from persistence,
    /// rebuilding the claim table for assigned/active calls.
    pub fn restore(&self, call: EmergencyCall, attempts: Vec<DispatchAttempt>) {
        let mut state = self.inner.lock().expect("ledger poisoned");
        if matches!(call.status, CallStatus::Assigned | CallStatus::Active) {
            if let Some(lawyer) = call.lawyer_id.clone() {
                state.claims.insert(lawyer, call.id.clone());
            }
        }
        state.attempts.insert(call.id.clone(), attempts);
        state.calls.insert(call.id.clone(), call);
    }

    pub fn get_call(&self, call_id: &CallId) -> Option<EmergencyCall> {
        let state = self.inner.lock().expect("ledger poisoned");
        state.calls.get(call_id).cloned()
    }

    /// List calls, newest first, optionally filtered by status.
    pub fn list_calls(&self, status: Option<CallStatus>, limit: usize) -> Vec<EmergencyCall> {
        let state = self.inner.lock().expect("ledger poisoned");
        let mut calls: Vec<EmergencyCall> = state
            .calls
            .values()
            .filter(|c| status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        calls.truncate(limit);
        calls
    }

    pub fn status_counts(&self) -> StatusCounts {
        let state = self.inner.lock().expect("ledger poisoned");
        let mut counts = StatusCounts::default();
        for call in state.calls.values() {
            match call.status {
                CallStatus::Pending => counts.pending += 1,
                CallStatus::Assigned => counts.assigned += 1,
                CallStatus::Active => counts.active += 1,
                CallStatus::Completed => counts.completed += 1,
                CallStatus::Cancelled => counts.cancelled += 1,
            }
            if call.escalated && !call.status.is_terminal() {
                counts.escalated += 1;
            }
        }
        counts
    }

    /// Lawyers already offered this call within the current dispatch
    /// history (any outcome). The matcher excludes them.
    pub fn attempted_lawyers(&self, call_id: &CallId) -> HashSet<LawyerId> {
        let state = self.inner.lock().expect("ledger poisoned");
        state
            .attempts
            .get(call_id)
            .map(|attempts| attempts.iter().map(|a| a.lawyer_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn attempts(&self, call_id: &CallId) -> Vec<DispatchAttempt> {
        let state = self.inner.lock().expect("ledger poisoned");
        state.attempts.get(call_id).cloned().unwrap_or_default()
    }

    /// Atomic claim: `pending → assigned` keyed on call-still-pending AND
    /// lawyer-claim-free. Records the pending attempt and returns its
    /// index (the acceptance timer's identity check) together with the
    /// post-claim call snapshot.
    pub fn claim(
        &self,
        call_id: &CallId,
        lawyer_id: &LawyerId,
        now: DateTime<Utc>,
    ) -> Result<(usize, EmergencyCall)> {
        let mut state = self.inner.lock().expect("ledger poisoned");

        {
            let call = state
                .calls
                .get(call_id)
                .ok_or_else(|| DispatchError::not_found(format!("call {}", call_id)))?;
            match call.status {
                CallStatus::Pending => {}
                s if s.is_terminal() => {
                    return Err(DispatchError::stale_state(format!(
                        "call {} is already {}",
                        call_id, s
                    )))
                }
                s => {
                    return Err(DispatchError::conflict(format!(
                        "call {} is {}, not pending",
                        call_id, s
                    )))
                }
            }
        }
        if let Some(existing) = state.claims.get(lawyer_id) {
            return Err(DispatchError::conflict(format!(
                "lawyer {} already claimed by call {}",
                lawyer_id, existing
            )));
        }

        let attempt = DispatchAttempt {
            call_id: call_id.clone(),
            lawyer_id: lawyer_id.clone(),
            offered_at: now,
            outcome: AttemptOutcome::Pending,
        };
        let attempts = state.attempts.entry(call_id.clone()).or_default();
        attempts.push(attempt);
        let attempt_index = attempts.len() - 1;

        state.claims.insert(lawyer_id.clone(), call_id.clone());
        let call = state.calls.get_mut(call_id).expect("checked above");
        call.status = CallStatus::Assigned;
        call.lawyer_id = Some(lawyer_id.clone());
        call.attempt_count += 1;
        call.updated_at = now;

        Ok((attempt_index, call.clone()))
    }

    /// `assigned → active`: the offered lawyer confirms within the window.
    ///
    /// The actor check happens inside the same critical section as the
    /// transition, so a racing cancel/timeout cannot slip between them.
    pub fn confirm(
        &self,
        call_id: &CallId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<EmergencyCall> {
        let mut state = self.inner.lock().expect("ledger poisoned");
        let call = state
            .calls
            .get_mut(call_id)
            .ok_or_else(|| DispatchError::not_found(format!("call {}", call_id)))?;

        match call.status {
            CallStatus::Assigned => {}
            CallStatus::Pending => {
                return Err(DispatchError::conflict(format!(
                    "call {} has no outstanding offer",
                    call_id
                )))
            }
            s => {
                return Err(DispatchError::stale_state(format!(
                    "call {} is already {}",
                    call_id, s
                )))
            }
        }

        let assigned = call.lawyer_id.clone().expect("assigned call has lawyer");
        match actor {
            Actor::Lawyer(id) if *id == assigned => {}
            Actor::Admin(_) | Actor::System => {}
            other => {
                return Err(DispatchError::unauthorized(format!(
                    "{} cannot confirm call {} assigned to {}",
                    other, call_id, assigned
                )))
            }
        }

        call.status = CallStatus::Active;
        call.accepted_at = Some(now);
        call.updated_at = now;
        let snapshot = call.clone();

        if let Some(attempt) = state
            .attempts
            .get_mut(call_id)
            .and_then(|a| a.last_mut())
        {
            attempt.outcome = AttemptOutcome::Accepted;
        }
        Ok(snapshot)
    }

    /// `assigned → pending` on an explicit rejection by the offered lawyer.
    /// Releases the claim and marks the outstanding attempt.
    pub fn reject(
        &self,
        call_id: &CallId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<EmergencyCall> {
        let mut state = self.inner.lock().expect("ledger poisoned");
        let call = state
            .calls
            .get_mut(call_id)
            .ok_or_else(|| DispatchError::not_found(format!("call {}", call_id)))?;

        match call.status {
            CallStatus::Assigned => {}
            CallStatus::Pending => {
                return Err(DispatchError::conflict(format!(
                    "call {} has no outstanding offer",
                    call_id
                )))
            }
            s => {
                return Err(DispatchError::stale_state(format!(
                    "call {} is already {}",
                    call_id, s
                )))
            }
        }

        let assigned = call.lawyer_id.clone().expect("assigned call has lawyer");
        match actor {
            Actor::Lawyer(id) if *id == assigned => {}
            Actor::Admin(_) | Actor::System => {}
            other => {
                return Err(DispatchError::unauthorized(format!(
                    "{} cannot reject call {} assigned to {}",
                    other, call_id, assigned
                )))
            }
        }

        call.status = CallStatus::Pending;
        call.lawyer_id = None;
        call.updated_at = now;
        let snapshot = call.clone();

        state.claims.remove(&assigned);
        if let Some(attempt) = state
            .attempts
            .get_mut(call_id)
            .and_then(|a| a.last_mut())
        {
            attempt.outcome = AttemptOutcome::Rejected;
        }
        Ok(snapshot)
    }

    /// `assigned → pending` when the acceptance window elapses.
    ///
    /// The timer passes the attempt index it was armed with; if the call
    /// has moved on (confirmed, rejected, cancelled, or re-offered) the
    /// identity check fails and the timer's firing is a no-op for state.
    pub fn expire_offer(
        &self,
        call_id: &CallId,
        attempt_index: usize,
        now: DateTime<Utc>,
    ) -> Result<EmergencyCall> {
        let mut state = self.inner.lock().expect("ledger poisoned");

        let current = state
            .attempts
            .get(call_id)
            .map(|a| a.len().saturating_sub(1))
            .unwrap_or(0);
        let outstanding = state
            .attempts
            .get(call_id)
            .and_then(|a| a.last())
            .map(|a| a.outcome == AttemptOutcome::Pending)
            .unwrap_or(false);

        let call = state
            .calls
            .get(call_id)
            .ok_or_else(|| DispatchError::not_found(format!("call {}", call_id)))?;
        if call.status != CallStatus::Assigned || current != attempt_index || !outstanding {
            return Err(DispatchError::stale_state(format!(
                "offer for call {} already resolved",
                call_id
            )));
        }

        let assigned = call.lawyer_id.clone().expect("assigned call has lawyer");
        let call = state.calls.get_mut(call_id).expect("checked above");
        call.status = CallStatus::Pending;
        call.lawyer_id = None;
        call.updated_at = now;
        let snapshot = call.clone();

        state.claims.remove(&assigned);
        if let Some(attempt) = state
            .attempts
            .get_mut(call_id)
            .and_then(|a| a.last_mut())
        {
            attempt.outcome = AttemptOutcome::TimedOut;
        }
        Ok(snapshot)
    }

    /// Any non-terminal state → `cancelled`. Frees any claim immediately.
    ///
    /// A cancellation racing a confirm resolves in favor of whichever
    /// mutation takes the lock first; the loser gets `StaleState`.
    pub fn cancel(
        &self,
        call_id: &CallId,
        actor: &Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(EmergencyCall, CallStatus)> {
        let mut state = self.inner.lock().expect("ledger poisoned");
        let call = state
            .calls
            .get_mut(call_id)
            .ok_or_else(|| DispatchError::not_found(format!("call {}", call_id)))?;

        if call.status.is_terminal() {
            return Err(DispatchError::stale_state(format!(
                "call {} is already {}",
                call_id, call.status
            )));
        }

        match actor {
            Actor::Client(id) if *id == call.client_id => {}
            Actor::Admin(_) | Actor::System => {}
            other => {
                return Err(DispatchError::unauthorized(format!(
                    "{} cannot cancel call {}",
                    other, call_id
                )))
            }
        }

        let from = call.status;
        let released = call.lawyer_id.take();
        call.status = CallStatus::Cancelled;
        call.cancellation = Some(Cancellation {
            actor: actor.clone(),
            reason,
        });
        call.updated_at = now;
        let snapshot = call.clone();

        if let Some(lawyer) = released {
            state.claims.remove(&lawyer);
            if let Some(attempt) = state
                .attempts
                .get_mut(call_id)
                .and_then(|a| a.last_mut())
            {
                if attempt.outcome == AttemptOutcome::Pending {
                    attempt.outcome = AttemptOutcome::Rejected;
                }
            }
        }
        Ok((snapshot, from))
    }

    /// `active → completed`, signalled by the consultation-session
    /// collaborator. The lawyer keeps the record but the claim is freed.
    pub fn complete(&self, call_id: &CallId, now: DateTime<Utc>) -> Result<EmergencyCall> {
        let mut state = self.inner.lock().expect("ledger poisoned");
        let call = state
            .calls
            .get_mut(call_id)
            .ok_or_else(|| DispatchError::not_found(format!("call {}", call_id)))?;

        match call.status {
            CallStatus::Active => {}
            s if s.is_terminal() => {
                return Err(DispatchError::stale_state(format!(
                    "call {} is already {}",
                    call_id, s
                )))
            }
            s => {
                return Err(DispatchError::conflict(format!(
                    "call {} is {}, not active",
                    call_id, s
                )))
            }
        }

        let lawyer = call.lawyer_id.clone().expect("active call has lawyer");
        call.status = CallStatus::Completed;
        call.completed_at = Some(now);
        call.updated_at = now;
        let snapshot = call.clone();

        state.claims.remove(&lawyer);
        Ok(snapshot)
    }

    /// Flag a pending call as escalated once the retry bound is exhausted.
    pub fn mark_escalated(&self, call_id: &CallId, now: DateTime<Utc>) -> Result<EmergencyCall> {
        let mut state = self.inner.lock().expect("ledger poisoned");
        let call = state
            .calls
            .get_mut(call_id)
            .ok_or_else(|| DispatchError::not_found(format!("call {}", call_id)))?;
        if call.status != CallStatus::Pending {
            return Err(DispatchError::conflict(format!(
                "call {} is {}, not pending",
                call_id, call.status
            )));
        }
        call.escalated = true;
        call.updated_at = now;
        Ok(call.clone())
    }
}

impl Default for ClaimLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentProbe for ClaimLedger {
    fn is_claimed(&self, lawyer_id: &LawyerId) -> bool {
        let state = self.inner.lock().expect("ledger poisoned");
        state.claims.contains_key(lawyer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientId, GeoPoint};
    use std::sync::Arc;

    fn pending_call() -> EmergencyCall {
        EmergencyCall::new(
            ClientId::from("client-1"),
            GeoPoint::new(55.751, 37.618).unwrap(),
            "Tverskaya 1".to_string(),
            true,
            None,
            Utc::now(),
        )
    }

    fn lawyer(n: usize) -> LawyerId {
        LawyerId::from(format!("lawyer-{:03}", n))
    }

    #[test]
    fn claim_assigns_and_records_attempt() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();

        let (idx, snapshot) = ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(snapshot.status, CallStatus::Assigned);

        let call = ledger.get_call(&id).unwrap();
        assert_eq!(call.status, CallStatus::Assigned);
        assert_eq!(call.lawyer_id, Some(lawyer(1)));
        assert_eq!(call.attempt_count, 1);
        assert!(ledger.is_claimed(&lawyer(1)));
    }

    #[test]
    fn lawyer_cannot_hold_two_claims() {
        let ledger = ClaimLedger::new();
        let a = pending_call();
        let b = pending_call();
        let (id_a, id_b) = (a.id.clone(), b.id.clone());
        ledger.insert_call(a).unwrap();
        ledger.insert_call(b).unwrap();

        ledger.claim(&id_a, &lawyer(1), Utc::now()).unwrap();
        let err = ledger.claim(&id_b, &lawyer(1), Utc::now()).unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));
    }

    #[test]
    fn concurrent_claims_have_exactly_one_winner() {
        let ledger = Arc::new(ClaimLedger::new());
        let target = lawyer(7);

        let mut call_ids = Vec::new();
        for _ in 0..16 {
            let call = pending_call();
            call_ids.push(call.id.clone());
            ledger.insert_call(call).unwrap();
        }

        let mut handles = Vec::new();
        for id in call_ids {
            let ledger = Arc::clone(&ledger);
            let target = target.clone();
            handles.push(std::thread::spawn(move || {
                ledger.claim(&id, &target, Utc::now()).is_ok()
            }));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn confirm_requires_the_assigned_lawyer() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();
        ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();

        let err = ledger
            .confirm(&id, &Actor::Lawyer(lawyer(2)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized(_)));

        let call = ledger
            .confirm(&id, &Actor::Lawyer(lawyer(1)), Utc::now())
            .unwrap();
        assert_eq!(call.status, CallStatus::Active);
        assert!(call.accepted_at.is_some());
    }

    #[test]
    fn second_confirm_is_stale_and_does_not_move_accepted_at() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();
        ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();

        let first = ledger
            .confirm(&id, &Actor::Lawyer(lawyer(1)), Utc::now())
            .unwrap();
        let err = ledger
            .confirm(&id, &Actor::Lawyer(lawyer(1)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DispatchError::StaleState(_)));
        assert_eq!(
            ledger.get_call(&id).unwrap().accepted_at,
            first.accepted_at
        );
    }

    #[test]
    fn reject_releases_claim_and_returns_to_pending() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();
        ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();

        let call = ledger
            .reject(&id, &Actor::Lawyer(lawyer(1)), Utc::now())
            .unwrap();
        assert_eq!(call.status, CallStatus::Pending);
        assert!(call.lawyer_id.is_none());
        assert!(!ledger.is_claimed(&lawyer(1)));
        assert_eq!(
            ledger.attempts(&id)[0].outcome,
            AttemptOutcome::Rejected
        );
    }

    #[test]
    fn expired_offer_with_stale_attempt_index_is_a_noop() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();

        let (idx, _) = ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();
        ledger
            .reject(&id, &Actor::Lawyer(lawyer(1)), Utc::now())
            .unwrap();
        let (idx2, _) = ledger.claim(&id, &lawyer(2), Utc::now()).unwrap();
        assert_ne!(idx, idx2);

        // Timer armed for the first offer fires late: attempt identity
        // no longer matches, state must not change.
        let err = ledger.expire_offer(&id, idx, Utc::now()).unwrap_err();
        assert!(matches!(err, DispatchError::StaleState(_)));
        let call = ledger.get_call(&id).unwrap();
        assert_eq!(call.status, CallStatus::Assigned);
        assert_eq!(call.lawyer_id, Some(lawyer(2)));
    }

    #[test]
    fn expire_offer_times_out_the_outstanding_attempt() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();
        let (idx, _) = ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();

        let call = ledger.expire_offer(&id, idx, Utc::now()).unwrap();
        assert_eq!(call.status, CallStatus::Pending);
        assert!(!ledger.is_claimed(&lawyer(1)));
        assert_eq!(
            ledger.attempts(&id)[idx].outcome,
            AttemptOutcome::TimedOut
        );
    }

    #[test]
    fn cancel_beats_late_confirm() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        let client = call.client_id.clone();
        ledger.insert_call(call).unwrap();
        ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();

        let (cancelled, from) = ledger
            .cancel(&id, &Actor::Client(client), Some("resolved".into()), Utc::now())
            .unwrap();
        assert_eq!(from, CallStatus::Assigned);
        assert_eq!(cancelled.status, CallStatus::Cancelled);
        assert!(cancelled.lawyer_id.is_none());
        assert!(!ledger.is_claimed(&lawyer(1)));

        let err = ledger
            .confirm(&id, &Actor::Lawyer(lawyer(1)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DispatchError::StaleState(_)));
    }

    #[test]
    fn cancel_requires_owner_or_admin() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();

        let err = ledger
            .cancel(
                &id,
                &Actor::Client(ClientId::from("someone-else")),
                None,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized(_)));

        ledger
            .cancel(&id, &Actor::Admin("ops".into()), None, Utc::now())
            .unwrap();
    }

    #[test]
    fn complete_only_from_active() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();

        assert!(matches!(
            ledger.complete(&id, Utc::now()).unwrap_err(),
            DispatchError::Conflict(_)
        ));

        ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();
        ledger
            .confirm(&id, &Actor::Lawyer(lawyer(1)), Utc::now())
            .unwrap();
        let call = ledger.complete(&id, Utc::now()).unwrap();
        assert_eq!(call.status, CallStatus::Completed);
        assert_eq!(call.lawyer_id, Some(lawyer(1)));
        assert!(call.completed_at.is_some());
        assert!(!ledger.is_claimed(&lawyer(1)));

        assert!(matches!(
            ledger.complete(&id, Utc::now()).unwrap_err(),
            DispatchError::StaleState(_)
        ));
    }

    #[test]
    fn status_never_leaves_terminal() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();
        ledger
            .cancel(&id, &Actor::System, None, Utc::now())
            .unwrap();

        assert!(ledger.claim(&id, &lawyer(1), Utc::now()).is_err());
        assert!(ledger
            .cancel(&id, &Actor::System, None, Utc::now())
            .is_err());
        assert_eq!(
            ledger.get_call(&id).unwrap().status,
            CallStatus::Cancelled
        );
    }

    #[test]
    fn escalation_flags_pending_calls_only() {
        let ledger = ClaimLedger::new();
        let call = pending_call();
        let id = call.id.clone();
        ledger.insert_call(call).unwrap();

        ledger.mark_escalated(&id, Utc::now()).unwrap();
        assert!(ledger.get_call(&id).unwrap().escalated);
        assert_eq!(ledger.status_counts().escalated, 1);

        ledger.claim(&id, &lawyer(1), Utc::now()).unwrap();
        assert!(matches!(
            ledger.mark_escalated(&id, Utc::now()).unwrap_err(),
            DispatchError::Conflict(_)
        ));
    }
}
