//! # Dispatch Engine
//!
//! Owns the call lifecycle end to end: it drives dispatch cycles (match →
//! claim → offer → acceptance window), reacts to confirm/reject/timeout/
//! cancel, enforces the bounded-retry policy with operator escalation, and
//! feeds every transition to the metrics aggregator and the notification
//! collaborator.
//!
//! All status/claim mutation goes through the [`ClaimLedger`]; the engine
//! adds the policy around it. Acceptance-window timers are abortable tokio
//! tasks keyed by call id; a timer that fires late re-checks its attempt
//! identity under the ledger lock before acting, so a timer can never
//! revoke an offer that was already confirmed, rejected, or replaced.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DispatchConfig;
use crate::database::DatabaseManager;
use crate::error::{DispatchError, Result};
use crate::matcher::MatcherEngine;
use crate::metrics::MetricsAggregator;
use crate::notify::NotificationService;
use crate::presence::PresenceRegistry;
use crate::types::{Actor, CallId, LawyerId};

use super::ledger::{ClaimLedger, StatusCounts};
use super::types::{AttemptOutcome, CallStatus, DispatchAttempt, EmergencyCall};

/// How a single dispatch cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An offer is outstanding with the given lawyer.
    Offered(LawyerId),
    /// The matcher exhausted its radius expansions; the call stays
    /// pending and is reported as unmatched.
    Unmatched,
    /// The retry bound was exhausted; the call is flagged for operators.
    Escalated,
    /// The call left `pending` before (or while) this cycle ran.
    Superseded,
}

struct TimerGuard {
    attempt_index: usize,
    handle: JoinHandle<()>,
}

struct EngineInner {
    config: DispatchConfig,
    ledger: ClaimLedger,
    registry: Arc<PresenceRegistry>,
    matcher: MatcherEngine,
    metrics: Arc<MetricsAggregator>,
    notifier: Arc<dyn NotificationService>,
    db: Option<Arc<DatabaseManager>>,
    timers: DashMap<CallId, TimerGuard>,
}

/// Cheaply cloneable handle to the dispatch core.
#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

impl DispatchEngine {
    pub fn new(
        config: DispatchConfig,
        registry: Arc<PresenceRegistry>,
        metrics: Arc<MetricsAggregator>,
        notifier: Arc<dyn NotificationService>,
        db: Option<Arc<DatabaseManager>>,
    ) -> Self {
        let matcher = MatcherEngine::new(
            Arc::clone(&registry),
            Arc::clone(&metrics) as Arc<dyn crate::matcher::ResponseHistory>,
            config.matcher.clone(),
            &config.presence,
        );
        Self {
            inner: Arc::new(EngineInner {
                config,
                ledger: ClaimLedger::new(),
                registry,
                matcher,
                metrics,
                notifier,
                db,
                timers: DashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.inner.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.inner.metrics
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    pub fn get_call(&self, call_id: &CallId) -> Result<EmergencyCall> {
        self.inner
            .ledger
            .get_call(call_id)
            .ok_or_else(|| DispatchError::not_found(format!("call {}", call_id)))
    }

    pub fn list_calls(&self, status: Option<CallStatus>, limit: usize) -> Vec<EmergencyCall> {
        self.inner.ledger.list_calls(status, limit)
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.inner.ledger.status_counts()
    }

    pub fn stats(&self) -> crate::metrics::EmergencyCallStats {
        self.inner.metrics.snapshot(Utc::now())
    }

    /// Admit a validated call into the ledger and persistence. Does not
    /// dispatch; intake spawns the first cycle after this returns.
    pub async fn admit_call(&self, call: EmergencyCall) -> Result<CallId> {
        let open = self.inner.ledger.status_counts().open();
        if open >= self.inner.config.general.max_active_calls {
            return Err(DispatchError::ResourceUnavailable(format!(
                "dispatcher at capacity ({} open calls)",
                open
            )));
        }

        let call_id = call.id.clone();
        self.inner.ledger.insert_call(call.clone())?;
        self.inner.metrics.record_created(&call);

        if let Some(db) = &self.inner.db {
            if let Err(e) = db.insert_call(&call).await {
                warn!("failed to persist new call {}: {}", call_id, e);
            }
        }
        info!(
            "🚨 emergency call {} admitted for client {} at {}{}",
            call_id,
            call.client_id,
            call.location,
            if call.is_urgent { " [urgent]" } else { "" }
        );
        Ok(call_id)
    }

    /// Spawn a dispatch cycle in the background.
    pub fn spawn_dispatch(&self, call_id: CallId) {
        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = engine.dispatch_cycle(&call_id).await;
            debug!("dispatch cycle for call {} ended: {:?}", call_id, outcome);
        });
    }

    /// Run one full dispatch cycle for a pending call: query candidates,
    /// claim the best one, notify, and arm the acceptance window.
    ///
    /// Within one call, cycles are strictly sequential — a new offer is
    /// only issued after the previous one resolved — and the bounded retry
    /// policy turns exhaustion into an explicit escalation instead of an
    /// endless loop.
    pub async fn dispatch_cycle(&self, call_id: &CallId) -> DispatchOutcome {
        // Candidate snapshots go stale immediately; every round re-reads
        // state and lets the claim CAS arbitrate. Rounds are bounded so a
        // storm of competing claims cannot spin this task forever.
        let max_rounds = self.inner.config.dispatch.max_attempts.max(1);
        for _ in 0..max_rounds {
            let call = match self.inner.ledger.get_call(call_id) {
                Some(c) => c,
                None => return DispatchOutcome::Superseded,
            };
            if call.status != CallStatus::Pending || call.escalated {
                return DispatchOutcome::Superseded;
            }

            if call.attempt_count >= self.inner.config.dispatch.max_attempts {
                return self.escalate(call_id).await;
            }

            let excluded = self.inner.ledger.attempted_lawyers(call_id);
            let candidates = match self.inner.matcher.find_candidates(
                call.location,
                &excluded,
                &self.inner.ledger,
                Utc::now(),
            ) {
                Ok(c) => c,
                Err(DispatchError::NoCandidates { expansions, radius_km }) => {
                    warn!(
                        "call {} unmatched: no eligible lawyer within {:.1} km ({} expansions, {} already attempted)",
                        call_id,
                        radius_km,
                        expansions,
                        excluded.len()
                    );
                    self.notify_status_bg(call_id, CallStatus::Pending);
                    return DispatchOutcome::Unmatched;
                }
                Err(e) => {
                    error!("matcher failure for call {}: {}", call_id, e);
                    return DispatchOutcome::Unmatched;
                }
            };

            for candidate in candidates {
                match self
                    .inner
                    .ledger
                    .claim(call_id, &candidate.lawyer_id, Utc::now())
                {
                    Ok((attempt_index, call)) => {
                        info!(
                            "📨 call {} offered to lawyer {} ({:.2} km away, attempt {})",
                            call_id, candidate.lawyer_id, candidate.distance_km, call.attempt_count
                        );
                        self.inner.metrics.record_transition(
                            &call,
                            CallStatus::Pending,
                            CallStatus::Assigned,
                            call.updated_at,
                        );
                        self.persist_call_bg(&call);
                        self.persist_attempt_bg(call_id, attempt_index);
                        self.notify_assignment_bg(call_id, &candidate.lawyer_id);
                        self.start_acceptance_timer(call_id, attempt_index);
                        return DispatchOutcome::Offered(candidate.lawyer_id);
                    }
                    Err(DispatchError::Conflict(_)) => {
                        // Either the lawyer was snapped up by another call
                        // or this call left pending. Re-read to tell apart.
                        let still_pending = self
                            .inner
                            .ledger
                            .get_call(call_id)
                            .map(|c| c.status == CallStatus::Pending)
                            .unwrap_or(false);
                        if !still_pending {
                            return DispatchOutcome::Superseded;
                        }
                        continue;
                    }
                    Err(DispatchError::StaleState(_)) | Err(DispatchError::NotFound(_)) => {
                        return DispatchOutcome::Superseded;
                    }
                    Err(e) => {
                        error!("claim failure for call {}: {}", call_id, e);
                        return DispatchOutcome::Superseded;
                    }
                }
            }
            // Every candidate in the snapshot lost its race; take a fresh
            // snapshot and try again.
        }
        warn!(
            "call {} still unassigned after {} claim rounds",
            call_id, max_rounds
        );
        DispatchOutcome::Unmatched
    }

    async fn escalate(&self, call_id: &CallId) -> DispatchOutcome {
        match self.inner.ledger.mark_escalated(call_id, Utc::now()) {
            Ok(call) => {
                warn!(
                    "⚠️ call {} escalated after {} attempts; operator intervention required",
                    call_id, call.attempt_count
                );
                self.inner.metrics.record_escalation(&call);
                self.persist_call_bg(&call);
                self.notify_status_bg(call_id, CallStatus::Pending);
                DispatchOutcome::Escalated
            }
            Err(_) => DispatchOutcome::Superseded,
        }
    }

    /// The assigned lawyer confirms within the acceptance window:
    /// `assigned → active`.
    pub async fn confirm_call(&self, call_id: &CallId, actor: &Actor) -> Result<EmergencyCall> {
        let call = self.inner.ledger.confirm(call_id, actor, Utc::now())?;
        self.clear_timer(call_id);

        let response = call
            .response_time()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);
        info!(
            "✅ call {} confirmed by lawyer {} ({:.1}s after intake)",
            call_id,
            call.lawyer_id.as_ref().expect("active call has lawyer"),
            response
        );
        self.inner.metrics.record_transition(
            &call,
            CallStatus::Assigned,
            CallStatus::Active,
            call.updated_at,
        );
        self.persist_call_bg(&call);
        self.persist_attempt_outcome_bg(call_id);
        self.notify_status_bg(call_id, CallStatus::Active);
        Ok(call)
    }

    /// The offered lawyer declines: `assigned → pending`, then re-dispatch
    /// excluding every lawyer already attempted.
    pub async fn reject_call(&self, call_id: &CallId, actor: &Actor) -> Result<EmergencyCall> {
        let call = self.inner.ledger.reject(call_id, actor, Utc::now())?;
        self.clear_timer(call_id);

        info!("call {} rejected by {}; re-dispatching", call_id, actor);
        self.inner.metrics.record_transition(
            &call,
            CallStatus::Assigned,
            CallStatus::Pending,
            call.updated_at,
        );
        self.persist_call_bg(&call);
        self.persist_attempt_outcome_bg(call_id);
        self.notify_status_bg(call_id, CallStatus::Pending);
        self.spawn_dispatch(call_id.clone());
        Ok(call)
    }

    /// Client or admin cancellation from any non-terminal state. Releases
    /// the lawyer claim and interrupts an in-flight acceptance window.
    pub async fn cancel_call(
        &self,
        call_id: &CallId,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<EmergencyCall> {
        let (call, from) = self
            .inner
            .ledger
            .cancel(call_id, actor, reason, Utc::now())?;
        self.clear_timer(call_id);

        info!("🛑 call {} cancelled by {} (was {})", call_id, actor, from);
        self.inner
            .metrics
            .record_transition(&call, from, CallStatus::Cancelled, call.updated_at);
        self.persist_call_bg(&call);
        self.persist_attempt_outcome_bg(call_id);
        self.notify_status_bg(call_id, CallStatus::Cancelled);
        Ok(call)
    }

    /// Completion signal from the consultation-session collaborator:
    /// `active → completed`.
    pub async fn complete_call(&self, call_id: &CallId) -> Result<EmergencyCall> {
        let call = self.inner.ledger.complete(call_id, Utc::now())?;
        info!("🏁 call {} completed", call_id);
        self.inner.metrics.record_transition(
            &call,
            CallStatus::Active,
            CallStatus::Completed,
            call.updated_at,
        );
        self.persist_call_bg(&call);
        self.notify_status_bg(call_id, CallStatus::Completed);
        Ok(call)
    }

    /// Restore a call from persistence at startup: rebuild ledger state,
    /// then resume where the process left off — pending calls re-enter
    /// dispatch, assigned calls get a fresh acceptance window.
    pub fn restore_call(&self, call: EmergencyCall, attempts: Vec<DispatchAttempt>) {
        let call_id = call.id.clone();
        let status = call.status;
        let escalated = call.escalated;
        let attempt_index = attempts.len().saturating_sub(1);
        let outstanding = attempts
            .last()
            .map(|a| a.outcome == AttemptOutcome::Pending)
            .unwrap_or(false);
        self.inner.ledger.restore(call, attempts);

        match status {
            CallStatus::Pending if !escalated => self.spawn_dispatch(call_id),
            CallStatus::Assigned if outstanding => {
                self.start_acceptance_timer(&call_id, attempt_index)
            }
            _ => {}
        }
    }

    fn start_acceptance_timer(&self, call_id: &CallId, attempt_index: usize) {
        let engine = self.clone();
        let id = call_id.clone();
        let window = self.inner.config.dispatch.acceptance_window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            engine.handle_acceptance_timeout(&id, attempt_index).await;
        });
        if let Some(old) = self.inner.timers.insert(
            call_id.clone(),
            TimerGuard {
                attempt_index,
                handle,
            },
        ) {
            old.handle.abort();
        }
    }

    fn clear_timer(&self, call_id: &CallId) {
        if let Some((_, guard)) = self.inner.timers.remove(call_id) {
            guard.handle.abort();
        }
    }

    /// Acceptance window elapsed. The ledger re-checks that this timer's
    /// attempt is still the outstanding one; losing that race is a no-op.
    async fn handle_acceptance_timeout(&self, call_id: &CallId, attempt_index: usize) {
        match self
            .inner
            .ledger
            .expire_offer(call_id, attempt_index, Utc::now())
        {
            Ok(call) => {
                self.inner
                    .timers
                    .remove_if(call_id, |_, g| g.attempt_index == attempt_index);
                info!(
                    "⏰ offer for call {} expired (attempt {}); re-dispatching",
                    call_id, call.attempt_count
                );
                self.inner.metrics.record_transition(
                    &call,
                    CallStatus::Assigned,
                    CallStatus::Pending,
                    call.updated_at,
                );
                self.persist_call_bg(&call);
                self.persist_attempt_outcome_bg(call_id);
                let outcome = self.dispatch_cycle(call_id).await;
                debug!(
                    "re-dispatch after timeout for call {} ended: {:?}",
                    call_id, outcome
                );
            }
            Err(DispatchError::StaleState(_)) => {
                debug!(
                    "acceptance timer for call {} attempt {} fired after resolution; ignoring",
                    call_id, attempt_index
                );
            }
            Err(e) => {
                debug!("acceptance timer for call {}: {}", call_id, e);
            }
        }
    }

    fn notify_assignment_bg(&self, call_id: &CallId, lawyer_id: &LawyerId) {
        let notifier = Arc::clone(&self.inner.notifier);
        let call_id = call_id.clone();
        let lawyer_id = lawyer_id.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_assignment(&call_id, &lawyer_id).await {
                warn!(
                    "assignment notification for call {} failed (ignored): {}",
                    call_id, e
                );
            }
        });
    }

    fn notify_status_bg(&self, call_id: &CallId, status: CallStatus) {
        let notifier = Arc::clone(&self.inner.notifier);
        let call_id = call_id.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.notify_status_change(&call_id, status).await {
                warn!(
                    "status notification for call {} failed (ignored): {}",
                    call_id, e
                );
            }
        });
    }

    fn persist_call_bg(&self, call: &EmergencyCall) {
        if let Some(db) = &self.inner.db {
            let db = Arc::clone(db);
            let call = call.clone();
            tokio::spawn(async move {
                if let Err(e) = db.update_call(&call).await {
                    warn!("failed to persist call {}: {}", call.id, e);
                }
            });
        }
    }

    fn persist_attempt_bg(&self, call_id: &CallId, attempt_index: usize) {
        if let Some(db) = &self.inner.db {
            let attempts = self.inner.ledger.attempts(call_id);
            if let Some(attempt) = attempts.get(attempt_index).cloned() {
                let db = Arc::clone(db);
                tokio::spawn(async move {
                    if let Err(e) = db.record_attempt(&attempt, attempt_index).await {
                        warn!(
                            "failed to persist attempt {} for call {}: {}",
                            attempt_index, attempt.call_id, e
                        );
                    }
                });
            }
        }
    }

    fn persist_attempt_outcome_bg(&self, call_id: &CallId) {
        if let Some(db) = &self.inner.db {
            let attempts = self.inner.ledger.attempts(call_id);
            if attempts.is_empty() {
                return;
            }
            let attempt_index = attempts.len() - 1;
            let attempt = attempts[attempt_index].clone();
            let db = Arc::clone(db);
            tokio::spawn(async move {
                if let Err(e) = db.update_attempt_outcome(&attempt, attempt_index).await {
                    warn!(
                        "failed to persist attempt outcome for call {}: {}",
                        attempt.call_id, e
                    );
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::metrics::MetricsAggregator;
    use crate::notify::LogNotifier;
    use crate::presence::AssignmentProbe;
    use crate::types::{ClientId, GeoPoint};
    use std::time::Duration;

    fn engine_with(config: DispatchConfig) -> DispatchEngine {
        let registry = Arc::new(PresenceRegistry::new());
        let metrics = MetricsAggregator::new(config.metrics.clone());
        DispatchEngine::new(config, registry, metrics, Arc::new(LogNotifier), None)
    }

    fn test_config() -> DispatchConfig {
        let mut config = DispatchConfig::default();
        config.dispatch.acceptance_window = Duration::from_millis(200);
        config
    }

    /// Place a lawyer roughly `km` kilometers north of (55.751, 37.618).
    fn lawyer_north(engine: &DispatchEngine, id: &str, km: f64) -> LawyerId {
        let lawyer = LawyerId::from(id);
        engine
            .registry()
            .update_presence(&lawyer, 55.751 + km / 111.19, 37.618, true, None)
            .unwrap();
        lawyer
    }

    fn new_call() -> EmergencyCall {
        EmergencyCall::new(
            ClientId::from("client-1"),
            GeoPoint::new(55.751, 37.618).unwrap(),
            "Tverskaya 1".to_string(),
            true,
            Some("arrested at a protest".to_string()),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn offers_go_to_the_nearest_lawyer() {
        let engine = engine_with(test_config());
        let near = lawyer_north(&engine, "near", 1.2);
        lawyer_north(&engine, "far", 3.4);

        let call = new_call();
        let id = engine.admit_call(call).await.unwrap();
        let outcome = engine.dispatch_cycle(&id).await;
        assert_eq!(outcome, DispatchOutcome::Offered(near.clone()));

        let call = engine.get_call(&id).unwrap();
        assert_eq!(call.status, CallStatus::Assigned);
        assert_eq!(call.lawyer_id, Some(near));
        assert!(call.accepted_at.is_none(), "not accepted until confirm");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reoffers_to_the_next_candidate() {
        let engine = engine_with(test_config());
        let near = lawyer_north(&engine, "near", 1.2);
        let far = lawyer_north(&engine, "far", 3.4);

        let call = new_call();
        let created_at = call.created_at;
        let id = engine.admit_call(call).await.unwrap();
        assert_eq!(
            engine.dispatch_cycle(&id).await,
            DispatchOutcome::Offered(near.clone())
        );

        // Let the acceptance window lapse; the timer re-dispatches to the
        // second-nearest lawyer. (The second window ends at ~400ms, so
        // observe before that.)
        tokio::time::sleep(Duration::from_millis(300)).await;

        let call = engine.get_call(&id).unwrap();
        assert_eq!(call.status, CallStatus::Assigned);
        assert_eq!(call.lawyer_id, Some(far.clone()));
        assert_eq!(call.attempt_count, 2);

        // The second lawyer confirms; response time covers both cycles.
        let call = engine
            .confirm_call(&id, &Actor::Lawyer(far.clone()))
            .await
            .unwrap();
        assert_eq!(call.status, CallStatus::Active);
        let accepted = call.accepted_at.unwrap();
        assert_eq!(
            call.response_time().unwrap(),
            accepted - created_at,
            "response time spans both offer cycles"
        );

        // The first lawyer's claim was released by the timeout.
        assert!(!engine.inner.ledger.is_claimed(&near));
    }

    #[tokio::test]
    async fn rejection_moves_to_the_next_candidate() {
        let engine = engine_with(test_config());
        let near = lawyer_north(&engine, "near", 1.0);
        let far = lawyer_north(&engine, "far", 2.0);

        let id = engine.admit_call(new_call()).await.unwrap();
        engine.dispatch_cycle(&id).await;

        engine
            .reject_call(&id, &Actor::Lawyer(near.clone()))
            .await
            .unwrap();

        // reject spawns the re-dispatch; run one explicitly so the test
        // does not depend on scheduler timing.
        let outcome = engine.dispatch_cycle(&id).await;
        let call = engine.get_call(&id).unwrap();
        assert_eq!(call.status, CallStatus::Assigned);
        assert_eq!(call.lawyer_id, Some(far.clone()));
        assert!(
            outcome == DispatchOutcome::Offered(far.clone()) || outcome == DispatchOutcome::Superseded
        );
        assert!(!engine.inner.ledger.is_claimed(&near));
    }

    #[tokio::test]
    async fn no_eligible_lawyers_reports_unmatched_not_escalated() {
        let engine = engine_with(test_config());
        let id = engine.admit_call(new_call()).await.unwrap();

        assert_eq!(engine.dispatch_cycle(&id).await, DispatchOutcome::Unmatched);
        let call = engine.get_call(&id).unwrap();
        assert_eq!(call.status, CallStatus::Pending);
        assert!(!call.escalated);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_escalate() {
        let mut config = test_config();
        config.dispatch.max_attempts = 1;
        let engine = engine_with(config);
        let lawyer = lawyer_north(&engine, "only", 1.0);

        let id = engine.admit_call(new_call()).await.unwrap();
        assert_eq!(
            engine.dispatch_cycle(&id).await,
            DispatchOutcome::Offered(lawyer)
        );

        // Timer fires, the single allowed attempt is spent, and the
        // re-dispatch escalates instead of retrying.
        tokio::time::sleep(Duration::from_millis(400)).await;

        let call = engine.get_call(&id).unwrap();
        assert_eq!(call.status, CallStatus::Pending);
        assert!(call.escalated, "retry exhaustion must be reported");
        assert_eq!(engine.status_counts().escalated, 1);
    }

    #[tokio::test]
    async fn two_calls_cannot_claim_the_same_lawyer() {
        let engine = engine_with(test_config());
        let lawyer = lawyer_north(&engine, "only", 1.0);

        let id_a = engine.admit_call(new_call()).await.unwrap();
        let id_b = engine.admit_call(new_call()).await.unwrap();

        let (a, b) = tokio::join!(engine.dispatch_cycle(&id_a), engine.dispatch_cycle(&id_b));
        let offered = [a, b]
            .iter()
            .filter(|o| matches!(o, DispatchOutcome::Offered(_)))
            .count();
        assert_eq!(offered, 1, "exactly one claim wins");

        let assigned = engine
            .list_calls(Some(CallStatus::Assigned), 10)
            .into_iter()
            .filter(|c| c.lawyer_id == Some(lawyer.clone()))
            .count();
        assert_eq!(assigned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_acceptance_window() {
        let engine = engine_with(test_config());
        let lawyer = lawyer_north(&engine, "only", 1.0);

        let id = engine.admit_call(new_call()).await.unwrap();
        engine.dispatch_cycle(&id).await;

        let call = engine
            .cancel_call(
                &id,
                &Actor::Client(ClientId::from("client-1")),
                Some("found help".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(call.status, CallStatus::Cancelled);
        assert!(call.lawyer_id.is_none());
        assert!(!engine.inner.ledger.is_claimed(&lawyer));

        // A late confirm is reported as stale, not silently ignored.
        let err = engine
            .confirm_call(&id, &Actor::Lawyer(lawyer.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::StaleState(_)));

        // Even after the window would have fired, the call stays cancelled
        // and the lawyer stays free.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(
            engine.get_call(&id).unwrap().status,
            CallStatus::Cancelled
        );
        assert!(!engine.inner.ledger.is_claimed(&lawyer));
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_completed() {
        let engine = engine_with(test_config());
        let lawyer = lawyer_north(&engine, "only", 1.0);

        let id = engine.admit_call(new_call()).await.unwrap();
        engine.dispatch_cycle(&id).await;
        engine
            .confirm_call(&id, &Actor::Lawyer(lawyer.clone()))
            .await
            .unwrap();
        let call = engine.complete_call(&id).await.unwrap();

        assert_eq!(call.status, CallStatus::Completed);
        assert_eq!(call.lawyer_id, Some(lawyer.clone()));
        assert!(call.completed_at.is_some());
        assert!(!engine.inner.ledger.is_claimed(&lawyer));

        // Second confirm after completion: stale, accepted_at untouched.
        let before = call.accepted_at;
        let err = engine
            .confirm_call(&id, &Actor::Lawyer(lawyer))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::StaleState(_)));
        assert_eq!(engine.get_call(&id).unwrap().accepted_at, before);
    }

    #[tokio::test]
    async fn capacity_limit_rejects_new_calls() {
        let mut config = test_config();
        config.general.max_active_calls = 1;
        let engine = engine_with(config);

        engine.admit_call(new_call()).await.unwrap();
        let err = engine.admit_call(new_call()).await.unwrap_err();
        assert!(matches!(err, DispatchError::ResourceUnavailable(_)));
    }
}
