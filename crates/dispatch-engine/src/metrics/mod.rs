//! # Metrics Aggregator
//!
//! Derives wait-time, response-time, and completion-rate statistics from
//! call transitions. The state machine reports every transition through a
//! channel; a collector task folds events into shared state, so aggregates
//! are eventually consistent with dispatch — a stats reader may observe a
//! transition a few hundred milliseconds late, never a torn one.
//!
//! The aggregator doubles as the matcher's [`ResponseHistory`] source:
//! per-lawyer confirmed response times feed the historical-median
//! tie-break.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::MetricsConfig;
use crate::dispatch::{CallStatus, EmergencyCall};
use crate::matcher::ResponseHistory;
use crate::types::{CallId, LawyerId};

/// Snapshot served by the stats endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCallStats {
    /// Calls admitted since startup.
    pub total_calls: u64,
    pub pending_calls: usize,
    pub assigned_calls: usize,
    pub active_calls: usize,
    /// Pending calls flagged for operator intervention.
    pub escalated_calls: usize,
    pub completed_today: u64,
    pub cancelled_today: u64,
    /// completed / (completed + cancelled) for the current UTC day.
    pub completion_rate: f64,
    /// Mean confirmed response time over the sliding window, seconds.
    pub average_response_seconds: Option<f64>,
    /// Mean client wait over the sliding window (accepted or abandoned),
    /// seconds.
    pub average_wait_seconds: Option<f64>,
    pub generated_at: DateTime<Utc>,
}

/// One observed transition, self-contained so the collector never has to
/// read live call state.
#[derive(Debug)]
pub enum MetricEvent {
    CallCreated {
        call_id: CallId,
        at: DateTime<Utc>,
    },
    Transition {
        call_id: CallId,
        lawyer_id: Option<LawyerId>,
        from: CallStatus,
        to: CallStatus,
        at: DateTime<Utc>,
        /// `accepted_at - created_at`, present on `assigned -> active`.
        response_seconds: Option<f64>,
        /// Time waited until acceptance or abandonment.
        wait_seconds: Option<f64>,
        /// Whether the call carried the escalated flag when it moved.
        was_escalated: bool,
    },
    Escalated {
        call_id: CallId,
        at: DateTime<Utc>,
    },
    /// Marker: the collector acknowledges once everything queued before
    /// it has been folded.
    #[doc(hidden)]
    Flush(tokio::sync::oneshot::Sender<()>),
}

#[derive(Default)]
struct MetricsState {
    total_calls: u64,
    pending: usize,
    assigned: usize,
    active: usize,
    escalated: usize,
    day: Option<NaiveDate>,
    completed_today: u64,
    cancelled_today: u64,
    /// (observed_at, seconds) samples, pruned to the window on read.
    response_samples: VecDeque<(DateTime<Utc>, f64)>,
    wait_samples: VecDeque<(DateTime<Utc>, f64)>,
    per_lawyer: HashMap<LawyerId, VecDeque<f64>>,
}

/// Aggregates transitions into the stats snapshot.
pub struct MetricsAggregator {
    state: Arc<RwLock<MetricsState>>,
    tx: mpsc::UnboundedSender<MetricEvent>,
    config: MetricsConfig,
}

impl MetricsAggregator {
    /// Create the aggregator and spawn its collector task.
    pub fn new(config: MetricsConfig) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<MetricEvent>();
        let state = Arc::new(RwLock::new(MetricsState::default()));

        let fold_state = Arc::clone(&state);
        let fold_config = config.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let mut state = fold_state.write().expect("metrics state poisoned");
                fold(&mut state, event, &fold_config);
            }
            debug!("metrics collector stopped");
        });

        Arc::new(Self { state, tx, config })
    }

    /// Report an admitted call. Non-blocking.
    pub fn record_created(&self, call: &EmergencyCall) {
        let _ = self.tx.send(MetricEvent::CallCreated {
            call_id: call.id.clone(),
            at: call.created_at,
        });
    }

    /// Report a transition the state machine just performed. Non-blocking;
    /// the snapshot catches up within channel latency.
    pub fn record_transition(
        &self,
        call: &EmergencyCall,
        from: CallStatus,
        to: CallStatus,
        at: DateTime<Utc>,
    ) {
        let response_seconds = if to == CallStatus::Active {
            call.response_time()
                .map(|d| d.num_milliseconds() as f64 / 1000.0)
        } else {
            None
        };
        let wait_seconds = match to {
            CallStatus::Active => response_seconds,
            CallStatus::Cancelled if !from.is_terminal() && from != CallStatus::Active => {
                Some((at - call.created_at).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        };
        let _ = self.tx.send(MetricEvent::Transition {
            call_id: call.id.clone(),
            lawyer_id: call.lawyer_id.clone(),
            from,
            to,
            at,
            response_seconds,
            wait_seconds,
            was_escalated: call.escalated,
        });
    }

    /// Report that a pending call entered the escalated sub-state.
    pub fn record_escalation(&self, call: &EmergencyCall) {
        let _ = self.tx.send(MetricEvent::Escalated {
            call_id: call.id.clone(),
            at: call.updated_at,
        });
    }

    /// Pure read of the current aggregates.
    pub fn snapshot(&self, now: DateTime<Utc>) -> EmergencyCallStats {
        let state = self.state.read().expect("metrics state poisoned");
        let window = chrono::Duration::from_std(self.config.response_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let cutoff = now - window;

        let same_day = state.day == Some(now.date_naive());
        let completed_today = if same_day { state.completed_today } else { 0 };
        let cancelled_today = if same_day { state.cancelled_today } else { 0 };
        let resolved = completed_today + cancelled_today;
        let completion_rate = if resolved > 0 {
            completed_today as f64 / resolved as f64
        } else {
            0.0
        };

        EmergencyCallStats {
            total_calls: state.total_calls,
            pending_calls: state.pending,
            assigned_calls: state.assigned,
            active_calls: state.active,
            escalated_calls: state.escalated,
            completed_today,
            cancelled_today,
            completion_rate,
            average_response_seconds: windowed_mean(&state.response_samples, cutoff),
            average_wait_seconds: windowed_mean(&state.wait_samples, cutoff),
            generated_at: now,
        }
    }

    /// Block until every event sent before this call has been folded.
    /// Aggregation is otherwise eventually consistent; tests use this to
    /// observe a settled snapshot.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        if self.tx.send(MetricEvent::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

impl ResponseHistory for MetricsAggregator {
    fn median_response_seconds(&self, lawyer_id: &LawyerId) -> Option<f64> {
        let state = self.state.read().expect("metrics state poisoned");
        let samples = state.per_lawyer.get(lawyer_id)?;
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }
}

fn windowed_mean(samples: &VecDeque<(DateTime<Utc>, f64)>, cutoff: DateTime<Utc>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (at, value) in samples.iter() {
        if *at >= cutoff {
            sum += value;
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn roll_day(state: &mut MetricsState, at: DateTime<Utc>) {
    let date = at.date_naive();
    if state.day != Some(date) {
        state.day = Some(date);
        state.completed_today = 0;
        state.cancelled_today = 0;
    }
}

fn gauge_sub(gauge: &mut usize) {
    *gauge = gauge.saturating_sub(1);
}

fn fold(state: &mut MetricsState, event: MetricEvent, config: &MetricsConfig) {
    match event {
        MetricEvent::CallCreated { at, .. } => {
            roll_day(state, at);
            state.total_calls += 1;
            state.pending += 1;
        }
        MetricEvent::Escalated { .. } => {
            state.escalated += 1;
        }
        MetricEvent::Flush(ack) => {
            let _ = ack.send(());
        }
        MetricEvent::Transition {
            lawyer_id,
            from,
            to,
            at,
            response_seconds,
            wait_seconds,
            was_escalated,
            ..
        } => {
            roll_day(state, at);
            match from {
                CallStatus::Pending => gauge_sub(&mut state.pending),
                CallStatus::Assigned => gauge_sub(&mut state.assigned),
                CallStatus::Active => gauge_sub(&mut state.active),
                _ => {}
            }
            match to {
                CallStatus::Pending => state.pending += 1,
                CallStatus::Assigned => state.assigned += 1,
                CallStatus::Active => state.active += 1,
                CallStatus::Completed => state.completed_today += 1,
                CallStatus::Cancelled => state.cancelled_today += 1,
            }
            if to.is_terminal() && was_escalated {
                gauge_sub(&mut state.escalated);
            }

            if let Some(secs) = response_seconds {
                state.response_samples.push_back((at, secs));
                if state.response_samples.len() > 4096 {
                    state.response_samples.pop_front();
                }
                if let Some(lawyer) = lawyer_id {
                    let history = state.per_lawyer.entry(lawyer).or_default();
                    history.push_back(secs);
                    while history.len() > config.history_per_lawyer {
                        history.pop_front();
                    }
                }
            }
            if let Some(secs) = wait_seconds {
                state.wait_samples.push_back((at, secs));
                if state.wait_samples.len() > 4096 {
                    state.wait_samples.pop_front();
                }
            }
        }
    }
}
