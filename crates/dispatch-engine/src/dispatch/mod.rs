//! # Dispatch State Machine
//!
//! Owns the emergency call lifecycle (`pending → assigned → active →
//! completed`, with `cancelled` reachable from every non-terminal state),
//! enforces lawyer-claim exclusivity, and drives re-dispatch on rejection
//! and acceptance-window timeout.
//!
//! - [`types`]: call, status, and attempt records
//! - [`ledger`]: the linearizable claim/release primitive
//! - [`engine`]: dispatch cycles, timers, and the public operations

pub mod engine;
pub mod ledger;
pub mod types;

pub use engine::{DispatchEngine, DispatchOutcome};
pub use ledger::{ClaimLedger, StatusCounts};
pub use types::{
    AttemptOutcome, CallStatus, Cancellation, DispatchAttempt, EmergencyCall,
};
