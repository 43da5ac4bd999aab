//! # Juricall Dispatch Engine
//!
//! The emergency dispatch core of the Juricall legal-consultation
//! marketplace: routing a distressed client's request for legal help to
//! the nearest available, qualified lawyer, under time pressure, with
//! conflicting concurrent demand for the same lawyers.
//!
//! ## Overview
//!
//! The engine is built from five cooperating components:
//!
//! - **Presence Registry**: each lawyer's location, availability toggle,
//!   and ping freshness — the ground truth the matcher queries
//! - **Geospatial Matcher**: ranks eligible lawyers by great-circle
//!   distance with responsiveness and rating tie-breaks, expanding the
//!   search radius geometrically up to a ceiling
//! - **Dispatch State Machine**: owns the call lifecycle, enforces
//!   one-claim-per-lawyer exclusivity through an atomic claim ledger, and
//!   drives re-dispatch on rejection or acceptance-window timeout
//! - **Call Intake**: validates and admits new requests, then triggers
//!   the first dispatch cycle
//! - **Metrics Aggregator**: wait/response/completion statistics derived
//!   from observed transitions, eventually consistent with dispatch
//!
//! ## Architecture
//!
//! ```text
//!      ┌──────────────┐          ┌──────────────┐
//!      │  REST API    │          │   Intake     │
//!      └──────┬───────┘          └──────┬───────┘
//!             │                         │
//!             └──────────┬──────────────┘
//!                        │
//!              ┌─────────────────┐
//!              │ DispatchEngine  │──────────┐
//!              └─────────┬───────┘          │
//!                        │                  │
//!         ┌──────────────┼──────────────┐   │
//!         │              │              │   │
//! ┌───────────────┐ ┌──────────┐ ┌──────────────┐
//! │ Claim Ledger  │ │ Matcher  │ │   Metrics    │
//! └───────────────┘ └────┬─────┘ └──────────────┘
//!                        │
//!               ┌────────────────┐
//!               │ Presence       │
//!               │ Registry       │
//!               └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use juricall_dispatch_engine::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let mut config = DispatchConfig::default();
//! config.dispatch.max_attempts = 3;
//!
//! let server = DispatchServerBuilder::new()
//!     .with_config(config)
//!     .with_database_path("juricall.db")
//!     .build()
//!     .await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency model
//!
//! The shared mutable resource is the pair (`status`/`lawyer_id`, lawyer
//! claim). All mutation of that pair goes through the claim ledger's
//! single atomic conditional update; acceptance-window timers re-check
//! attempt identity under the same guard before acting, so a late timer
//! can never revoke a confirmed offer. Notifications and persistence are
//! observers, never authorities.

// Core modules
pub mod config;
pub mod error;
pub mod types;

// Dispatch functionality modules
pub mod dispatch;
pub mod intake;
pub mod matcher;
pub mod metrics;
pub mod presence;

// External interfaces
pub mod api;
pub mod notify;
pub mod server;

// Database integration
pub mod database;

// Re-exports for convenience
pub use config::DispatchConfig;
pub use dispatch::DispatchEngine;
pub use error::{DispatchError, Result};
pub use server::{DispatchServer, DispatchServerBuilder};

/// Prelude module for convenient imports
///
/// ```
/// use juricall_dispatch_engine::prelude::*;
/// ```
pub mod prelude {
    //! Commonly used types for dispatch applications.

    pub use crate::config::{
        DatabaseConfig, DispatchConfig, DispatchPolicyConfig, GeneralConfig, MatcherConfig,
        MetricsConfig, PresenceConfig,
    };
    pub use crate::database::DatabaseManager;
    pub use crate::dispatch::{
        AttemptOutcome, CallStatus, Cancellation, DispatchAttempt, DispatchEngine,
        DispatchOutcome, EmergencyCall,
    };
    pub use crate::error::{DispatchError, Result};
    pub use crate::intake::{CallIntake, NewCallRequest};
    pub use crate::matcher::{Candidate, MatcherEngine, ResponseHistory};
    pub use crate::metrics::{EmergencyCallStats, MetricsAggregator};
    pub use crate::notify::{LogNotifier, NotificationService};
    pub use crate::presence::{AssignmentProbe, LawyerPresence, PresenceRegistry};
    pub use crate::server::{DispatchServer, DispatchServerBuilder};
    pub use crate::types::{Actor, CallId, ClientId, GeoPoint, LawyerId};

    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
