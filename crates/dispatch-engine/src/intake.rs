//! # Call Intake
//!
//! Validates and admits a new emergency request, then triggers the first
//! dispatch cycle. The call id is returned synchronously; the dispatch
//! outcome is observed by polling call status (or by the notification
//! collaborator, which is outside the core).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatch::{DispatchEngine, EmergencyCall};
use crate::error::{DispatchError, Result};
use crate::types::{CallId, ClientId, GeoPoint};

/// A new emergency request, as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCallRequest {
    pub client_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Intake front of the dispatch engine.
#[derive(Clone)]
pub struct CallIntake {
    engine: DispatchEngine,
}

impl CallIntake {
    pub fn new(engine: DispatchEngine) -> Self {
        Self { engine }
    }

    /// Validate, persist a `pending` call, and kick off dispatch.
    ///
    /// Validation failures are rejected before anything is persisted.
    pub async fn create_call(&self, request: NewCallRequest) -> Result<CallId> {
        let client_id = request.client_id.trim();
        if client_id.is_empty() {
            return Err(DispatchError::validation("clientId is required"));
        }
        let address = request.address.trim();
        if address.is_empty() {
            return Err(DispatchError::validation("address is required"));
        }
        let location = GeoPoint::new(request.latitude, request.longitude)?;
        let notes = request
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let call = EmergencyCall::new(
            ClientId::from(client_id),
            location,
            address.to_string(),
            request.is_urgent,
            notes,
            Utc::now(),
        );
        let call_id = self.engine.admit_call(call).await?;

        debug!("intake: call {} admitted, starting first dispatch", call_id);
        self.engine.spawn_dispatch(call_id.clone());
        Ok(call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::CallStatus;
    use crate::metrics::MetricsAggregator;
    use crate::notify::LogNotifier;
    use crate::presence::PresenceRegistry;
    use std::sync::Arc;

    fn intake() -> (CallIntake, DispatchEngine) {
        let config = DispatchConfig::default();
        let registry = Arc::new(PresenceRegistry::new());
        let metrics = MetricsAggregator::new(config.metrics.clone());
        let engine =
            DispatchEngine::new(config, registry, metrics, Arc::new(LogNotifier), None);
        (CallIntake::new(engine.clone()), engine)
    }

    fn request() -> NewCallRequest {
        NewCallRequest {
            client_id: "client-1".to_string(),
            latitude: 55.751,
            longitude: 37.618,
            address: "Tverskaya 1".to_string(),
            is_urgent: true,
            notes: Some("  detained  ".to_string()),
        }
    }

    #[tokio::test]
    async fn creates_a_pending_call() {
        let (intake, engine) = intake();
        let id = intake.create_call(request()).await.unwrap();

        let call = engine.get_call(&id).unwrap();
        assert_eq!(call.status, CallStatus::Pending);
        assert!(call.is_urgent);
        assert_eq!(call.notes.as_deref(), Some("detained"));
    }

    #[tokio::test]
    async fn rejects_out_of_range_coordinates() {
        let (intake, _engine) = intake();
        let mut bad = request();
        bad.latitude = 123.0;
        assert!(matches!(
            intake.create_call(bad).await.unwrap_err(),
            DispatchError::Validation(_)
        ));

        let mut bad = request();
        bad.longitude = -200.0;
        assert!(intake.create_call(bad).await.is_err());
    }

    #[tokio::test]
    async fn rejects_missing_required_fields() {
        let (intake, engine) = intake();
        let mut bad = request();
        bad.client_id = "   ".to_string();
        assert!(matches!(
            intake.create_call(bad).await.unwrap_err(),
            DispatchError::Validation(_)
        ));

        let mut bad = request();
        bad.address = String::new();
        assert!(intake.create_call(bad).await.is_err());

        // Nothing was persisted for the rejected requests.
        assert!(engine.list_calls(None, 10).is_empty());
    }
}
