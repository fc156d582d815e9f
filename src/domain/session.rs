//! Session data model (§3 Session, §6 Persisted state).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Charged energy below this threshold is discarded on close (§4.5).
pub const MIN_SESSION_ENERGY_WH: f64 = 50.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub loadpoint: String,
    pub created: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub charged_kwh: f64,
    pub self_kwh: f64,
    pub vehicle: Option<String>,
    pub odometer_km: Option<f64>,
}

impl Session {
    pub fn open(loadpoint: impl Into<String>, created: DateTime<Utc>, vehicle: Option<String>, odometer_km: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loadpoint: loadpoint.into(),
            created,
            finished: None,
            charged_kwh: 0.0,
            self_kwh: 0.0,
            vehicle,
            odometer_km,
        }
    }

    pub fn close(&mut self, finished: DateTime<Utc>) {
        self.finished = Some(finished);
    }

    pub fn is_negligible(&self) -> bool {
        self.charged_kwh * 1000.0 < MIN_SESSION_ENERGY_WH
    }
}
