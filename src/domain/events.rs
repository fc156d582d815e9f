//! Typed observability channel (§9 Observability channel). Replaces the
//! original source's string-keyed `publish(key, val)` calls — see
//! `examples/original_source/core/const.go` for the full list of keys this
//! enum covers — with a closed event union. Every component writes
//! `PublishedEvent`s to a channel; the HTTP surface and log forwarders
//! subscribe.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PublishedEvent {
    // Loadpoint phase state
    PhasesConfigured { loadpoint: String, phases: u8 },
    PhasesEnabled { loadpoint: String, phases: u8 },
    PhasesActive { loadpoint: String, phases: u8 },

    // Vehicle detection and signals
    VehicleDetectionActive { loadpoint: String, active: bool },
    VehicleRange { loadpoint: String, km: f64 },
    VehicleOdometer { loadpoint: String, km: f64 },
    VehicleSoc { loadpoint: String, percent: f64 },
    VehicleTargetSoc { loadpoint: String, percent: f64 },

    // Planner / deadline charging
    MinSoc { loadpoint: String, percent: f64 },
    TargetSoc { loadpoint: String, percent: f64 },
    TargetTime { loadpoint: String, at: DateTime<Utc> },
    TargetTimeActive { loadpoint: String, active: bool },
    TargetTimeProjectedStart { loadpoint: String, at: DateTime<Utc> },

    // Site-level
    HomePower { watts: f64 },
    GridPower { watts: f64 },
    PvPower { watts: f64 },
    BatteryPower { watts: f64 },
    BatterySoc { percent: f64 },

    // Safety / health
    Safety(SafetyEvent),
    HealthChanged { healthy: bool },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum SafetyEvent {
    ChargerConsecutiveFailures { loadpoint: String, count: u32 },
    WatchdogStalled { since: DateTime<Utc> },
}
