//! Loadpoint state model (§3 Loadpoint state).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    Off,
    Now,
    MinPv,
    Pv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChargeStatus {
    /// A: no vehicle connected.
    Disconnected,
    /// B: vehicle connected, not charging.
    Connected,
    /// C: vehicle connected and charging.
    Charging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteDemand {
    Normal,
    Soft,
    Hard,
}

/// Phase count a loadpoint may be configured or operating at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phases {
    /// Automatic, only valid on phase-switching chargers.
    Auto,
    One,
    Three,
}

impl Phases {
    pub fn from_configured(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::Auto),
            1 => Some(Self::One),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    pub fn as_count(&self) -> u8 {
        match self {
            Self::Auto => 0,
            Self::One => 1,
            Self::Three => 3,
        }
    }
}

/// Persistent, user-settable fields — serialized by a per-loadpoint mutex
/// per §5 Shared state, held only for field read/write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadpointSettings {
    pub mode: Mode,
    pub min_current_a: f64,
    pub max_current_a: f64,
    pub configured_phases: Phases,
    pub target_soc_percent: f64,
    pub min_soc_percent: f64,
    pub target_energy_wh: f64,
    pub target_time: Option<DateTime<Utc>>,
    pub remote_demand: RemoteDemand,
}

impl Default for LoadpointSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Off,
            min_current_a: 6.0,
            max_current_a: 16.0,
            configured_phases: Phases::Three,
            target_soc_percent: 100.0,
            min_soc_percent: 0.0,
            target_energy_wh: 0.0,
            target_time: None,
            remote_demand: RemoteDemand::Normal,
        }
    }
}

/// Which way a hysteresis timer is counting: toward turning something on,
/// or toward turning it off. A single timer field serves both directions so
/// that a condition reversal before the delay elapses simply clears it,
/// rather than requiring two independently-armed timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDirection {
    Enable,
    Disable,
}

/// Transient, tick-to-tick state — owned exclusively by the site loop task.
#[derive(Debug, Clone)]
pub struct LoadpointTransient {
    pub status: ChargeStatus,
    pub current_phases: u8,
    pub charge_power_w: f64,
    pub charged_energy_wh: f64,
    pub pv_timer_since: Option<DateTime<Utc>>,
    pub pv_timer_direction: Option<TimerDirection>,
    pub phase_timer_since: Option<DateTime<Utc>>,
    pub phase_timer_direction: Option<TimerDirection>,
    pub consecutive_failures: u32,
    pub vehicle_id: Option<crate::coordinator::VehicleId>,
    pub vehicle_soc_percent: Option<f64>,
    /// Set once consecutive charger failures exceed the safety threshold
    /// (§4.5 Failure semantics); the loadpoint is forced to a safe idle
    /// state until the charger recovers.
    pub safe_mode: bool,
}

impl Default for LoadpointTransient {
    fn default() -> Self {
        Self {
            status: ChargeStatus::Disconnected,
            current_phases: 3,
            charge_power_w: 0.0,
            charged_energy_wh: 0.0,
            pv_timer_since: None,
            pv_timer_direction: None,
            phase_timer_since: None,
            phase_timer_direction: None,
            consecutive_failures: 0,
            vehicle_id: None,
            vehicle_soc_percent: None,
            safe_mode: false,
        }
    }
}
