//! Charger driver contract (§6). Grounded on the teacher's
//! `src/domain/ev_charger.rs` capability-probe/`SimulatedEvCharger` shape,
//! restructured so vehicle-reported signals live on the `Vehicle` trait
//! instead of on the charger.

use crate::domain::ChargeStatus;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[async_trait]
pub trait Charger: Send + Sync {
    async fn status(&self) -> anyhow::Result<ChargeStatus>;
    async fn enabled(&self) -> anyhow::Result<bool>;
    async fn enable(&self, on: bool) -> anyhow::Result<()>;
    async fn set_max_current(&self, amps: f64) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PhaseSwitcher: Send + Sync {
    /// 1 or 3.
    async fn set_phases(&self, phases: u8) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ChargerMeter: Send + Sync {
    async fn current_power_w(&self) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait ChargerMeterEnergy: Send + Sync {
    async fn total_energy_wh(&self) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait PhaseCurrents: Send + Sync {
    async fn currents_a(&self) -> anyhow::Result<(f64, f64, f64)>;
}

#[async_trait]
pub trait Resurrector: Send + Sync {
    async fn wake_up(&self) -> anyhow::Result<()>;
}

/// A charger's required trait object plus the capabilities it was
/// constructed with — discovered once, never probed at runtime.
#[derive(Clone)]
pub struct ChargerHandle {
    pub charger: Arc<dyn Charger>,
    pub phase_switcher: Option<Arc<dyn PhaseSwitcher>>,
    pub meter: Option<Arc<dyn ChargerMeter>>,
    pub meter_energy: Option<Arc<dyn ChargerMeterEnergy>>,
    pub phase_currents: Option<Arc<dyn PhaseCurrents>>,
    pub resurrector: Option<Arc<dyn Resurrector>>,
}

struct SimulatedState {
    status: ChargeStatus,
    enabled: bool,
    max_current_a: f64,
    phases: u8,
    power_w: f64,
    energy_wh: f64,
}

/// A simulated charger for tests and the default runtime mode, mirroring
/// the teacher's `SimulatedEvCharger`.
pub struct SimulatedCharger {
    state: Mutex<SimulatedState>,
    voltage_v: f64,
}

impl SimulatedCharger {
    pub fn new(voltage_v: f64) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                status: ChargeStatus::Disconnected,
                enabled: false,
                max_current_a: 0.0,
                phases: 3,
                power_w: 0.0,
                energy_wh: 0.0,
            }),
            voltage_v,
        }
    }

    pub fn connect(&self) {
        let mut s = self.state.lock();
        if s.status == ChargeStatus::Disconnected {
            s.status = ChargeStatus::Connected;
        }
    }

    pub fn disconnect(&self) {
        let mut s = self.state.lock();
        s.status = ChargeStatus::Disconnected;
        s.enabled = false;
        s.power_w = 0.0;
    }

    /// Advance the simulated charge: if enabled and connected, draw
    /// `max_current_a * phases * voltage` and accumulate energy over `dt`.
    pub fn tick(&self, dt: chrono::Duration) {
        let mut s = self.state.lock();
        if s.enabled && s.status != ChargeStatus::Disconnected && s.max_current_a > 0.0 {
            s.status = ChargeStatus::Charging;
            s.power_w = s.max_current_a * s.phases as f64 * self.voltage_v;
            let hours = dt.num_milliseconds() as f64 / 3_600_000.0;
            s.energy_wh += s.power_w * hours;
        } else {
            s.power_w = 0.0;
            if s.status == ChargeStatus::Charging {
                s.status = ChargeStatus::Connected;
            }
        }
    }
}

#[async_trait]
impl Charger for SimulatedCharger {
    async fn status(&self) -> anyhow::Result<ChargeStatus> {
        Ok(self.state.lock().status)
    }

    async fn enabled(&self) -> anyhow::Result<bool> {
        Ok(self.state.lock().enabled)
    }

    async fn enable(&self, on: bool) -> anyhow::Result<()> {
        let mut s = self.state.lock();
        s.enabled = on;
        if !on {
            s.power_w = 0.0;
            if s.status == ChargeStatus::Charging {
                s.status = ChargeStatus::Connected;
            }
        }
        Ok(())
    }

    async fn set_max_current(&self, amps: f64) -> anyhow::Result<()> {
        self.state.lock().max_current_a = amps;
        Ok(())
    }
}

#[async_trait]
impl PhaseSwitcher for SimulatedCharger {
    async fn set_phases(&self, phases: u8) -> anyhow::Result<()> {
        self.state.lock().phases = phases;
        Ok(())
    }
}

#[async_trait]
impl ChargerMeter for SimulatedCharger {
    async fn current_power_w(&self) -> anyhow::Result<f64> {
        Ok(self.state.lock().power_w)
    }
}

#[async_trait]
impl ChargerMeterEnergy for SimulatedCharger {
    async fn total_energy_wh(&self) -> anyhow::Result<f64> {
        Ok(self.state.lock().energy_wh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enabling_and_ticking_accumulates_energy() {
        let charger = SimulatedCharger::new(230.0);
        charger.connect();
        charger.set_max_current(16.0).await.unwrap();
        charger.enable(true).await.unwrap();
        charger.tick(chrono::Duration::hours(1));

        assert_eq!(charger.status().await.unwrap(), ChargeStatus::Charging);
        let power = charger.current_power_w().await.unwrap();
        assert!((power - 16.0 * 3.0 * 230.0).abs() < 1e-6);
        let energy = charger.total_energy_wh().await.unwrap();
        assert!((energy - power).abs() < 1e-6);
    }

    #[tokio::test]
    async fn disabling_stops_power_draw() {
        let charger = SimulatedCharger::new(230.0);
        charger.connect();
        charger.set_max_current(16.0).await.unwrap();
        charger.enable(true).await.unwrap();
        charger.tick(chrono::Duration::minutes(10));
        charger.enable(false).await.unwrap();
        assert_eq!(charger.current_power_w().await.unwrap(), 0.0);
    }
}
