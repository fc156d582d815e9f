//! Site meter drivers (§6) — grid, PV, and battery meters. Battery meters
//! additionally report state of charge and may support a charge/discharge
//! priority buffer hint.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Meter: Send + Sync {
    /// Signed power in watts: positive is import/consumption, negative is
    /// export/production, matching the teacher's and the original source's
    /// sign convention for grid meters.
    async fn power_w(&self) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait BatteryMeter: Meter {
    async fn soc_percent(&self) -> anyhow::Result<f64>;
}

/// Optional capability alongside a `BatteryMeter`, used to weight a
/// multi-battery SoC average by capacity (§4.6 step 2). Batteries that don't
/// report it fall back to equal weighting.
#[async_trait]
pub trait BatteryCapacity: Send + Sync {
    async fn capacity_kwh(&self) -> anyhow::Result<f64>;
}

/// A configured battery meter plus its optional capacity capability,
/// mirroring `ChargerHandle`'s capability-discovery shape.
#[derive(Clone)]
pub struct BatteryHandle {
    pub meter: Arc<dyn BatteryMeter>,
    pub capacity: Option<Arc<dyn BatteryCapacity>>,
}

#[async_trait]
pub trait MeterEnergy: Send + Sync {
    async fn total_energy_wh(&self) -> anyhow::Result<f64>;
}

pub struct SimulatedMeter {
    power_w: Mutex<f64>,
}

impl SimulatedMeter {
    pub fn new(initial_w: f64) -> Arc<Self> {
        Arc::new(Self {
            power_w: Mutex::new(initial_w),
        })
    }

    pub fn set(&self, watts: f64) {
        *self.power_w.lock() = watts;
    }
}

#[async_trait]
impl Meter for SimulatedMeter {
    async fn power_w(&self) -> anyhow::Result<f64> {
        Ok(*self.power_w.lock())
    }
}

pub struct SimulatedBatteryMeter {
    power_w: Mutex<f64>,
    soc_percent: Mutex<f64>,
    capacity_kwh: f64,
}

impl SimulatedBatteryMeter {
    pub fn new(initial_soc_percent: f64) -> Arc<Self> {
        Self::with_capacity(initial_soc_percent, 0.0)
    }

    pub fn with_capacity(initial_soc_percent: f64, capacity_kwh: f64) -> Arc<Self> {
        Arc::new(Self {
            power_w: Mutex::new(0.0),
            soc_percent: Mutex::new(initial_soc_percent),
            capacity_kwh,
        })
    }

    pub fn set_power(&self, watts: f64) {
        *self.power_w.lock() = watts;
    }

    pub fn set_soc(&self, percent: f64) {
        *self.soc_percent.lock() = percent.clamp(0.0, 100.0);
    }
}

#[async_trait]
impl Meter for SimulatedBatteryMeter {
    async fn power_w(&self) -> anyhow::Result<f64> {
        Ok(*self.power_w.lock())
    }
}

#[async_trait]
impl BatteryMeter for SimulatedBatteryMeter {
    async fn soc_percent(&self) -> anyhow::Result<f64> {
        Ok(*self.soc_percent.lock())
    }
}

#[async_trait]
impl BatteryCapacity for SimulatedBatteryMeter {
    async fn capacity_kwh(&self) -> anyhow::Result<f64> {
        Ok(self.capacity_kwh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_meter_reports_what_it_was_set_to() {
        let meter = SimulatedMeter::new(-1500.0);
        assert_eq!(meter.power_w().await.unwrap(), -1500.0);
        meter.set(200.0);
        assert_eq!(meter.power_w().await.unwrap(), 200.0);
    }

    #[tokio::test]
    async fn simulated_battery_meter_clamps_soc() {
        let battery = SimulatedBatteryMeter::new(50.0);
        battery.set_soc(150.0);
        assert_eq!(battery.soc_percent().await.unwrap(), 100.0);
        battery.set_soc(-10.0);
        assert_eq!(battery.soc_percent().await.unwrap(), 0.0);
    }
}
