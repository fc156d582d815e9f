//! Vehicle driver contract (§6). Vehicles are optional: a loadpoint with no
//! identified vehicle falls back to charger-reported status alone.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[async_trait]
pub trait Vehicle: Send + Sync {
    fn title(&self) -> &str;
    async fn soc_percent(&self) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait VehicleRange: Send + Sync {
    async fn range_km(&self) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait VehicleOdometer: Send + Sync {
    async fn odometer_km(&self) -> anyhow::Result<f64>;
}

#[async_trait]
pub trait VehicleFinishTimer: Send + Sync {
    /// A vehicle-reported "charge complete by" hint, distinct from the
    /// user-configured loadpoint target time.
    async fn finish_time(&self) -> anyhow::Result<Option<chrono::DateTime<chrono::Utc>>>;
}

/// Vehicle-reported connection state, used during detection (§4.5 "Vehicle
/// detection") to pick which unowned vehicle is the one that just plugged
/// in, independent of the charger's own status report.
#[async_trait]
pub trait VehicleChargeState: Send + Sync {
    async fn connected(&self) -> anyhow::Result<bool>;
}

/// A vehicle's required trait object plus the optional capabilities it was
/// constructed with, mirroring `ChargerHandle`'s capability-discovery shape.
#[derive(Clone)]
pub struct VehicleHandle {
    pub vehicle: Arc<dyn Vehicle>,
    pub range: Option<Arc<dyn VehicleRange>>,
    pub odometer: Option<Arc<dyn VehicleOdometer>>,
    pub finish_timer: Option<Arc<dyn VehicleFinishTimer>>,
    pub charge_state: Option<Arc<dyn VehicleChargeState>>,
    pub resurrector: Option<Arc<dyn super::Resurrector>>,
}

pub struct SimulatedVehicle {
    title: String,
    soc_percent: Mutex<f64>,
    odometer_km: Mutex<f64>,
    connected: Mutex<bool>,
    wake_count: std::sync::atomic::AtomicU32,
}

impl SimulatedVehicle {
    pub fn new(title: impl Into<String>, initial_soc_percent: f64) -> Arc<Self> {
        Arc::new(Self {
            title: title.into(),
            soc_percent: Mutex::new(initial_soc_percent),
            odometer_km: Mutex::new(0.0),
            connected: Mutex::new(false),
            wake_count: std::sync::atomic::AtomicU32::new(0),
        })
    }

    pub fn set_soc(&self, percent: f64) {
        *self.soc_percent.lock() = percent.clamp(0.0, 100.0);
    }

    pub fn set_connected(&self, connected: bool) {
        *self.connected.lock() = connected;
    }

    pub fn wake_count(&self) -> u32 {
        self.wake_count.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Vehicle for SimulatedVehicle {
    fn title(&self) -> &str {
        &self.title
    }

    async fn soc_percent(&self) -> anyhow::Result<f64> {
        Ok(*self.soc_percent.lock())
    }
}

#[async_trait]
impl VehicleOdometer for SimulatedVehicle {
    async fn odometer_km(&self) -> anyhow::Result<f64> {
        Ok(*self.odometer_km.lock())
    }
}

#[async_trait]
impl VehicleChargeState for SimulatedVehicle {
    async fn connected(&self) -> anyhow::Result<bool> {
        Ok(*self.connected.lock())
    }
}

#[async_trait]
impl super::Resurrector for SimulatedVehicle {
    async fn wake_up(&self) -> anyhow::Result<()> {
        self.wake_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_vehicle_reports_soc() {
        let vehicle = SimulatedVehicle::new("Test EV", 42.0);
        assert_eq!(vehicle.title(), "Test EV");
        assert_eq!(vehicle.soc_percent().await.unwrap(), 42.0);
    }
}
