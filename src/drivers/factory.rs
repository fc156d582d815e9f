//! Device construction (§6, §9 Capability discovery). Mirrors the teacher's
//! `hardware/factory.rs` mode-dispatch shape, trimmed to the `sim` backend
//! this crate ships — optional capabilities are wired up once here and
//! never re-probed at runtime.

use super::charger::{ChargerHandle, SimulatedCharger};
use super::meter::{BatteryHandle, BatteryMeter, Meter, SimulatedBatteryMeter, SimulatedMeter};
use super::vehicle::{SimulatedVehicle, Vehicle, VehicleHandle};
use std::sync::Arc;

pub struct DeviceFactory;

impl DeviceFactory {
    /// Builds a charger handle with every optional capability the
    /// `SimulatedCharger` implements populated — a real hardware backend
    /// would instead populate only the capabilities that backend's driver
    /// actually supports.
    pub fn charger(voltage_v: f64) -> ChargerHandle {
        let charger = Arc::new(SimulatedCharger::new(voltage_v));
        ChargerHandle {
            charger: charger.clone(),
            phase_switcher: Some(charger.clone()),
            meter: Some(charger.clone()),
            meter_energy: Some(charger.clone()),
            phase_currents: None,
            resurrector: None,
        }
    }

    pub fn grid_meter(initial_w: f64) -> Arc<dyn Meter> {
        SimulatedMeter::new(initial_w)
    }

    pub fn pv_meter(initial_w: f64) -> Arc<dyn Meter> {
        SimulatedMeter::new(initial_w)
    }

    pub fn battery_meter(initial_soc_percent: f64) -> Arc<dyn BatteryMeter> {
        SimulatedBatteryMeter::new(initial_soc_percent)
    }

    /// Builds a battery handle with its capacity capability populated, so
    /// multi-battery SoC weighting (§4.6 step 2) has something to weight by.
    pub fn battery_handle(initial_soc_percent: f64, capacity_kwh: f64) -> BatteryHandle {
        let meter = SimulatedBatteryMeter::with_capacity(initial_soc_percent, capacity_kwh);
        BatteryHandle {
            meter: meter.clone(),
            capacity: Some(meter),
        }
    }

    pub fn vehicle(title: impl Into<String>, initial_soc_percent: f64) -> Arc<dyn Vehicle> {
        SimulatedVehicle::new(title, initial_soc_percent)
    }

    /// Builds a vehicle handle with every capability the `SimulatedVehicle`
    /// implements populated (range is not simulated).
    pub fn vehicle_handle(title: impl Into<String>, initial_soc_percent: f64) -> VehicleHandle {
        let vehicle = SimulatedVehicle::new(title, initial_soc_percent);
        VehicleHandle {
            vehicle: vehicle.clone(),
            range: None,
            odometer: Some(vehicle.clone()),
            finish_timer: None,
            charge_state: Some(vehicle.clone()),
            resurrector: Some(vehicle),
        }
    }
}
