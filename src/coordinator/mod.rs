//! Vehicle coordinator (C3, §4.3). Holds the ownership map "vehicle ->
//! owning loadpoint, if any", keyed by stable ids per §9 Cyclic references
//! (an explicit registry instead of mutual back-pointers).

use crate::error::ControlError;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadpointId(pub String);

pub struct Coordinator {
    vehicles: Vec<VehicleId>,
    owners: Mutex<HashMap<VehicleId, LoadpointId>>,
}

impl Coordinator {
    pub fn new(vehicle_ids: Vec<VehicleId>) -> Self {
        Self {
            vehicles: vehicle_ids,
            owners: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire(&self, lp: &LoadpointId, v: VehicleId) -> Result<(), ControlError> {
        let mut owners = self.owners.lock();
        if let Some(owner) = owners.get(&v) {
            if owner != lp {
                return Err(ControlError::OwnershipConflict {
                    vehicle: format!("{v:?}"),
                    requested_by: lp.0.clone(),
                    owned_by: owner.0.clone(),
                });
            }
            return Ok(());
        }
        owners.insert(v, lp.clone());
        Ok(())
    }

    /// Idempotent: releasing an unowned vehicle, or a vehicle owned by a
    /// different loadpoint, is a no-op — disconnect-driven release races
    /// against an explicit user reassignment and must never error.
    pub fn release(&self, lp: &LoadpointId, v: VehicleId) {
        let mut owners = self.owners.lock();
        if owners.get(&v) == Some(lp) {
            owners.remove(&v);
        }
    }

    pub fn available(&self, lp: &LoadpointId) -> Vec<VehicleId> {
        let owners = self.owners.lock();
        self.vehicles
            .iter()
            .copied()
            .filter(|v| owners.get(v).map(|o| o == lp).unwrap_or(true))
            .collect()
    }

    /// Pick the first unowned vehicle whose hardware reports "connected",
    /// per `status_fn`.
    pub fn identify_by_status(
        &self,
        lp: &LoadpointId,
        status_fn: impl Fn(VehicleId) -> bool,
    ) -> Option<VehicleId> {
        self.available(lp).into_iter().find(|&v| status_fn(v))
    }
}
