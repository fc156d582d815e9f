//! Site state model (§3 Site state).

#[derive(Debug, Clone, Copy, Default)]
pub struct SiteState {
    pub grid_power_w: f64,
    pub pv_power_w: f64,
    pub battery_power_w: f64,
    pub battery_soc_percent: Option<f64>,
    pub battery_buffered: bool,
}

impl SiteState {
    /// Apply the §3 inference invariants when a grid or PV meter is absent.
    ///
    /// If no grid meter is configured, `gridPower := totalChargePower -
    /// pvPower`. If no PV meter, `pvPower := max(0, totalChargePower -
    /// gridPower + residualPower)`.
    pub fn infer_missing(
        has_grid_meter: bool,
        has_pv_meter: bool,
        measured_grid_w: f64,
        measured_pv_w: f64,
        total_charge_power_w: f64,
        residual_power_w: f64,
    ) -> (f64, f64) {
        match (has_grid_meter, has_pv_meter) {
            (true, true) => (measured_grid_w, measured_pv_w),
            (false, true) => (total_charge_power_w - measured_pv_w, measured_pv_w),
            (true, false) => (
                measured_grid_w,
                (total_charge_power_w - measured_grid_w + residual_power_w).max(0.0),
            ),
            (false, false) => unreachable!("at least one of grid or PV must be configured"),
        }
    }
}
