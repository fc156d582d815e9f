//! Loadpoint controller (C5, §4.5). The per-station state machine: on each
//! tick it refreshes charger/vehicle signals, resolves the effective mode,
//! computes a target current and phase count from available site headroom,
//! applies hysteresis so it never flips faster than the configured dwell
//! times, and drives the charger. Grounded on the teacher's
//! `src/controller/mod.rs` tick-loop shape (capture timestamp -> refresh ->
//! compute -> dispatch -> publish) and
//! `examples/original_source/core/loadpoint_api.go` for the getter/setter
//! surface.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::coordinator::{Coordinator, LoadpointId, VehicleId};
use crate::domain::{
    ChargeStatus, Mode, Phases, PublishedEvent, RemoteDemand, SafetyEvent, Session,
    LoadpointSettings, LoadpointTransient, Rates, TimerDirection,
};
use crate::drivers::{ChargerHandle, VehicleHandle};
use crate::error::ControlError;
use crate::planner::Planner;
use crate::retry::RetryPolicy;
use crate::savings::Savings;
use crate::session_store::SessionStore;

/// Static, operator-configured parameters — distinct from the live-settable
/// fields in `LoadpointSettings` (§6 Loadpoint configuration surface).
#[derive(Debug, Clone)]
pub struct LoadpointParams {
    pub voltage_v: f64,
    pub enable_threshold_w: f64,
    pub enable_delay: chrono::Duration,
    pub disable_threshold_w: f64,
    pub disable_delay: chrono::Duration,
    pub phase_switch_delay: chrono::Duration,
    pub max_consecutive_failures: u32,
    pub vehicle_detection_attempts: u32,
}

impl Default for LoadpointParams {
    fn default() -> Self {
        Self {
            voltage_v: 230.0,
            enable_threshold_w: 0.0,
            enable_delay: chrono::Duration::minutes(1),
            disable_threshold_w: 0.0,
            disable_delay: chrono::Duration::minutes(3),
            phase_switch_delay: chrono::Duration::minutes(3),
            max_consecutive_failures: 5,
            vehicle_detection_attempts: 3,
        }
    }
}

/// Inputs the site balancer hands to a loadpoint on each round-robin turn
/// (§4.6 step 4).
pub struct TickContext<'a> {
    pub site_power_w: f64,
    pub battery_buffered: bool,
    pub rates: &'a Rates,
}

pub struct LoadpointController {
    pub id: LoadpointId,
    params: LoadpointParams,
    settings: Mutex<LoadpointSettings>,
    transient: Mutex<LoadpointTransient>,
    charger: ChargerHandle,
    vehicles: Vec<VehicleHandle>,
    coordinator: Arc<Coordinator>,
    session_store: Arc<dyn SessionStore>,
    open_session: Mutex<Option<Session>>,
    savings: Mutex<Savings>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<PublishedEvent>,
    notify: Arc<Notify>,
    retry: RetryPolicy,
}

impl LoadpointController {
    pub fn new(
        id: LoadpointId,
        params: LoadpointParams,
        settings: LoadpointSettings,
        charger: ChargerHandle,
        vehicles: Vec<VehicleHandle>,
        coordinator: Arc<Coordinator>,
        session_store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<PublishedEvent>,
        grid_tariff_per_kwh: f64,
        feed_in_tariff_per_kwh: f64,
    ) -> Self {
        Self {
            id,
            params,
            settings: Mutex::new(settings),
            transient: Mutex::new(LoadpointTransient::default()),
            charger,
            vehicles,
            coordinator,
            session_store,
            open_session: Mutex::new(None),
            savings: Mutex::new(Savings::new(clock.clone(), grid_tariff_per_kwh, feed_in_tariff_per_kwh)),
            clock,
            events,
            notify: Arc::new(Notify::new()),
            retry: RetryPolicy::default(),
        }
    }

    /// Out-of-band preemption signal (§5). Coalesced: a second `notified()`
    /// waiter before the first fires observes the same permit.
    pub fn preemption_signal(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn notify_out_of_band(&self) {
        self.notify.notify_one();
    }

    // ---- getters/setters (§5 Shared state: serialized by this mutex, held
    // only for field read/write, never across I/O) ----

    pub fn settings(&self) -> LoadpointSettings {
        self.settings.lock().clone()
    }

    pub fn set_mode(&self, mode: Mode) {
        self.settings.lock().mode = mode;
        self.notify_out_of_band();
    }

    pub fn set_min_current(&self, amps: f64) {
        self.settings.lock().min_current_a = amps;
        self.notify_out_of_band();
    }

    pub fn set_max_current(&self, amps: f64) {
        self.settings.lock().max_current_a = amps;
        self.notify_out_of_band();
    }

    pub fn set_phases(&self, phases: Phases) {
        self.settings.lock().configured_phases = phases;
        self.notify_out_of_band();
    }

    pub fn set_target_soc(&self, percent: f64) {
        self.settings.lock().target_soc_percent = percent.clamp(0.0, 100.0);
        self.notify_out_of_band();
    }

    pub fn set_min_soc(&self, percent: f64) {
        self.settings.lock().min_soc_percent = percent.clamp(0.0, 100.0);
        self.notify_out_of_band();
    }

    pub fn set_target_energy_wh(&self, wh: f64) {
        self.settings.lock().target_energy_wh = wh.max(0.0);
        self.notify_out_of_band();
    }

    pub fn set_target_time(&self, at: Option<DateTime<Utc>>) {
        self.settings.lock().target_time = at;
        self.notify_out_of_band();
    }

    pub fn set_remote_demand(&self, demand: RemoteDemand) {
        self.settings.lock().remote_demand = demand;
        self.notify_out_of_band();
    }

    pub fn transient_snapshot(&self) -> LoadpointTransient {
        self.transient.lock().clone()
    }

    /// Whether this loadpoint's charger can switch between 1p and 3p, i.e.
    /// whether `Phases::Auto` is a meaningful setting for it.
    pub fn supports_phase_switching(&self) -> bool {
        self.charger.phase_switcher.is_some()
    }

    fn publish(&self, event: PublishedEvent) {
        // No subscribers is not an error; the channel may simply have no
        // listeners attached yet.
        let _ = self.events.send(event);
    }

    // ---- pure decision helpers (unit-tested without I/O) ----

    /// §4.5 step 2: resolve the mode actually in effect this tick.
    fn effective_mode(settings: &LoadpointSettings, vehicle_soc: Option<f64>) -> Mode {
        if settings.remote_demand == RemoteDemand::Hard {
            return Mode::Off;
        }
        if let Some(soc) = vehicle_soc {
            if soc < settings.min_soc_percent {
                return Mode::Now;
            }
        }
        settings.mode
    }

    /// §4.5 step 3, `PV` mode: surplus-driven target current.
    fn target_current_pv(avail_w: f64, min_a: f64, max_a: f64, phases: u8, voltage_v: f64) -> f64 {
        if phases == 0 {
            return min_a;
        }
        (avail_w / (phases as f64 * voltage_v)).clamp(min_a, max_a)
    }

    /// §4.5 step 3, `MinPV` mode: minCurrent floor plus any surplus above it.
    fn target_current_min_pv(avail_w: f64, min_a: f64, max_a: f64, phases: u8, voltage_v: f64) -> f64 {
        if phases == 0 {
            return min_a;
        }
        let floor_w = min_a * phases as f64 * voltage_v;
        let surplus_a = ((avail_w - floor_w).max(0.0)) / (phases as f64 * voltage_v);
        (min_a + surplus_a).clamp(min_a, max_a)
    }

    /// Hysteresis gate (§4.5 step 4): `condition_met` is "should be enabled
    /// right now". Returns `(should_be_enabled, new_timer_since, new_timer_direction)`.
    /// A flip only actually happens once `delay` has elapsed continuously in
    /// the same direction; a condition reversal before that clears the timer.
    fn hysteresis_gate(
        currently_enabled: bool,
        condition_met: bool,
        timer_since: Option<DateTime<Utc>>,
        timer_direction: Option<TimerDirection>,
        now: DateTime<Utc>,
        enable_delay: chrono::Duration,
        disable_delay: chrono::Duration,
    ) -> (bool, Option<DateTime<Utc>>, Option<TimerDirection>) {
        let wanted_direction = if condition_met {
            TimerDirection::Enable
        } else {
            TimerDirection::Disable
        };

        // Already in the wanted state: no timer needed.
        if currently_enabled == condition_met {
            return (currently_enabled, None, None);
        }

        let (since, direction) = match (timer_since, timer_direction) {
            (Some(since), Some(dir)) if dir == wanted_direction => (since, dir),
            _ => (now, wanted_direction),
        };

        let delay = match direction {
            TimerDirection::Enable => enable_delay,
            TimerDirection::Disable => disable_delay,
        };

        if now - since >= delay {
            (condition_met, None, None)
        } else {
            (currently_enabled, Some(since), Some(direction))
        }
    }

    /// §4.5 step 5: phase scaling for auto-phase chargers. Same hysteresis
    /// shape as `hysteresis_gate`, gating 1p vs 3p instead of enable/disable.
    fn phase_scaling_gate(
        current_phases: u8,
        avail_w: f64,
        min_a: f64,
        voltage_v: f64,
        timer_since: Option<DateTime<Utc>>,
        timer_direction: Option<TimerDirection>,
        now: DateTime<Utc>,
        delay: chrono::Duration,
    ) -> (u8, Option<DateTime<Utc>>, Option<TimerDirection>) {
        let three_phase_threshold_w = min_a * 3.0 * voltage_v;
        let wants_three_phase = avail_w >= three_phase_threshold_w;
        let wanted_phases = if wants_three_phase { 3 } else { 1 };

        if current_phases == wanted_phases {
            return (current_phases, None, None);
        }

        let wanted_direction = if wants_three_phase {
            TimerDirection::Enable
        } else {
            TimerDirection::Disable
        };

        let (since, direction) = match (timer_since, timer_direction) {
            (Some(since), Some(dir)) if dir == wanted_direction => (since, dir),
            _ => (now, wanted_direction),
        };

        if now - since >= delay {
            (wanted_phases, None, None)
        } else {
            (current_phases, Some(since), Some(direction))
        }
    }

    // ---- the tick itself ----

    pub async fn tick(&self, ctx: TickContext<'_>) -> anyhow::Result<()> {
        let now = self.clock.now();
        let settings = self.settings.lock().clone();

        let previous_status = self.transient.lock().status;
        let status = self.refresh_status(previous_status).await;
        self.handle_vehicle_detection(status, previous_status).await;

        let vehicle_soc = self.refresh_vehicle_soc().await;
        self.refresh_charger_meters().await;

        let mut effective_mode = Self::effective_mode(&settings, vehicle_soc);

        if let (Some(target_time), true) = (settings.target_time, settings.target_energy_wh > 0.0) {
            let charged_wh = self.transient.lock().charged_energy_wh;
            let required_wh = (settings.target_energy_wh - charged_wh).max(0.0);
            let target_power_w = settings.max_current_a
                * self.transient.lock().current_phases as f64
                * self.params.voltage_v;
            let verdict = Planner::active(ctx.rates, required_wh, target_power_w, target_time, now);
            self.publish(PublishedEvent::TargetTimeActive {
                loadpoint: self.id.0.clone(),
                active: verdict.active,
            });
            self.publish(PublishedEvent::TargetTimeProjectedStart {
                loadpoint: self.id.0.clone(),
                at: verdict.projected_start,
            });
            // An infeasible plan (not enough time left to hit the deadline
            // even charging continuously) is treated the same as an active
            // one: charge now rather than wait on a schedule that can no
            // longer be met.
            if (verdict.active || verdict.infeasible) && effective_mode != Mode::Off {
                effective_mode = Mode::Now;
            }
        }

        let current_phases = self.transient.lock().current_phases;
        let avail_w = -ctx.site_power_w;

        let (wants_enabled, target_current_a) = match effective_mode {
            Mode::Off => (false, 0.0),
            Mode::Now => (true, settings.max_current_a),
            Mode::MinPv => (
                true,
                Self::target_current_min_pv(
                    avail_w,
                    settings.min_current_a,
                    settings.max_current_a,
                    current_phases,
                    self.params.voltage_v,
                ),
            ),
            Mode::Pv => {
                // §4.6 step 3 "battery buffer": a battery discharging above
                // bufferSoc is trusted the same as real PV, so its share of
                // `avail_w` skips the enable/disable safety margins applied
                // to grid-backed surplus.
                let enable_margin = if ctx.battery_buffered { 0.0 } else { self.params.enable_threshold_w };
                let disable_margin = if ctx.battery_buffered { 0.0 } else { self.params.disable_threshold_w };
                let condition_met = avail_w
                    >= settings.min_current_a * current_phases as f64 * self.params.voltage_v
                        + enable_margin;
                let disable_floor = settings.min_current_a * current_phases as f64
                    * self.params.voltage_v
                    - disable_margin;

                let (pv_since, pv_dir) = {
                    let t = self.transient.lock();
                    (t.pv_timer_since, t.pv_timer_direction)
                };
                let currently_enabled = self.charger.charger.enabled().await.unwrap_or(false);
                let condition = if currently_enabled {
                    avail_w >= disable_floor
                } else {
                    condition_met
                };
                let (enabled, since, dir) = Self::hysteresis_gate(
                    currently_enabled,
                    condition,
                    pv_since,
                    pv_dir,
                    now,
                    self.params.enable_delay,
                    self.params.disable_delay,
                );
                {
                    let mut t = self.transient.lock();
                    t.pv_timer_since = since;
                    t.pv_timer_direction = dir;
                }
                (
                    enabled,
                    Self::target_current_pv(
                        avail_w,
                        settings.min_current_a,
                        settings.max_current_a,
                        current_phases,
                        self.params.voltage_v,
                    ),
                )
            }
        };

        if matches!(settings.configured_phases, Phases::Auto) && effective_mode == Mode::Pv {
            let (phase_since, phase_dir) = {
                let t = self.transient.lock();
                (t.phase_timer_since, t.phase_timer_direction)
            };
            let (new_phases, since, dir) = Self::phase_scaling_gate(
                current_phases,
                avail_w,
                settings.min_current_a,
                self.params.voltage_v,
                phase_since,
                phase_dir,
                now,
                self.params.phase_switch_delay,
            );
            if new_phases != current_phases {
                if self.apply_phases(new_phases).await.is_ok() {
                    self.transient.lock().current_phases = new_phases;
                    self.publish(PublishedEvent::PhasesActive {
                        loadpoint: self.id.0.clone(),
                        phases: new_phases,
                    });
                }
            }
            let mut t = self.transient.lock();
            t.phase_timer_since = since;
            t.phase_timer_direction = dir;
        }

        let safe_mode = self.transient.lock().safe_mode;
        let final_enabled = wants_enabled && !safe_mode;
        self.apply_command(final_enabled, target_current_a).await;

        self.update_status_and_sessions(status, vehicle_soc).await;
        self.publish_site_facing_events(&settings);

        Ok(())
    }

    async fn refresh_status(&self, fallback: ChargeStatus) -> ChargeStatus {
        match self.retry.run(|| self.charger.charger.status()).await {
            Ok(status) => {
                self.transient.lock().consecutive_failures = 0;
                self.transient.lock().safe_mode = false;
                status
            }
            Err(err) => {
                warn!(loadpoint = %self.id.0, error = %err, "charger status refresh failed");
                self.record_failure();
                fallback
            }
        }
    }

    fn record_failure(&self) {
        let mut t = self.transient.lock();
        t.consecutive_failures += 1;
        if t.consecutive_failures >= self.params.max_consecutive_failures && !t.safe_mode {
            t.safe_mode = true;
            let count = t.consecutive_failures;
            drop(t);
            warn!(loadpoint = %self.id.0, count, "forcing safe idle after repeated charger failures");
            self.publish(PublishedEvent::Safety(SafetyEvent::ChargerConsecutiveFailures {
                loadpoint: self.id.0.clone(),
                count,
            }));
        }
    }

    async fn refresh_charger_meters(&self) {
        if let Some(meter) = &self.charger.meter {
            if let Ok(power) = meter.current_power_w().await {
                self.transient.lock().charge_power_w = power;
            }
        }
        if let Some(energy) = &self.charger.meter_energy {
            if let Ok(wh) = energy.total_energy_wh().await {
                self.transient.lock().charged_energy_wh = wh;
            }
        }
    }

    async fn refresh_vehicle_soc(&self) -> Option<f64> {
        let vehicle_id = self.transient.lock().vehicle_id?;
        let handle = self.vehicles.iter().find(|v| self.vehicle_id_of(v) == vehicle_id)?;
        match handle.vehicle.soc_percent().await {
            Ok(soc) => {
                self.transient.lock().vehicle_soc_percent = Some(soc);
                self.publish(PublishedEvent::VehicleSoc {
                    loadpoint: self.id.0.clone(),
                    percent: soc,
                });
                Some(soc)
            }
            Err(err) => {
                warn!(loadpoint = %self.id.0, error = %err, "vehicle SoC refresh failed, ignoring");
                self.transient.lock().vehicle_soc_percent
            }
        }
    }

    fn vehicle_id_of(&self, handle: &VehicleHandle) -> VehicleId {
        VehicleId(
            self.vehicles
                .iter()
                .position(|v| Arc::ptr_eq(&v.vehicle, &handle.vehicle))
                .unwrap_or(0) as u32,
        )
    }

    /// §4.5 "Vehicle detection". Only runs when no vehicle is yet assigned
    /// and the charger just transitioned into `Connected`.
    async fn handle_vehicle_detection(&self, status: ChargeStatus, previous: ChargeStatus) {
        if self.transient.lock().vehicle_id.is_some() {
            return;
        }
        if !(previous == ChargeStatus::Disconnected && status != ChargeStatus::Disconnected) {
            return;
        }
        self.publish(PublishedEvent::VehicleDetectionActive {
            loadpoint: self.id.0.clone(),
            active: true,
        });

        for (idx, handle) in self.vehicles.iter().enumerate() {
            let vid = VehicleId(idx as u32);
            if !self.coordinator.available(&self.id).contains(&vid) {
                continue;
            }
            if let Some(resurrector) = &handle.resurrector {
                let _ = resurrector.wake_up().await;
            }
        }

        let mut detected = None;
        for _attempt in 0..self.params.vehicle_detection_attempts {
            for (idx, handle) in self.vehicles.iter().enumerate() {
                let vid = VehicleId(idx as u32);
                if !self.coordinator.available(&self.id).contains(&vid) {
                    continue;
                }
                if let Some(charge_state) = &handle.charge_state {
                    if charge_state.connected().await.unwrap_or(false) {
                        detected = Some(vid);
                        break;
                    }
                }
            }
            if detected.is_some() {
                break;
            }
        }

        self.publish(PublishedEvent::VehicleDetectionActive {
            loadpoint: self.id.0.clone(),
            active: false,
        });

        if let Some(vid) = detected {
            if self.coordinator.acquire(&self.id, vid).is_ok() {
                self.transient.lock().vehicle_id = Some(vid);
                info!(loadpoint = %self.id.0, vehicle = ?vid, "vehicle detected and acquired");
            }
        }
    }

    async fn apply_phases(&self, phases: u8) -> anyhow::Result<()> {
        if let Some(switcher) = &self.charger.phase_switcher {
            self.retry
                .run(|| switcher.set_phases(phases))
                .await
                .map_err(ControlError::transient)?;
        }
        Ok(())
    }

    async fn apply_command(&self, enabled: bool, current_a: f64) {
        if enabled {
            if let Err(err) = self.retry.run(|| self.charger.charger.set_max_current(current_a)).await {
                warn!(loadpoint = %self.id.0, error = %err, "failed to set target current");
                self.record_failure();
                return;
            }
        }
        if let Err(err) = self.retry.run(|| self.charger.charger.enable(enabled)).await {
            warn!(loadpoint = %self.id.0, error = %err, "failed to apply enable command");
            self.record_failure();
        }
    }

    async fn update_status_and_sessions(&self, status: ChargeStatus, vehicle_soc: Option<f64>) {
        let previous = self.transient.lock().status;
        self.transient.lock().status = status;

        if previous != ChargeStatus::Charging && status == ChargeStatus::Charging {
            let odometer_km = None;
            let vehicle_title = self
                .transient
                .lock()
                .vehicle_id
                .and_then(|vid| self.vehicles.get(vid.0 as usize))
                .map(|h| h.vehicle.title().to_string());
            let mut open = self.open_session.lock();
            *open = Some(Session::open(self.id.0.clone(), self.clock.now(), vehicle_title, odometer_km));
        }

        if previous == ChargeStatus::Charging && status != ChargeStatus::Charging {
            self.close_session().await;
        }

        if status == ChargeStatus::Disconnected && previous != ChargeStatus::Disconnected {
            if let Some(vid) = self.transient.lock().vehicle_id.take() {
                self.coordinator.release(&self.id, vid);
            }
            self.close_session().await;
        }

        let _ = vehicle_soc;
    }

    async fn close_session(&self) {
        let session = self.open_session.lock().take();
        if let Some(mut session) = session {
            session.close(self.clock.now());
            let charged_wh = self.transient.lock().charged_energy_wh;
            session.charged_kwh = charged_wh / 1000.0;
            session.self_kwh = self.savings.lock().self_consumption_kwh();

            if session.is_negligible() {
                return;
            }
            if let Err(err) = self.session_store.append(session).await {
                warn!(loadpoint = %self.id.0, error = %err, "failed to persist session");
            }
        }
    }

    pub fn update_savings(&self, grid_w: f64, pv_w: f64, battery_w: f64) {
        let charge_w = self.transient.lock().charge_power_w;
        self.savings.lock().update(grid_w, pv_w, battery_w, charge_w);
    }

    fn publish_site_facing_events(&self, settings: &LoadpointSettings) {
        self.publish(PublishedEvent::MinSoc {
            loadpoint: self.id.0.clone(),
            percent: settings.min_soc_percent,
        });
        self.publish(PublishedEvent::TargetSoc {
            loadpoint: self.id.0.clone(),
            percent: settings.target_soc_percent,
        });
    }

    /// Called by the site loop on clean shutdown (§5 Cancellation) to flush
    /// any still-open session to the external store.
    pub async fn flush_on_shutdown(&self) {
        self.close_session().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::coordinator::Coordinator;
    use crate::domain::RateSlot;
    use crate::drivers::factory::DeviceFactory;
    use crate::session_store::InMemorySessionStore;

    fn make_controller() -> LoadpointController {
        let charger_handle = DeviceFactory::charger(230.0);
        let clock = MockClock::new(Utc::now());
        let coordinator = Arc::new(Coordinator::new(vec![]));
        let (tx, _rx) = broadcast::channel(16);
        LoadpointController::new(
            LoadpointId("lp1".into()),
            LoadpointParams::default(),
            LoadpointSettings::default(),
            charger_handle,
            vec![],
            coordinator,
            Arc::new(InMemorySessionStore::new()),
            clock,
            tx,
            0.30,
            0.08,
        )
    }

    #[test]
    fn effective_mode_hard_remote_demand_forces_off() {
        let mut settings = LoadpointSettings::default();
        settings.mode = Mode::Now;
        settings.remote_demand = RemoteDemand::Hard;
        assert_eq!(LoadpointController::effective_mode(&settings, None), Mode::Off);
    }

    #[test]
    fn effective_mode_min_soc_override() {
        let mut settings = LoadpointSettings::default();
        settings.mode = Mode::Pv;
        settings.min_soc_percent = 30.0;
        assert_eq!(LoadpointController::effective_mode(&settings, Some(20.0)), Mode::Now);
        assert_eq!(LoadpointController::effective_mode(&settings, Some(40.0)), Mode::Pv);
    }

    #[test]
    fn pv_target_current_clamps_to_bounds() {
        let target = LoadpointController::target_current_pv(500.0, 6.0, 16.0, 3, 230.0);
        assert!((target - 6.0).abs() < 1e-6, "below min should clamp up");

        let target = LoadpointController::target_current_pv(20_000.0, 6.0, 16.0, 3, 230.0);
        assert!((target - 16.0).abs() < 1e-6, "above max should clamp down");

        let target = LoadpointController::target_current_pv(6900.0, 6.0, 16.0, 3, 230.0);
        assert!((target - 10.0).abs() < 0.1);
    }

    #[test]
    fn min_pv_target_current_never_drops_below_floor() {
        let target = LoadpointController::target_current_min_pv(0.0, 6.0, 16.0, 3, 230.0);
        assert!((target - 6.0).abs() < 1e-6);

        let surplus_w = 6.0 * 3.0 * 230.0 + 2300.0;
        let target = LoadpointController::target_current_min_pv(surplus_w, 6.0, 16.0, 3, 230.0);
        assert!(target > 6.0 && target <= 16.0);
    }

    #[test]
    fn hysteresis_gate_does_not_flip_before_delay_elapses() {
        let now = Utc::now();
        let delay = chrono::Duration::minutes(3);

        let (enabled, since, dir) = LoadpointController::hysteresis_gate(
            true, false, None, None, now, delay, delay,
        );
        assert!(enabled, "must remain enabled before delay elapses");
        assert!(since.is_some());
        assert_eq!(dir, Some(TimerDirection::Disable));

        let (enabled, since2, dir2) = LoadpointController::hysteresis_gate(
            true, false, since, dir, now + chrono::Duration::minutes(2), delay, delay,
        );
        assert!(enabled, "still within delay window");
        assert_eq!(since2, since);
        assert_eq!(dir2, dir);

        let (enabled, since3, _) = LoadpointController::hysteresis_gate(
            true, false, since, dir, now + delay + chrono::Duration::seconds(1), delay, delay,
        );
        assert!(!enabled, "disables once delay has elapsed");
        assert!(since3.is_none());
    }

    #[test]
    fn hysteresis_gate_clears_timer_on_condition_reversal() {
        let now = Utc::now();
        let delay = chrono::Duration::minutes(3);
        let (enabled, since, dir) = LoadpointController::hysteresis_gate(
            true, false, None, None, now, delay, delay,
        );
        assert!(enabled);

        // Condition recovers before the disable delay elapses: timer clears.
        let (enabled2, since2, dir2) = LoadpointController::hysteresis_gate(
            true,
            true,
            since,
            dir,
            now + chrono::Duration::minutes(1),
            delay,
            delay,
        );
        assert!(enabled2);
        assert!(since2.is_none());
        assert!(dir2.is_none());
    }

    #[test]
    fn phase_scaling_gate_scales_up_only_after_delay() {
        let now = Utc::now();
        let delay = chrono::Duration::minutes(3);
        let avail_w = 6.0 * 3.0 * 230.0 + 1000.0;

        let (phases, since, dir) =
            LoadpointController::phase_scaling_gate(1, avail_w, 6.0, 230.0, None, None, now, delay);
        assert_eq!(phases, 1);
        assert!(since.is_some());

        let (phases2, _, _) = LoadpointController::phase_scaling_gate(
            1,
            avail_w,
            6.0,
            230.0,
            since,
            dir,
            now + delay + chrono::Duration::seconds(1),
            delay,
        );
        assert_eq!(phases2, 3);
    }

    #[tokio::test]
    async fn round_trip_setters() {
        let controller = make_controller();
        controller.set_mode(Mode::Now);
        assert_eq!(controller.settings().mode, Mode::Now);

        controller.set_max_current(32.0);
        assert_eq!(controller.settings().max_current_a, 32.0);

        controller.set_target_soc(80.0);
        assert_eq!(controller.settings().target_soc_percent, 80.0);

        let notify = controller.preemption_signal();
        // A setter posts a signal; await resolves immediately rather than
        // blocking the test.
        tokio::time::timeout(std::time::Duration::from_millis(50), notify.notified())
            .await
            .expect("out-of-band signal should have been posted");
    }

    #[tokio::test]
    async fn full_tick_drives_simulated_charger_in_now_mode() {
        let handle = DeviceFactory::charger(230.0);
        let clock = MockClock::new(Utc::now());
        let coordinator = Arc::new(Coordinator::new(vec![]));
        let (tx, _rx) = broadcast::channel(16);
        let mut settings = LoadpointSettings::default();
        settings.mode = Mode::Now;
        settings.max_current_a = 16.0;

        let controller = LoadpointController::new(
            LoadpointId("lp1".into()),
            LoadpointParams::default(),
            settings,
            handle.clone(),
            vec![],
            coordinator,
            Arc::new(InMemorySessionStore::new()),
            clock.clone(),
            tx,
            0.30,
            0.08,
        );

        let rates = Rates::new(vec![RateSlot::new(clock.now(), clock.now() + chrono::Duration::hours(1), 0.30)]);
        controller
            .tick(TickContext {
                site_power_w: 0.0,
                battery_buffered: false,
                rates: &rates,
            })
            .await
            .unwrap();

        assert!(handle.charger.enabled().await.unwrap());
    }
}
