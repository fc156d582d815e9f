//! Site balancer (C6, §4.6). The single authoritative tick loop: reads
//! meters, computes available site power under battery priority/buffer/grid
//! cap policy, dispatches one loadpoint per tick in round-robin order,
//! publishes `homePower`, and refreshes the health watchdog. Grounded on the
//! teacher's `src/controller/mod.rs` `spawn_controller_tasks` loop shape
//! (`tokio::select!` over an interval and a cancellation signal).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::controller::loadpoint::{LoadpointController, TickContext};
use crate::coordinator::LoadpointId;
use crate::domain::{PublishedEvent, SiteState};
use crate::drivers::meter::BatteryHandle;
use crate::drivers::Meter;
use crate::health::Health;
use crate::retry::RetryPolicy;
use crate::tariff::TariffSource;

pub struct SiteConfig {
    pub residual_power_w: f64,
    pub priority_soc_percent: f64,
    pub buffer_soc_percent: f64,
    pub max_grid_supply_while_battery_charging_w: f64,
    pub tick_interval: StdDuration,
}

pub struct SiteBalancer {
    config: SiteConfig,
    grid_meter: Option<Arc<dyn Meter>>,
    pv_meters: Vec<Arc<dyn Meter>>,
    batteries: Vec<BatteryHandle>,
    loadpoints: Vec<Arc<LoadpointController>>,
    tariff: Arc<dyn TariffSource>,
    health: Health,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<PublishedEvent>,
    retry: RetryPolicy,
    round_robin_index: AtomicUsize,
    preemption_tx: mpsc::Sender<LoadpointId>,
    preemption_rx: tokio::sync::Mutex<mpsc::Receiver<LoadpointId>>,
}

impl SiteBalancer {
    pub fn new(
        config: SiteConfig,
        grid_meter: Option<Arc<dyn Meter>>,
        pv_meters: Vec<Arc<dyn Meter>>,
        batteries: Vec<BatteryHandle>,
        loadpoints: Vec<Arc<LoadpointController>>,
        tariff: Arc<dyn TariffSource>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<PublishedEvent>,
    ) -> Self {
        assert!(
            grid_meter.is_some() || !pv_meters.is_empty(),
            "at least one of grid or PV must be configured"
        );
        let interval = chrono::Duration::from_std(config.tick_interval).unwrap_or(chrono::Duration::seconds(10));
        let (preemption_tx, preemption_rx) = mpsc::channel(1);
        Self {
            health: Health::new(clock.clone(), interval),
            config,
            grid_meter,
            pv_meters,
            batteries,
            loadpoints,
            tariff,
            clock,
            events,
            retry: RetryPolicy::default(),
            round_robin_index: AtomicUsize::new(0),
            preemption_tx,
            preemption_rx: tokio::sync::Mutex::new(preemption_rx),
        }
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    /// A single-slot, coalescing preemption handle a loadpoint can hand its
    /// out-of-band `Notify` trigger to, per §5 "Rust mapping". Returning a
    /// sender rather than wiring this up internally keeps `LoadpointController`
    /// ignorant of the site loop that dispatches it.
    pub fn preemption_sender(&self) -> mpsc::Sender<LoadpointId> {
        self.preemption_tx.clone()
    }

    fn publish(&self, event: PublishedEvent) {
        let _ = self.events.send(event);
    }

    /// §4.6 steps 1-2: refresh charge power and the meter-derived site state.
    /// Returns `None` if the grid meter failed — aborting the tick per §4.6
    /// step 2 / §7 propagation policy.
    async fn update_meters(&self, total_charge_power_w: f64) -> Option<SiteState> {
        let measured_grid_w = match &self.grid_meter {
            Some(meter) => match self.retry.run(|| meter.power_w()).await {
                Ok(w) => w,
                Err(err) => {
                    warn!(error = %err, "grid meter read failed, aborting tick");
                    return None;
                }
            },
            None => 0.0,
        };

        let mut measured_pv_w = 0.0;
        for meter in &self.pv_meters {
            match self.retry.run(|| meter.power_w()).await {
                Ok(w) => {
                    if w < -500.0 {
                        warn!(watts = w, "PV meter reading strongly negative, check sign convention");
                    }
                    measured_pv_w += w.max(0.0);
                }
                Err(err) => warn!(error = %err, "PV meter read failed, ignoring this sample"),
            }
        }

        let (grid_power_w, pv_power_w) = SiteState::infer_missing(
            self.grid_meter.is_some(),
            !self.pv_meters.is_empty(),
            measured_grid_w,
            measured_pv_w,
            total_charge_power_w,
            self.config.residual_power_w,
        );

        let (battery_power_w, battery_soc_percent) = self.read_batteries().await;

        Some(SiteState {
            grid_power_w,
            pv_power_w,
            battery_power_w,
            battery_soc_percent,
            battery_buffered: false,
        })
    }

    /// Weighted-average SoC by capacity, falling back to equal weight when no
    /// battery reports a capacity (Open Question (c)).
    async fn read_batteries(&self) -> (f64, Option<f64>) {
        if self.batteries.is_empty() {
            return (0.0, None);
        }

        let mut total_power_w = 0.0;
        let mut weighted_soc = 0.0;
        let mut total_weight = 0.0;
        let mut any_capacity_reported = false;

        for battery in &self.batteries {
            let power_w = match self.retry.run(|| battery.meter.power_w()).await {
                Ok(w) => w,
                Err(err) => {
                    warn!(error = %err, "battery meter power read failed, ignoring this sample");
                    continue;
                }
            };
            total_power_w += power_w;

            let soc = match self.retry.run(|| battery.meter.soc_percent()).await {
                Ok(soc) => soc,
                Err(err) => {
                    warn!(error = %err, "battery SoC read failed, ignoring this sample");
                    continue;
                }
            };

            let weight = match &battery.capacity {
                Some(cap) => match cap.capacity_kwh().await {
                    Ok(kwh) if kwh > 0.0 => {
                        any_capacity_reported = true;
                        kwh
                    }
                    _ => 1.0,
                },
                None => 1.0,
            };
            weighted_soc += soc * weight;
            total_weight += weight;
        }

        let _ = any_capacity_reported;
        let soc = if total_weight > 0.0 {
            Some(weighted_soc / total_weight)
        } else {
            None
        };

        (total_power_w, soc)
    }

    /// §4.6 step 3: available site power under battery priority/buffer/grid
    /// cap policy. Returns `(site_power_w, battery_buffered)`. Battery power
    /// belongs in the base sum (matching the original `sitePower = gridPower +
    /// batteryPower + residualPower`), so that protecting the battery by
    /// zeroing its contribution actually removes it from the offered power
    /// instead of doubling it back in.
    fn available_site_power(&self, state: &SiteState, total_charge_power_w: f64) -> (f64, bool) {
        let mut battery_power_w = state.battery_power_w;
        let mut battery_buffered = false;

        if let Some(soc) = state.battery_soc_percent {
            let charging = battery_power_w < 0.0;
            let discharging = battery_power_w > 0.0;

            if soc < self.config.priority_soc_percent && charging {
                // Battery charging below priority SoC is protected: treat it
                // as idle rather than offering its draw to loadpoints.
                battery_power_w = 0.0;
            }

            if soc > self.config.buffer_soc_percent && discharging {
                battery_buffered = true;
            }
        }

        let mut site_power_w = state.grid_power_w
            + battery_power_w
            + self.config.residual_power_w
            + total_charge_power_w;

        if state.battery_power_w < 0.0
            && state.grid_power_w > self.config.max_grid_supply_while_battery_charging_w
        {
            let excess = state.grid_power_w - self.config.max_grid_supply_while_battery_charging_w;
            site_power_w -= excess;
        }

        (site_power_w, battery_buffered)
    }

    /// §4.6 step 1: sum each loadpoint's freshly-refreshed charge power.
    fn total_charge_power_w(&self) -> f64 {
        self.loadpoints
            .iter()
            .map(|lp| lp.transient_snapshot().charge_power_w)
            .sum()
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let now = self.clock.now();
        let total_charge_power_w = self.total_charge_power_w();

        let state = match self.update_meters(total_charge_power_w).await {
            Some(s) => s,
            None => return Ok(()),
        };

        let (site_power_w, battery_buffered) = self.available_site_power(&state, total_charge_power_w);

        let rates = self.tariff.rates(now).await.unwrap_or_default();

        if let Some(lp) = self.loadpoints.get(self.next_index()) {
            let ctx = TickContext {
                site_power_w,
                battery_buffered,
                rates: &rates,
            };
            if let Err(err) = lp.tick(ctx).await {
                warn!(loadpoint = %lp.id.0, error = %err, "loadpoint tick failed");
            }
            lp.update_savings(state.grid_power_w, state.pv_power_w, state.battery_power_w);
        }

        let home_power_w =
            (state.grid_power_w + state.pv_power_w.max(0.0) + state.battery_power_w - total_charge_power_w)
                .max(0.0);

        self.publish(PublishedEvent::GridPower { watts: state.grid_power_w });
        self.publish(PublishedEvent::PvPower { watts: state.pv_power_w });
        self.publish(PublishedEvent::BatteryPower { watts: state.battery_power_w });
        if let Some(soc) = state.battery_soc_percent {
            self.publish(PublishedEvent::BatterySoc { percent: soc });
        }
        self.publish(PublishedEvent::HomePower { watts: home_power_w });

        self.health.refresh();
        Ok(())
    }

    /// Picks the loadpoint due for its round-robin turn: an out-of-band
    /// preemption request (if one is pending) takes precedence, otherwise the
    /// next index in rotation.
    fn next_index(&self) -> usize {
        if self.loadpoints.is_empty() {
            return 0;
        }

        if let Ok(mut rx) = self.preemption_rx.try_lock() {
            if let Ok(requested) = rx.try_recv() {
                if let Some(idx) = self.loadpoints.iter().position(|lp| lp.id == requested) {
                    return idx;
                }
            }
        }

        let idx = self.round_robin_index.fetch_add(1, Ordering::SeqCst);
        idx % self.loadpoints.len()
    }

    /// Main loop (§4.6 `Run(stop, interval)`). Runs until `stop` is
    /// cancelled, finishing the in-flight tick first (§5 Cancellation).
    pub async fn run(self: Arc<Self>, stop: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "site tick failed");
                    }
                }
                _ = stop.cancelled() => {
                    info!("stop signal received, flushing open sessions");
                    for lp in &self.loadpoints {
                        lp.flush_on_shutdown().await;
                    }
                    break;
                }
            }
        }
    }

    /// A caller-owned `Notify` is not enough to pick which loadpoint should
    /// preempt the round robin: the site's `mpsc` channel keyed by
    /// `LoadpointId` serves that role instead. Exposed for the API layer to
    /// call after a setter changes effective behavior.
    pub fn request_preemption(&self, loadpoint: LoadpointId) {
        let _ = self.preemption_tx.try_send(loadpoint);
    }
}
