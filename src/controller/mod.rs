#![allow(dead_code)]
//! Process-level wiring (C9, §9 Design Notes "process shell"). `AppState`
//! owns the site balancer, one `LoadpointController` per configured
//! loadpoint, the vehicle coordinator, tariff source, and session store, and
//! exposes the single background task the HTTP surface and `main` share.

pub mod loadpoint;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{bail, Result};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, LoadpointConfig};
use crate::coordinator::{Coordinator, LoadpointId};
use crate::domain::{LoadpointSettings, Mode, Phases, PublishedEvent};
use crate::drivers::factory::DeviceFactory;
use crate::drivers::meter::BatteryHandle;
use crate::drivers::Meter;
use crate::session_store::{InMemorySessionStore, SessionStore};
use crate::site::{SiteBalancer, SiteConfig as BalancerConfig};
use crate::tariff::{ConstantTariff, FallbackTariff, TariffSource};
use loadpoint::{LoadpointController, LoadpointParams};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub site: Arc<SiteBalancer>,
    pub loadpoints: Vec<Arc<LoadpointController>>,
    pub coordinator: Arc<Coordinator>,
    pub session_store: Arc<dyn SessionStore>,
    pub events: broadcast::Sender<PublishedEvent>,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<Self> {
        let clock: Arc<dyn crate::clock::Clock> = Arc::new(crate::clock::SystemClock);
        let (events, _rx) = broadcast::channel(256);

        let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let coordinator = Arc::new(Coordinator::new(Vec::new()));

        let tariff: Arc<dyn TariffSource> = Arc::new(FallbackTariff::new(
            Arc::new(ConstantTariff::new(cfg.site.grid_tariff_per_kwh)),
            cfg.site.grid_tariff_per_kwh,
        ));

        let grid_meter: Option<Arc<dyn Meter>> = if cfg.site.grid_meter {
            Some(DeviceFactory::grid_meter(0.0))
        } else {
            None
        };
        let pv_meters: Vec<Arc<dyn Meter>> = (0..cfg.site.pv_meters)
            .map(|_| DeviceFactory::pv_meter(0.0))
            .collect();
        let batteries: Vec<BatteryHandle> = (0..cfg.site.battery_meters)
            .map(|_| DeviceFactory::battery_handle(50.0, 10.0))
            .collect();

        let mut loadpoints = Vec::with_capacity(cfg.loadpoints.len());
        for (idx, lp_cfg) in cfg.loadpoints.iter().enumerate() {
            loadpoints.push(Arc::new(build_loadpoint(
                idx,
                lp_cfg,
                cfg.site.voltage_v,
                coordinator.clone(),
                session_store.clone(),
                clock.clone(),
                events.clone(),
                cfg.site.grid_tariff_per_kwh,
                cfg.site.feed_in_tariff_per_kwh,
            )?));
        }

        let balancer_cfg = BalancerConfig {
            residual_power_w: cfg.site.residual_power_w,
            priority_soc_percent: cfg.site.priority_soc_percent,
            buffer_soc_percent: cfg.site.buffer_soc_percent,
            max_grid_supply_while_battery_charging_w: cfg.site.max_grid_supply_while_battery_charging_w,
            tick_interval: StdDuration::from_secs(cfg.site.tick_interval_secs),
        };

        let site = Arc::new(SiteBalancer::new(
            balancer_cfg,
            grid_meter,
            pv_meters,
            batteries,
            loadpoints.clone(),
            tariff,
            clock,
            events.clone(),
        ));

        Ok(Self {
            cfg,
            site,
            loadpoints,
            coordinator,
            session_store,
            events,
        })
    }

    /// Spawns the site loop as a background task, returning its handle so
    /// `main` can await it alongside the HTTP server during shutdown.
    pub fn spawn_site_loop(&self, stop: CancellationToken) -> tokio::task::JoinHandle<()> {
        let site = self.site.clone();
        tokio::spawn(async move { site.run(stop).await })
    }

    pub fn loadpoint(&self, id: &str) -> Option<&Arc<LoadpointController>> {
        self.loadpoints.iter().find(|lp| lp.id.0 == id)
    }
}

fn build_loadpoint(
    idx: usize,
    lp_cfg: &LoadpointConfig,
    voltage_v: f64,
    coordinator: Arc<Coordinator>,
    session_store: Arc<dyn SessionStore>,
    clock: Arc<dyn crate::clock::Clock>,
    events: broadcast::Sender<PublishedEvent>,
    grid_tariff_per_kwh: f64,
    feed_in_tariff_per_kwh: f64,
) -> Result<LoadpointController> {
    let mode = parse_mode(&lp_cfg.mode)?;
    let phases = Phases::from_configured(lp_cfg.phases)
        .ok_or_else(|| anyhow::anyhow!("invalid phases value {} for loadpoint {}", lp_cfg.phases, lp_cfg.title))?;

    let settings = LoadpointSettings {
        mode,
        min_current_a: lp_cfg.min_current_a,
        max_current_a: lp_cfg.max_current_a,
        configured_phases: phases,
        target_soc_percent: lp_cfg.soc.target_percent,
        min_soc_percent: lp_cfg.soc.min_percent,
        target_energy_wh: 0.0,
        target_time: None,
        remote_demand: crate::domain::RemoteDemand::Normal,
    };

    let params = LoadpointParams {
        voltage_v,
        enable_threshold_w: lp_cfg.enable.threshold_w,
        enable_delay: chrono::Duration::seconds(lp_cfg.enable.delay_secs as i64),
        disable_threshold_w: lp_cfg.disable.threshold_w,
        disable_delay: chrono::Duration::seconds(lp_cfg.disable.delay_secs as i64),
        phase_switch_delay: chrono::Duration::seconds(lp_cfg.phase_switch_delay_secs as i64),
        max_consecutive_failures: lp_cfg.max_consecutive_failures,
        vehicle_detection_attempts: 3,
    };

    let charger = DeviceFactory::charger(voltage_v);
    let vehicle = DeviceFactory::vehicle_handle(format!("{} vehicle", lp_cfg.title), 50.0);

    Ok(LoadpointController::new(
        LoadpointId(format!("lp{idx}")),
        params,
        settings,
        charger,
        vec![vehicle],
        coordinator,
        session_store,
        clock,
        events,
        grid_tariff_per_kwh,
        feed_in_tariff_per_kwh,
    ))
}

fn parse_mode(raw: &str) -> Result<Mode> {
    match raw.to_ascii_lowercase().as_str() {
        "off" => Ok(Mode::Off),
        "now" => Ok(Mode::Now),
        "minpv" | "min_pv" => Ok(Mode::MinPv),
        "pv" => Ok(Mode::Pv),
        other => bail!("unknown loadpoint mode '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, LoadpointConfig, ServerConfig, SiteConfig, SocConfig, TelemetryConfig, ThresholdConfig};

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                enable_cors: false,
            },
            auth: AuthConfig {
                token: "x".repeat(32),
            },
            site: SiteConfig {
                voltage_v: 230.0,
                residual_power_w: 0.0,
                priority_soc_percent: 50.0,
                buffer_soc_percent: 95.0,
                max_grid_supply_while_battery_charging_w: f64::MAX,
                grid_meter: true,
                pv_meters: 1,
                battery_meters: 0,
                tick_interval_secs: 10,
                grid_tariff_per_kwh: 0.30,
                feed_in_tariff_per_kwh: 0.08,
            },
            loadpoints: vec![LoadpointConfig {
                title: "Garage".to_string(),
                mode: "pv".to_string(),
                min_current_a: 6.0,
                max_current_a: 16.0,
                phases: 3,
                soc: SocConfig::default(),
                enable: ThresholdConfig::default(),
                disable: ThresholdConfig::default(),
                phase_switch_delay_secs: 180,
                max_consecutive_failures: 5,
            }],
            telemetry: TelemetryConfig {
                log_level: "info".to_string(),
                log_json: false,
            },
        }
    }

    #[tokio::test]
    async fn app_state_builds_one_loadpoint_per_configured_entry() {
        let state = AppState::new(test_config()).await.unwrap();
        assert_eq!(state.loadpoints.len(), 1);
        assert!(state.loadpoint("lp0").is_some());
    }

    #[test]
    fn parse_mode_accepts_known_modes() {
        assert_eq!(parse_mode("off").unwrap(), Mode::Off);
        assert_eq!(parse_mode("PV").unwrap(), Mode::Pv);
        assert_eq!(parse_mode("minpv").unwrap(), Mode::MinPv);
        assert!(parse_mode("bogus").is_err());
    }
}
