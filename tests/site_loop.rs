//! End-to-end: build a real `AppState` from a config equivalent to what
//! `Config::load` would produce, run the site loop for a couple of ticks
//! against the simulated drivers, and confirm it publishes readings and
//! shuts down cleanly on cancellation.

use std::time::Duration;

use energy_controller::config::{
    AppConfig, AuthConfig, LoadpointConfig, ServerConfig, SiteConfig, SocConfig, TelemetryConfig,
    ThresholdConfig,
};
use energy_controller::controller::AppState;
use energy_controller::domain::PublishedEvent;
use tokio_util::sync::CancellationToken;

fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
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
            battery_meters: 1,
            tick_interval_secs: 1,
            grid_tariff_per_kwh: 0.30,
            feed_in_tariff_per_kwh: 0.08,
        },
        loadpoints: vec![
            LoadpointConfig {
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
            },
            LoadpointConfig {
                title: "Carport".to_string(),
                mode: "now".to_string(),
                min_current_a: 6.0,
                max_current_a: 32.0,
                phases: 3,
                soc: SocConfig::default(),
                enable: ThresholdConfig::default(),
                disable: ThresholdConfig::default(),
                phase_switch_delay_secs: 180,
                max_consecutive_failures: 5,
            },
        ],
        telemetry: TelemetryConfig {
            log_level: "info".to_string(),
            log_json: false,
        },
    }
}

#[tokio::test]
async fn site_loop_publishes_readings_and_shuts_down_on_cancellation() {
    let cfg = test_config();
    let state = AppState::new(cfg).await.expect("app state should build");
    assert_eq!(state.loadpoints.len(), 2);

    let mut events = state.events.subscribe();
    let stop = CancellationToken::new();
    let handle = state.spawn_site_loop(stop.clone());

    let mut saw_home_power = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
            Ok(Ok(PublishedEvent::HomePower { watts })) => {
                assert!(watts >= 0.0, "home power must never be reported negative");
                saw_home_power = true;
                break;
            }
            Ok(Ok(_)) => continue,
            _ => continue,
        }
    }
    assert!(saw_home_power, "expected at least one HomePower event within the deadline");

    stop.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("site loop should shut down promptly after cancellation")
        .expect("site loop task should not panic");
}

#[tokio::test]
async fn loadpoint_lookup_by_id_round_trips() {
    let state = AppState::new(test_config()).await.unwrap();
    assert!(state.loadpoint("lp0").is_some());
    assert!(state.loadpoint("lp1").is_some());
    assert!(state.loadpoint("lp2").is_none());
}
