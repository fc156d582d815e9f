#![allow(dead_code)]
//! Layered configuration (§6 Configuration surface, §1 ambient stack).
//! Mirrors the teacher's figment+validator load/load_with_env split: every
//! shape below is plain data, validated once at startup, never re-read
//! mid-tick.

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use validator::Validate;

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub auth: AuthConfig,

    #[validate(nested)]
    pub site: SiteConfig,

    #[validate(nested)]
    #[validate(length(min = 1))]
    pub loadpoints: Vec<LoadpointConfig>,

    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    #[serde(default)]
    pub enable_cors: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("failed to parse socket address")
    }
}

/// Bearer-token auth guarding the loadpoint settings API (§6 HTTP surface).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AuthConfig {
    #[validate(length(min = 32))]
    pub token: String,
}

/// Site-level configuration (§6 Configuration surface, site level).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_site_config"))]
pub struct SiteConfig {
    #[serde(default = "default_voltage_v")]
    #[validate(range(min = 100.0, max = 400.0))]
    pub voltage_v: f64,

    #[serde(default)]
    pub residual_power_w: f64,

    #[serde(default = "default_priority_soc")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub priority_soc_percent: f64,

    #[serde(default = "default_buffer_soc")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub buffer_soc_percent: f64,

    #[serde(default = "default_max_grid_supply_while_battery_charging_w")]
    pub max_grid_supply_while_battery_charging_w: f64,

    #[serde(default)]
    pub grid_meter: bool,

    #[serde(default)]
    pub pv_meters: u32,

    #[serde(default)]
    pub battery_meters: u32,

    #[serde(default = "default_tick_interval_secs")]
    #[validate(range(min = 1, max = 300))]
    pub tick_interval_secs: u64,

    #[serde(default = "default_grid_tariff_per_kwh")]
    pub grid_tariff_per_kwh: f64,

    #[serde(default = "default_feed_in_tariff_per_kwh")]
    pub feed_in_tariff_per_kwh: f64,
}

/// "At least one of grid or PV must be configured" (§3 Site state).
fn validate_site_config(config: &SiteConfig) -> Result<(), validator::ValidationError> {
    if !config.grid_meter && config.pv_meters == 0 {
        return Err(validator::ValidationError::new(
            "at least one of grid_meter or pv_meters must be configured",
        ));
    }
    Ok(())
}

/// Per-loadpoint configuration (§6 Configuration surface, loadpoint level).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_loadpoint_config"))]
pub struct LoadpointConfig {
    #[validate(length(min = 1))]
    pub title: String,

    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_min_current_a")]
    #[validate(range(min = 1.0, max = 64.0))]
    pub min_current_a: f64,

    #[serde(default = "default_max_current_a")]
    #[validate(range(min = 1.0, max = 64.0))]
    pub max_current_a: f64,

    /// 0 = auto, 1 or 3 otherwise, per §3's `configuredPhases ∈ {0, 1, 3}`.
    #[serde(default = "default_phases")]
    pub phases: u8,

    #[serde(default)]
    pub soc: SocConfig,

    #[serde(default)]
    pub enable: ThresholdConfig,

    #[serde(default)]
    pub disable: ThresholdConfig,

    #[serde(default = "default_phase_switch_delay_secs")]
    pub phase_switch_delay_secs: u64,

    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

fn validate_loadpoint_config(config: &LoadpointConfig) -> Result<(), validator::ValidationError> {
    if config.min_current_a > config.max_current_a {
        return Err(validator::ValidationError::new(
            "min_current_a must not exceed max_current_a",
        ));
    }
    if !matches!(config.phases, 0 | 1 | 3) {
        return Err(validator::ValidationError::new("phases must be 0 (auto), 1, or 3"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SocConfig {
    #[serde(default)]
    pub min_percent: f64,

    #[serde(default = "default_target_soc")]
    pub target_percent: f64,
}

impl Default for SocConfig {
    fn default() -> Self {
        Self {
            min_percent: 0.0,
            target_percent: default_target_soc(),
        }
    }
}

/// Enable/disable hysteresis thresholds and dwell delays (§4.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub threshold_w: f64,

    #[serde(default = "default_hysteresis_delay_secs")]
    pub delay_secs: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            threshold_w: 0.0,
            delay_secs: default_hysteresis_delay_secs(),
        }
    }
}

/// Logging/tracing configuration (ambient stack, §1).
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,
}

fn default_voltage_v() -> f64 {
    230.0
}
fn default_priority_soc() -> f64 {
    50.0
}
fn default_buffer_soc() -> f64 {
    95.0
}
fn default_max_grid_supply_while_battery_charging_w() -> f64 {
    f64::MAX
}
fn default_tick_interval_secs() -> u64 {
    10
}
fn default_grid_tariff_per_kwh() -> f64 {
    0.30
}
fn default_feed_in_tariff_per_kwh() -> f64 {
    0.08
}
fn default_mode() -> String {
    "off".to_string()
}
fn default_min_current_a() -> f64 {
    6.0
}
fn default_max_current_a() -> f64 {
    16.0
}
fn default_phases() -> u8 {
    3
}
fn default_target_soc() -> f64 {
    100.0
}
fn default_hysteresis_delay_secs() -> u64 {
    180
}
fn default_phase_switch_delay_secs() -> u64 {
    180
}
fn default_max_consecutive_failures() -> u32 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from TOML files and environment variables.
    ///
    /// Loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/<environment>.toml`, if an environment is given
    /// 3. Environment variables with an `OEC__` prefix
    pub fn load() -> Result<Self> {
        Self::load_with_env(None)
    }

    pub fn load_with_env(environment: Option<&str>) -> Result<Self> {
        // Best-effort: a missing .env is normal outside local development.
        let _ = dotenvy::dotenv();

        let mut figment = Figment::new().merge(Toml::file("config/default.toml"));

        if let Some(env) = environment {
            figment = figment.merge(Toml::file(format!("config/{env}.toml")));
        }

        figment = figment.merge(Env::prefixed("OEC__").split("__"));

        let config: AppConfig = figment.extract().context("failed to parse configuration")?;
        config.validate().context("configuration validation failed")?;
        Ok(config)
    }
}

pub type Config = AppConfig;
