#![allow(dead_code)]
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::{error::ApiError, response},
    auth::AuthBearer,
    config::Config,
    controller::AppState,
    domain::{LoadpointSettings, Mode, Phases, RemoteDemand},
};

/// A setter changes behavior out of band from the round robin; preempt the
/// site loop so the change takes effect on the next tick instead of waiting
/// for this loadpoint's turn to come back around (§5 "Rust mapping").
fn preempt(st: &AppState, lp: &crate::controller::loadpoint::LoadpointController) {
    st.site.request_preemption(lp.id.clone());
}

pub fn router(state: AppState, cfg: &Config) -> Router {
    Router::new()
        .route("/loadpoints", get(list_loadpoints))
        .route("/loadpoints/:id", get(get_loadpoint))
        .route("/loadpoints/:id/mode", put(set_mode))
        .route("/loadpoints/:id/min_current", put(set_min_current))
        .route("/loadpoints/:id/max_current", put(set_max_current))
        .route("/loadpoints/:id/phases", put(set_phases))
        .route("/loadpoints/:id/target_soc", put(set_target_soc))
        .route("/loadpoints/:id/min_soc", put(set_min_soc))
        .route("/loadpoints/:id/target_charge", put(set_target_charge))
        .route("/loadpoints/:id/remote_demand", put(set_remote_demand))
        .with_state(state)
        .layer(crate::auth::auth_layer(cfg.auth.token.clone()))
}

#[derive(Debug, Serialize)]
pub struct LoadpointView {
    pub id: String,
    pub settings: LoadpointSettings,
    pub status: crate::domain::ChargeStatus,
    pub current_phases: u8,
    pub charge_power_w: f64,
    pub charged_energy_wh: f64,
    pub vehicle_soc_percent: Option<f64>,
    pub safe_mode: bool,
}

fn view_of(lp: &crate::controller::loadpoint::LoadpointController) -> LoadpointView {
    let transient = lp.transient_snapshot();
    LoadpointView {
        id: lp.id.0.clone(),
        settings: lp.settings(),
        status: transient.status,
        current_phases: transient.current_phases,
        charge_power_w: transient.charge_power_w,
        charged_energy_wh: transient.charged_energy_wh,
        vehicle_soc_percent: transient.vehicle_soc_percent,
        safe_mode: transient.safe_mode,
    }
}

pub async fn list_loadpoints(
    State(st): State<AppState>,
    _auth: AuthBearer,
) -> impl IntoResponse {
    let views: Vec<LoadpointView> = st.loadpoints.iter().map(|lp| view_of(lp)).collect();
    response::success(views)
}

fn find_loadpoint<'a>(
    st: &'a AppState,
    id: &str,
) -> Result<&'a std::sync::Arc<crate::controller::loadpoint::LoadpointController>, ApiError> {
    st.loadpoint(id)
        .ok_or_else(|| ApiError::NotFound(format!("loadpoint {id}")))
}

pub async fn get_loadpoint(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    Ok(response::success(view_of(lp)))
}

#[derive(Debug, Deserialize)]
pub struct ModeBody {
    pub mode: Mode,
}

pub async fn set_mode(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
    Json(body): Json<ModeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    lp.set_mode(body.mode);
    preempt(&st, lp);
    Ok(response::success(view_of(lp)))
}

#[derive(Debug, Deserialize)]
pub struct AmpsBody {
    pub amps: f64,
}

pub async fn set_min_current(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
    Json(body): Json<AmpsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    lp.set_min_current(body.amps);
    preempt(&st, lp);
    Ok(response::success(view_of(lp)))
}

pub async fn set_max_current(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
    Json(body): Json<AmpsBody>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    lp.set_max_current(body.amps);
    preempt(&st, lp);
    Ok(response::success(view_of(lp)))
}

#[derive(Debug, Deserialize)]
pub struct PhasesBody {
    pub phases: Phases,
}

pub async fn set_phases(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
    Json(body): Json<PhasesBody>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    if matches!(body.phases, Phases::Auto) && !lp.supports_phase_switching() {
        return Err(ApiError::BadRequest(
            "auto phase switching requires a charger that reports phase switching support".to_string(),
        ));
    }
    lp.set_phases(body.phases);
    preempt(&st, lp);
    Ok(response::success(view_of(lp)))
}

#[derive(Debug, Deserialize)]
pub struct PercentBody {
    pub percent: f64,
}

pub async fn set_target_soc(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
    Json(body): Json<PercentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    if !(0.0..=100.0).contains(&body.percent) {
        return Err(ApiError::BadRequest("percent must be within 0..=100".to_string()));
    }
    lp.set_target_soc(body.percent);
    preempt(&st, lp);
    Ok(response::success(view_of(lp)))
}

pub async fn set_min_soc(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
    Json(body): Json<PercentBody>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    if !(0.0..=100.0).contains(&body.percent) {
        return Err(ApiError::BadRequest("percent must be within 0..=100".to_string()));
    }
    lp.set_min_soc(body.percent);
    preempt(&st, lp);
    Ok(response::success(view_of(lp)))
}

/// Deadline charge target (§4.2 Deadline planner): either a target energy,
/// a target time, or both. Omitted fields leave the corresponding setting
/// untouched.
#[derive(Debug, Deserialize)]
pub struct TargetChargeBody {
    #[serde(default)]
    pub target_energy_wh: Option<f64>,
    #[serde(default)]
    pub target_time: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn set_target_charge(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
    Json(body): Json<TargetChargeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    if let Some(at) = body.target_time {
        if at < chrono::Utc::now() {
            return Err(ApiError::BadRequest("target_time must not be in the past".to_string()));
        }
    }
    if let Some(wh) = body.target_energy_wh {
        lp.set_target_energy_wh(wh);
    }
    lp.set_target_time(body.target_time);
    preempt(&st, lp);
    Ok(response::success(view_of(lp)))
}

#[derive(Debug, Deserialize)]
pub struct RemoteDemandBody {
    pub demand: RemoteDemand,
}

pub async fn set_remote_demand(
    State(st): State<AppState>,
    _auth: AuthBearer,
    Path(id): Path<String>,
    Json(body): Json<RemoteDemandBody>,
) -> Result<impl IntoResponse, ApiError> {
    let lp = find_loadpoint(&st, &id)?;
    lp.set_remote_demand(body.demand);
    preempt(&st, lp);
    Ok(response::success(view_of(lp)))
}
