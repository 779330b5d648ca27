//! Route handlers.

use std::str::FromStr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::middleware::{ApiError, ApiResponse, Caller};
use super::AppState;
use crate::access::{Principal, Role};
use crate::oracle::{
    AggregateResult, DeviationReport, OracleStatistics, Source, SourceId, SourceSample,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// POST /sources
#[derive(Debug, Deserialize)]
pub struct AddSourceRequest {
    /// Source identifier
    pub id: String,
    /// Weight in basis points
    pub weight: u64,
    /// Maximum sample age in seconds
    pub max_staleness_secs: u64,
}

/// PUT /sources/:id/weight
#[derive(Debug, Deserialize)]
pub struct WeightRequest {
    /// New weight in basis points
    pub weight: u64,
}

/// PUT /sources/:id/active
#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    /// Desired state
    pub active: bool,
}

/// POST /deviation/check
#[derive(Debug, Deserialize)]
pub struct DeviationCheckRequest {
    /// Candidate price as a decimal string
    pub candidate: String,
}

/// PUT /deviation/threshold
#[derive(Debug, Deserialize)]
pub struct ThresholdRequest {
    /// New threshold in basis points
    pub threshold_bps: u64,
}

/// POST /roles/grant and /roles/revoke
#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    /// Role name
    pub role: String,
    /// Target principal
    pub principal: String,
}

/// GET /health
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" when the server answers
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Oracle statistics
    pub statistics: OracleStatistics,
}

// ═══════════════════════════════════════════════════════════════════════════════
// READS
// ═══════════════════════════════════════════════════════════════════════════════

/// GET /health
pub async fn health(State(oracle): State<AppState>) -> ApiResult<HealthResponse> {
    ok(HealthResponse {
        status: "ok",
        version: crate::VERSION,
        statistics: oracle.statistics(),
    })
}

/// GET /price
pub async fn get_price(State(oracle): State<AppState>) -> ApiResult<AggregateResult> {
    let result = oracle
        .latest_result()
        .ok_or(crate::error::Error::NoAggregatePrice)?;
    ok(result)
}

/// GET /prices
pub async fn get_prices(State(oracle): State<AppState>) -> ApiResult<Vec<SourceSample>> {
    ok(oracle.get_all_prices().await)
}

/// GET /sources
pub async fn list_sources(State(oracle): State<AppState>) -> ApiResult<Vec<Source>> {
    ok(oracle.sources())
}

/// GET /sources/:id
pub async fn get_source(
    State(oracle): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Source> {
    let source = oracle
        .get_config(&SourceId::new(id.as_str()))
        .ok_or(crate::error::Error::NotFound(id))?;
    ok(source)
}

/// POST /deviation/check
pub async fn check_deviation(
    State(oracle): State<AppState>,
    Json(req): Json<DeviationCheckRequest>,
) -> ApiResult<DeviationReport> {
    let candidate = Decimal::from_str(req.candidate.trim())
        .map_err(|e| ApiError::bad_request(format!("invalid candidate price: {}", e)))?;
    ok(oracle.check_deviation(candidate)?)
}

// ═══════════════════════════════════════════════════════════════════════════════
// GATED OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// POST /sources
pub async fn add_source(
    State(oracle): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<AddSourceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Source>>), ApiError> {
    let source = oracle
        .add_source(&ctx, SourceId::new(req.id), req.weight, req.max_staleness_secs)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(source))))
}

/// DELETE /sources/:id
pub async fn remove_source(
    State(oracle): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> ApiResult<Source> {
    ok(oracle.remove_source(&ctx, &SourceId::new(id)).await?)
}

/// PUT /sources/:id/weight
pub async fn update_weight(
    State(oracle): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(req): Json<WeightRequest>,
) -> ApiResult<Source> {
    let id = SourceId::new(id);
    oracle.update_weight(&ctx, &id, req.weight).await?;
    let source = oracle
        .get_config(&id)
        .ok_or_else(|| crate::error::Error::NotFound(id.to_string()))?;
    ok(source)
}

/// PUT /sources/:id/active
pub async fn set_active(
    State(oracle): State<AppState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    Json(req): Json<ActiveRequest>,
) -> ApiResult<bool> {
    ok(oracle
        .set_source_active(&ctx, &SourceId::new(id), req.active)
        .await?)
}

/// POST /recompute
pub async fn recompute(
    State(oracle): State<AppState>,
    Caller(ctx): Caller,
) -> ApiResult<AggregateResult> {
    ok(oracle.recompute_aggregate(&ctx).await?)
}

/// PUT /deviation/threshold
pub async fn update_threshold(
    State(oracle): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<ThresholdRequest>,
) -> ApiResult<u64> {
    oracle
        .update_deviation_threshold(&ctx, req.threshold_bps)
        .await?;
    ok(oracle.deviation_threshold())
}

/// POST /roles/grant
pub async fn grant_role(
    State(oracle): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<RoleRequest>,
) -> ApiResult<bool> {
    let role = Role::from_str(&req.role)?;
    ok(oracle
        .grant_role(&ctx, role, Principal::new(req.principal))
        .await?)
}

/// POST /roles/revoke
pub async fn revoke_role(
    State(oracle): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<RoleRequest>,
) -> ApiResult<bool> {
    let role = Role::from_str(&req.role)?;
    ok(oracle
        .revoke_role(&ctx, role, &Principal::new(req.principal))
        .await?)
}
