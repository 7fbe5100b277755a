use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{
        auth::{require_admin, require_staff},
        idempotency::{self, IdempotencyKey},
        tenant::TenantSlug,
    },
    models::{
        auth::AuthenticatedUser,
        reports::{DailyEmployeeReport, ReportDateQuery, WeeklyRangeQuery, WeeklyReport},
        timeclock::{AddPunchRequest, EditPunchRequest, TimeClockEntry, TodayBoard},
    },
    services::{metrics, reports::ReportService, timeclock::TimeClockService},
    AppState,
};

/// GET /timeclock/today — who is in right now, with today's punches.
pub async fn today(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
) -> Result<Json<TodayBoard>, ApiError> {
    require_staff(&user)?;
    let board = TimeClockService::today_board(&state.db, &tenant).await?;
    Ok(Json(board))
}

/// GET /timeclock/daily-report?date=
pub async fn daily_report(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Query(query): Query<ReportDateQuery>,
) -> Result<Json<DailyEmployeeReport>, ApiError> {
    require_staff(&user)?;
    let report = ReportService::daily_employees(&state.db, &tenant, query.date).await?;
    Ok(Json(report))
}

/// GET /timeclock/weekly-report?start=&end= — capped at 62 days.
pub async fn weekly_report(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Query(query): Query<WeeklyRangeQuery>,
) -> Result<Json<WeeklyReport>, ApiError> {
    require_staff(&user)?;
    let report = ReportService::weekly(&state.db, &tenant, query.start, query.end).await?;
    Ok(Json(report))
}

/// POST /timeclock/entries — manual punch for a forgotten day (admin only).
pub async fn add_entry(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    IdempotencyKey(idem): IdempotencyKey,
    Json(body): Json<AddPunchRequest>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;

    if let Some(key) = &idem {
        let mut redis = state.redis.clone();
        if let Some(cached) = idempotency::fetch_cached(&mut redis, &tenant, key).await {
            return Ok(Json(cached));
        }
    }

    let punch = TimeClockService::add_punch(&state.db, &tenant, &body).await?;
    metrics::PUNCHES_COUNTER
        .with_label_values(&[&tenant, "manual_add"])
        .inc();

    let payload = json!(punch);
    if let Some(key) = &idem {
        let mut redis = state.redis.clone();
        idempotency::store_response(&mut redis, &tenant, key, &payload).await;
    }
    Ok(Json(payload))
}

/// PUT /timeclock/entries/{id} — admin correction; the adjustment reason is
/// mandatory.
pub async fn edit_entry(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Path(punch_id): Path<Uuid>,
    Json(body): Json<EditPunchRequest>,
) -> Result<Json<TimeClockEntry>, ApiError> {
    require_admin(&user)?;
    let punch = TimeClockService::edit_punch(&state.db, &tenant, punch_id, &body).await?;
    metrics::PUNCHES_COUNTER
        .with_label_values(&[&tenant, "manual_edit"])
        .inc();
    Ok(Json(punch))
}

/// DELETE /timeclock/entries/{id}
pub async fn delete_entry(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Path(punch_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&user)?;
    TimeClockService::delete_punch(&state.db, &tenant, punch_id).await?;
    metrics::PUNCHES_COUNTER
        .with_label_values(&[&tenant, "manual_delete"])
        .inc();
    Ok(Json(json!({ "success": true })))
}
