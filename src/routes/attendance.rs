use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{auth::require_staff, tenant::TenantSlug},
    models::{
        absence::{AbsenceListQuery, AbsenceReason, AbsenceReport, AbsenceWithChild, ReportAbsenceRequest},
        attendance::{AttendanceStatusQuery, ChildDayStatus, TodayOverview},
        auth::{ActorRef, AuthenticatedUser},
        reports::{DailyAttendanceReport, ReportDateQuery},
    },
    services::{
        absences::AbsenceService, attendance::AttendanceService, children::ChildService, metrics,
        reports::ReportService,
    },
    AppState,
};

/// GET /attendance/today — live dashboard numbers for the staff tablet.
pub async fn today(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
) -> Result<Json<TodayOverview>, ApiError> {
    require_staff(&user)?;
    let overview = AttendanceService::today_overview(&state.db, &tenant).await?;
    Ok(Json(overview))
}

/// GET /attendance/status/{child_id}?date=
pub async fn child_status(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Path(child_id): Path<Uuid>,
    Query(query): Query<AttendanceStatusQuery>,
) -> Result<Json<ChildDayStatus>, ApiError> {
    require_staff(&user)?;
    let status = AttendanceService::status_for(&state.db, &tenant, child_id, query.date).await?;
    Ok(Json(status))
}

/// GET /attendance/absences?status=&child_id=&view=
pub async fn list_absences(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Query(query): Query<AbsenceListQuery>,
) -> Result<Json<Vec<AbsenceWithChild>>, ApiError> {
    require_staff(&user)?;
    let absences = AbsenceService::list(&state.db, &tenant, &query).await?;
    Ok(Json(absences))
}

/// POST /attendance/absences — staff reporting, including past-date backfill
/// (a parent called in sick and nobody touched the tablet).
pub async fn report_absence(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Json(body): Json<ReportAbsenceRequest>,
) -> Result<Json<AbsenceReport>, ApiError> {
    require_staff(&user)?;
    let report =
        AbsenceService::report(&state.db, &tenant, &body, ActorRef::Staff(user.user_id)).await?;
    metrics::ABSENCES_COUNTER
        .with_label_values(&[&tenant, "reported"])
        .inc();
    Ok(Json(report))
}

/// PUT /attendance/absences/{id}/acknowledge — idempotent; re-acknowledging
/// returns the row unchanged.
pub async fn acknowledge_absence(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Path(absence_id): Path<Uuid>,
) -> Result<Json<AbsenceReport>, ApiError> {
    require_staff(&user)?;
    let (report, newly_acknowledged) =
        AbsenceService::acknowledge(&state.db, &tenant, absence_id, user.user_id).await?;

    if newly_acknowledged {
        metrics::ABSENCES_COUNTER
            .with_label_values(&[&tenant, "acknowledged"])
            .inc();

        // Tell the parents the garderie saw their report.
        let pool = state.db.clone();
        let notifications = state.notifications.clone();
        let tenant = tenant.clone();
        let child_id = report.child_id;
        tokio::spawn(async move {
            let first_name = match ChildService::get_active(&pool, &tenant, child_id).await {
                Ok(c) => c.first_name,
                Err(_) => "Votre enfant".to_string(),
            };
            let body = format!("L'absence de {first_name} a été confirmée par la garderie.");
            let data = json!({ "type": "absence", "child_id": child_id, "status": "acknowledged" });
            if let Err(e) = notifications
                .notify_child_parents(&pool, &tenant, child_id, "Absence confirmée", &body, Some(data))
                .await
            {
                tracing::warn!("absence push failed for child {child_id}: {e}");
            }
        });
    }

    Ok(Json(report))
}

/// GET /attendance/absence-reasons — the fixed vocabulary for absence forms.
pub async fn absence_reasons(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
) -> Result<Json<Vec<AbsenceReason>>, ApiError> {
    require_staff(&user)?;
    let reasons = AbsenceService::reasons(&state.db, &tenant).await?;
    Ok(Json(reasons))
}

/// GET /attendance/report?date= — full daily attendance report, recomputed
/// from the rows on every call.
pub async fn daily_report(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Query(query): Query<ReportDateQuery>,
) -> Result<Json<DailyAttendanceReport>, ApiError> {
    require_staff(&user)?;
    let report = ReportService::daily_attendance(&state.db, &tenant, query.date).await?;
    Ok(Json(report))
}
