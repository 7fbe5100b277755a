use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{auth::require_parent, tenant::TenantSlug},
    models::{
        absence::{AbsenceListQuery, AbsenceReason, AbsenceReport, AbsenceWithChild, ReportAbsenceRequest},
        auth::{ActorRef, AuthenticatedUser},
    },
    services::{absences::AbsenceService, attendance::AttendanceService, children::ChildService, metrics},
    AppState,
};

/// GET /portal/children — the parent's linked children with today's
/// attendance state, for the home screen.
pub async fn children(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    require_parent(&user)?;

    let children = ChildService::list_for_parent(&state.db, &tenant, user.user_id).await?;
    let mut entries = Vec::with_capacity(children.len());
    for child in children {
        let status = AttendanceService::status_for(&state.db, &tenant, child.id, None).await?;
        entries.push(json!({
            "child": child,
            "state": status.state,
            "record": status.record,
        }));
    }

    Ok(Json(json!({ "children": entries })))
}

/// GET /portal/absences?view=upcoming|past&child_id= — defaults to upcoming.
pub async fn list_absences(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Query(query): Query<AbsenceListQuery>,
) -> Result<Json<Vec<AbsenceWithChild>>, ApiError> {
    require_parent(&user)?;
    let absences =
        AbsenceService::list_for_parent(&state.db, &tenant, user.user_id, &query).await?;
    Ok(Json(absences))
}

/// POST /portal/absences — a parent announces an absence for a linked child.
pub async fn report_absence(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Json(body): Json<ReportAbsenceRequest>,
) -> Result<Json<AbsenceReport>, ApiError> {
    require_parent(&user)?;
    let report =
        AbsenceService::report(&state.db, &tenant, &body, ActorRef::Parent(user.user_id)).await?;
    metrics::ABSENCES_COUNTER
        .with_label_values(&[&tenant, "reported"])
        .inc();
    Ok(Json(report))
}

/// DELETE /portal/absences/{id} — cancel, only while still pending and not
/// fully in the past.
pub async fn cancel_absence(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
    Path(absence_id): Path<Uuid>,
) -> Result<Json<AbsenceReport>, ApiError> {
    require_parent(&user)?;
    let report = AbsenceService::cancel(&state.db, &tenant, absence_id, user.user_id).await?;
    metrics::ABSENCES_COUNTER
        .with_label_values(&[&tenant, "cancelled"])
        .inc();
    Ok(Json(report))
}

/// GET /portal/absence-reasons
pub async fn absence_reasons(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    user: AuthenticatedUser,
) -> Result<Json<Vec<AbsenceReason>>, ApiError> {
    require_parent(&user)?;
    let reasons = AbsenceService::reasons(&state.db, &tenant).await?;
    Ok(Json(reasons))
}
