use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{
        idempotency::{self, IdempotencyKey},
        rate_limit::check_rate_limit,
        tenant::TenantSlug,
    },
    models::{
        attendance::KioskAttendanceRequest,
        auth::ActorRef,
        timeclock::{ClockStatus, EmployeePunchRequest},
        user::User,
    },
    services::{
        actor_gateway::{ActorGateway, ResolvedPin},
        attendance::AttendanceService,
        children::ChildService,
        metrics,
        timeclock::TimeClockService,
    },
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct VerifyPinRequest {
    pub pin: String,
}

/// Extracts the real client IP from nginx-forwarded headers.
/// Priority: X-Real-IP (set by nginx from CF-Connecting-IP) → first X-Forwarded-For.
fn real_ip(headers: &HeaderMap) -> String {
    if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return ip.to_string();
    }
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            return first.trim().to_string();
        }
    }
    "unknown".to_string()
}

/// Kiosk PIN attempts are throttled per tenant + client address.
async fn limit_pin_attempts(
    state: &AppState,
    tenant: &str,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    let ip = real_ip(headers);
    let key = format!("rate:pin:{tenant}:{ip}");
    let mut redis = state.redis.clone();
    check_rate_limit(
        &mut redis,
        &key,
        state.config.kiosk_pin_max_attempts,
        state.config.kiosk_pin_window_secs,
    )
    .await
}

async fn resolve_pin_counted(
    state: &AppState,
    tenant: &str,
    pin: &str,
) -> Result<ResolvedPin, ApiError> {
    match ActorGateway::resolve_pin(&state.db, tenant, pin).await {
        Ok(resolved) => {
            metrics::PIN_ATTEMPTS_COUNTER
                .with_label_values(&[tenant, "ok"])
                .inc();
            Ok(resolved)
        }
        Err(e) => {
            metrics::PIN_ATTEMPTS_COUNTER
                .with_label_values(&[tenant, "rejected"])
                .inc();
            Err(e)
        }
    }
}

/// POST /kiosk/verify-pin — who does this PIN belong to? Returns the parent
/// profile (with linked children and their attendance state) and/or the
/// employee profile (with clock status); the kiosk screen disambiguates.
pub async fn verify_pin(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    headers: HeaderMap,
    Json(body): Json<VerifyPinRequest>,
) -> Result<Json<Value>, ApiError> {
    limit_pin_attempts(&state, &tenant, &headers).await?;
    let resolved = resolve_pin_counted(&state, &tenant, &body.pin).await?;

    let parent = match resolved.user {
        Some(user) => Some(parent_payload(&state, &tenant, user).await?),
        None => None,
    };
    let employee = match resolved.employee {
        Some(e) => {
            let (status, punches) =
                TimeClockService::current_status(&state.db, &tenant, e.id).await?;
            Some(json!({ "employee": e, "status": status, "punches": punches }))
        }
        None => None,
    };

    Ok(Json(json!({ "parent": parent, "employee": employee })))
}

async fn parent_payload(state: &AppState, tenant: &str, user: User) -> Result<Value, ApiError> {
    let children = ChildService::list_for_parent(&state.db, tenant, user.id).await?;
    let mut entries = Vec::with_capacity(children.len());
    for child in children {
        let status = AttendanceService::status_for(&state.db, tenant, child.id, None).await?;
        entries.push(json!({
            "child": child,
            "state": status.state,
            "record": status.record,
        }));
    }
    Ok(json!({ "user": user, "children": entries }))
}

/// POST /kiosk/checkin — batch arrival for the parent's selected children.
pub async fn checkin(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    headers: HeaderMap,
    IdempotencyKey(idem): IdempotencyKey,
    Json(body): Json<KioskAttendanceRequest>,
) -> Result<Json<Value>, ApiError> {
    kiosk_attendance(&state, &tenant, &headers, idem, &body, true).await
}

/// POST /kiosk/checkout — batch departure.
pub async fn checkout(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    headers: HeaderMap,
    IdempotencyKey(idem): IdempotencyKey,
    Json(body): Json<KioskAttendanceRequest>,
) -> Result<Json<Value>, ApiError> {
    kiosk_attendance(&state, &tenant, &headers, idem, &body, false).await
}

async fn kiosk_attendance(
    state: &AppState,
    tenant: &str,
    headers: &HeaderMap,
    idem: Option<String>,
    body: &KioskAttendanceRequest,
    arriving: bool,
) -> Result<Json<Value>, ApiError> {
    limit_pin_attempts(state, tenant, headers).await?;

    let resolved = resolve_pin_counted(state, tenant, &body.pin).await?;
    let parent = resolved.user.ok_or_else(|| {
        ApiError::Authorization("Ce NIP n'est associé à aucun compte parent".into())
    })?;

    if let Some(key) = &idem {
        let mut redis = state.redis.clone();
        if let Some(cached) = idempotency::fetch_cached(&mut redis, tenant, key).await {
            return Ok(Json(cached));
        }
    }

    let actor = ActorRef::Parent(parent.id);
    let results = if arriving {
        AttendanceService::check_in_many(
            &state.db,
            tenant,
            &body.child_ids,
            actor,
            body.notes.as_deref(),
        )
        .await?
    } else {
        AttendanceService::check_out_many(
            &state.db,
            tenant,
            &body.child_ids,
            actor,
            body.notes.as_deref(),
        )
        .await?
    };

    let action = if arriving { "check_in" } else { "check_out" };
    for r in &results {
        if r.ok {
            metrics::CHECKINS_COUNTER
                .with_label_values(&[tenant, action])
                .inc();
            notify_attendance_change(state, tenant, r.child_id, arriving);
        }
    }

    let payload = json!({ "results": results });
    if let Some(key) = &idem {
        let mut redis = state.redis.clone();
        idempotency::store_response(&mut redis, tenant, key, &payload).await;
    }
    Ok(Json(payload))
}

/// Fire-and-forget push to the child's parents. Never blocks the kiosk
/// response.
fn notify_attendance_change(state: &AppState, tenant: &str, child_id: Uuid, arrived: bool) {
    let pool = state.db.clone();
    let notifications = state.notifications.clone();
    let tenant = tenant.to_string();
    tokio::spawn(async move {
        let first_name = match ChildService::get_active(&pool, &tenant, child_id).await {
            Ok(c) => c.first_name,
            Err(_) => "Votre enfant".to_string(),
        };
        let (title, body) = if arrived {
            ("Arrivée enregistrée", format!("{first_name} est à la garderie."))
        } else {
            ("Départ enregistré", format!("{first_name} a quitté la garderie."))
        };
        let state_label = if arrived { "checked_in" } else { "checked_out" };
        let data = json!({ "type": "attendance", "child_id": child_id, "state": state_label });
        if let Err(e) = notifications
            .notify_child_parents(&pool, &tenant, child_id, title, &body, Some(data))
            .await
        {
            tracing::warn!("attendance push failed for child {child_id}: {e}");
        }
    });
}

enum PunchAction {
    ClockIn,
    ClockOut,
    LunchStart,
    LunchEnd,
}

/// POST /kiosk/employee/clockin
pub async fn employee_clockin(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    headers: HeaderMap,
    IdempotencyKey(idem): IdempotencyKey,
    Json(body): Json<EmployeePunchRequest>,
) -> Result<Json<Value>, ApiError> {
    punch_action(&state, &tenant, &headers, idem, &body, PunchAction::ClockIn).await
}

/// POST /kiosk/employee/clockout
pub async fn employee_clockout(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    headers: HeaderMap,
    IdempotencyKey(idem): IdempotencyKey,
    Json(body): Json<EmployeePunchRequest>,
) -> Result<Json<Value>, ApiError> {
    punch_action(&state, &tenant, &headers, idem, &body, PunchAction::ClockOut).await
}

/// POST /kiosk/employee/lunch-start
pub async fn employee_lunch_start(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    headers: HeaderMap,
    IdempotencyKey(idem): IdempotencyKey,
    Json(body): Json<EmployeePunchRequest>,
) -> Result<Json<Value>, ApiError> {
    punch_action(&state, &tenant, &headers, idem, &body, PunchAction::LunchStart).await
}

/// POST /kiosk/employee/lunch-end
pub async fn employee_lunch_end(
    State(state): State<AppState>,
    TenantSlug(tenant): TenantSlug,
    headers: HeaderMap,
    IdempotencyKey(idem): IdempotencyKey,
    Json(body): Json<EmployeePunchRequest>,
) -> Result<Json<Value>, ApiError> {
    punch_action(&state, &tenant, &headers, idem, &body, PunchAction::LunchEnd).await
}

async fn punch_action(
    state: &AppState,
    tenant: &str,
    headers: &HeaderMap,
    idem: Option<String>,
    body: &EmployeePunchRequest,
    action: PunchAction,
) -> Result<Json<Value>, ApiError> {
    limit_pin_attempts(state, tenant, headers).await?;

    match ActorGateway::verify_employee_pin(&state.db, tenant, body.employee_id, &body.pin).await
    {
        Ok(_) => {
            metrics::PIN_ATTEMPTS_COUNTER
                .with_label_values(&[tenant, "ok"])
                .inc();
        }
        Err(e) => {
            metrics::PIN_ATTEMPTS_COUNTER
                .with_label_values(&[tenant, "rejected"])
                .inc();
            return Err(e);
        }
    }

    if let Some(key) = &idem {
        let mut redis = state.redis.clone();
        if let Some(cached) = idempotency::fetch_cached(&mut redis, tenant, key).await {
            return Ok(Json(cached));
        }
    }

    // The post-action status is fully determined by the action that just
    // succeeded.
    let (punch, status, metric) = match action {
        PunchAction::ClockIn => (
            TimeClockService::clock_in(&state.db, tenant, body.employee_id).await?,
            ClockStatus::ClockedIn,
            "clock_in",
        ),
        PunchAction::ClockOut => (
            TimeClockService::clock_out(&state.db, tenant, body.employee_id).await?,
            ClockStatus::ClockedOut,
            "clock_out",
        ),
        PunchAction::LunchStart => (
            TimeClockService::start_lunch(&state.db, tenant, body.employee_id).await?,
            ClockStatus::OnLunch,
            "lunch_start",
        ),
        PunchAction::LunchEnd => (
            TimeClockService::end_lunch(&state.db, tenant, body.employee_id).await?,
            ClockStatus::ClockedIn,
            "lunch_end",
        ),
    };

    metrics::PUNCHES_COUNTER
        .with_label_values(&[tenant, metric])
        .inc();

    let payload = json!({ "status": status, "punch": punch });
    if let Some(key) = &idem {
        let mut redis = state.redis.clone();
        idempotency::store_response(&mut redis, tenant, key, &payload).await;
    }
    Ok(Json(payload))
}
