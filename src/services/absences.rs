use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::tenant::{facility_today, schema_name},
    error::ApiError,
    models::{
        absence::{
            AbsenceListQuery, AbsenceReason, AbsenceReport, AbsenceStatus, AbsenceWithChild,
            ReportAbsenceRequest,
        },
        auth::ActorRef,
    },
    services::children::ChildService,
};

const JOINED_COLUMNS: &str = r#"a.id, a.child_id, c.first_name, c.last_name,
       r.code AS reason_code, r.label AS reason_label,
       a.start_date, a.end_date, a.notes, a.expected_return_date,
       a.status::TEXT AS status, a.reported_by, a.acknowledged_at, a.created_at"#;

pub struct AbsenceService;

impl AbsenceService {
    /// File a new absence report (parent portal or staff backfill). Created
    /// `pending`; past dates are allowed so staff can regularize after the
    /// fact.
    pub async fn report(
        pool: &PgPool,
        tenant: &str,
        req: &ReportAbsenceRequest,
        actor: ActorRef,
    ) -> Result<AbsenceReport, ApiError> {
        if let Some(end) = req.end_date {
            if end < req.start_date {
                return Err(ApiError::Validation(
                    "La date de fin doit être égale ou postérieure à la date de début".into(),
                ));
            }
        }

        ChildService::get_active(pool, tenant, req.child_id).await?;
        if let ActorRef::Parent(user_id) = actor {
            if !ChildService::is_parent_of(pool, tenant, req.child_id, user_id).await? {
                return Err(ApiError::Authorization(
                    "Cet enfant n'est pas associé à votre compte".into(),
                ));
            }
        }

        let schema = schema_name(tenant);
        let reason_ok: bool = sqlx::query_scalar(&format!(
            r#"SELECT EXISTS(
                 SELECT 1 FROM "{schema}".absence_reasons
                 WHERE id = $1 AND is_active = TRUE
               )"#
        ))
        .bind(req.reason_id)
        .fetch_one(pool)
        .await?;
        if !reason_ok {
            return Err(ApiError::Validation("Motif d'absence invalide".into()));
        }

        let report = sqlx::query_as::<_, AbsenceReport>(&format!(
            r#"INSERT INTO "{schema}".absence_reports
                   (child_id, reason_id, start_date, end_date, notes,
                    expected_return_date, reported_by)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, child_id, reason_id, start_date, end_date, notes,
                         expected_return_date, status::TEXT AS status, reported_by,
                         acknowledged_by, acknowledged_at, cancelled_at,
                         created_at, updated_at"#
        ))
        .bind(req.child_id)
        .bind(req.reason_id)
        .bind(req.start_date)
        .bind(req.end_date)
        .bind(&req.notes)
        .bind(req.expected_return_date)
        .bind(actor.user_id())
        .fetch_one(pool)
        .await?;

        Ok(report)
    }

    /// `pending → acknowledged`, stamping who and when. Acknowledging twice
    /// is a no-op that returns the row unchanged; acknowledging a cancelled
    /// report is a Conflict. The bool reports whether this call did the
    /// transition (the caller notifies the parent only then).
    pub async fn acknowledge(
        pool: &PgPool,
        tenant: &str,
        absence_id: Uuid,
        staff_user_id: Uuid,
    ) -> Result<(AbsenceReport, bool), ApiError> {
        let schema = schema_name(tenant);
        let mut tx = pool.begin().await?;

        let report = sqlx::query_as::<_, AbsenceReport>(&format!(
            r#"SELECT id, child_id, reason_id, start_date, end_date, notes,
                      expected_return_date, status::TEXT AS status, reported_by,
                      acknowledged_by, acknowledged_at, cancelled_at,
                      created_at, updated_at
               FROM "{schema}".absence_reports
               WHERE id = $1
               FOR UPDATE"#
        ))
        .bind(absence_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Absence introuvable".into()))?;

        match report.status() {
            AbsenceStatus::Acknowledged => return Ok((report, false)),
            AbsenceStatus::Cancelled => {
                return Err(ApiError::Conflict(
                    "Impossible de confirmer une absence annulée".into(),
                ));
            }
            AbsenceStatus::Pending => {}
        }

        let updated = sqlx::query_as::<_, AbsenceReport>(&format!(
            r#"UPDATE "{schema}".absence_reports
               SET status = 'acknowledged',
                   acknowledged_by = $2,
                   acknowledged_at = NOW()
               WHERE id = $1
               RETURNING id, child_id, reason_id, start_date, end_date, notes,
                         expected_return_date, status::TEXT AS status, reported_by,
                         acknowledged_by, acknowledged_at, cancelled_at,
                         created_at, updated_at"#
        ))
        .bind(absence_id)
        .bind(staff_user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((updated, true))
    }

    /// Parent-side cancel. Only while still pending and not fully elapsed;
    /// anything else is a Conflict. A status change, never a delete.
    pub async fn cancel(
        pool: &PgPool,
        tenant: &str,
        absence_id: Uuid,
        parent_user_id: Uuid,
    ) -> Result<AbsenceReport, ApiError> {
        let today = facility_today(pool, tenant).await?;
        let schema = schema_name(tenant);
        let mut tx = pool.begin().await?;

        let report = sqlx::query_as::<_, AbsenceReport>(&format!(
            r#"SELECT id, child_id, reason_id, start_date, end_date, notes,
                      expected_return_date, status::TEXT AS status, reported_by,
                      acknowledged_by, acknowledged_at, cancelled_at,
                      created_at, updated_at
               FROM "{schema}".absence_reports
               WHERE id = $1
               FOR UPDATE"#
        ))
        .bind(absence_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Absence introuvable".into()))?;

        if !ChildService::is_parent_of(pool, tenant, report.child_id, parent_user_id).await? {
            return Err(ApiError::Authorization(
                "Cette absence ne concerne pas vos enfants".into(),
            ));
        }

        if !report.cancellable_on(today) {
            return Err(ApiError::Conflict(
                "Impossible d'annuler une absence passée ou déjà confirmée".into(),
            ));
        }

        let updated = sqlx::query_as::<_, AbsenceReport>(&format!(
            r#"UPDATE "{schema}".absence_reports
               SET status = 'cancelled',
                   cancelled_at = NOW()
               WHERE id = $1
               RETURNING id, child_id, reason_id, start_date, end_date, notes,
                         expected_return_date, status::TEXT AS status, reported_by,
                         acknowledged_by, acknowledged_at, cancelled_at,
                         created_at, updated_at"#
        ))
        .bind(absence_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Staff list with optional status / child / view filters.
    pub async fn list(
        pool: &PgPool,
        tenant: &str,
        query: &AbsenceListQuery,
    ) -> Result<Vec<AbsenceWithChild>, ApiError> {
        let status_filter = Self::parse_status_filter(query.status.as_deref())?;
        let view = Self::parse_view(query.view.as_deref())?;
        let today = facility_today(pool, tenant).await?;
        let schema = schema_name(tenant);

        let (view_fragment, order) = match view {
            Some(View::Upcoming) => (
                "AND COALESCE(a.end_date, a.start_date) >= $3 AND a.status <> 'cancelled'",
                "a.start_date ASC, a.created_at DESC",
            ),
            Some(View::Past) => (
                "AND COALESCE(a.end_date, a.start_date) < $3 AND a.status <> 'cancelled'",
                "a.start_date DESC, a.created_at DESC",
            ),
            None => ("", "a.start_date DESC, a.created_at DESC"),
        };

        let sql = format!(
            r#"SELECT {JOINED_COLUMNS}
               FROM "{schema}".absence_reports a
               JOIN "{schema}".children c ON c.id = a.child_id
               JOIN "{schema}".absence_reasons r ON r.id = a.reason_id
               WHERE ($1::TEXT IS NULL OR a.status::TEXT = $1)
                 AND ($2::UUID IS NULL OR a.child_id = $2)
                 {view_fragment}
               ORDER BY {order}"#
        );

        let mut q = sqlx::query_as::<_, AbsenceWithChild>(&sql)
            .bind(status_filter.map(|s| s.to_string()))
            .bind(query.child_id);
        if view.is_some() {
            q = q.bind(today);
        }
        Ok(q.fetch_all(pool).await?)
    }

    /// Portal list: same filters, restricted to the parent's linked children.
    /// Defaults to the upcoming view.
    pub async fn list_for_parent(
        pool: &PgPool,
        tenant: &str,
        parent_id: Uuid,
        query: &AbsenceListQuery,
    ) -> Result<Vec<AbsenceWithChild>, ApiError> {
        let view = Self::parse_view(query.view.as_deref())?.unwrap_or(View::Upcoming);
        let today = facility_today(pool, tenant).await?;
        let schema = schema_name(tenant);

        let (view_fragment, order) = match view {
            View::Upcoming => (
                "AND COALESCE(a.end_date, a.start_date) >= $3 AND a.status <> 'cancelled'",
                "a.start_date ASC, a.created_at DESC",
            ),
            View::Past => (
                "AND COALESCE(a.end_date, a.start_date) < $3 AND a.status <> 'cancelled'",
                "a.start_date DESC, a.created_at DESC",
            ),
        };

        let sql = format!(
            r#"SELECT {JOINED_COLUMNS}
               FROM "{schema}".absence_reports a
               JOIN "{schema}".children c ON c.id = a.child_id
               JOIN "{schema}".absence_reasons r ON r.id = a.reason_id
               WHERE a.child_id IN (
                   SELECT child_id FROM "{schema}".child_parents WHERE user_id = $1
                 )
                 AND ($2::UUID IS NULL OR a.child_id = $2)
                 {view_fragment}
               ORDER BY {order}"#
        );

        let rows = sqlx::query_as::<_, AbsenceWithChild>(&sql)
            .bind(parent_id)
            .bind(query.child_id)
            .bind(today)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    /// Fixed vocabulary for the report form.
    pub async fn reasons(pool: &PgPool, tenant: &str) -> Result<Vec<AbsenceReason>, ApiError> {
        let schema = schema_name(tenant);
        let reasons = sqlx::query_as::<_, AbsenceReason>(&format!(
            r#"SELECT * FROM "{schema}".absence_reasons
               WHERE is_active = TRUE
               ORDER BY display_order, label"#
        ))
        .fetch_all(pool)
        .await?;
        Ok(reasons)
    }

    /// Non-cancelled reports covering `date`, for the daily report.
    pub async fn covering_date(
        pool: &PgPool,
        tenant: &str,
        date: chrono::NaiveDate,
    ) -> Result<Vec<AbsenceWithChild>, ApiError> {
        let schema = schema_name(tenant);
        let rows = sqlx::query_as::<_, AbsenceWithChild>(&format!(
            r#"SELECT {JOINED_COLUMNS}
               FROM "{schema}".absence_reports a
               JOIN "{schema}".children c ON c.id = a.child_id
               JOIN "{schema}".absence_reasons r ON r.id = a.reason_id
               WHERE a.status <> 'cancelled'
                 AND c.is_active = TRUE
                 AND a.start_date <= $1
                 AND COALESCE(a.end_date, a.start_date) >= $1
               ORDER BY c.last_name, c.first_name"#
        ))
        .bind(date)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    fn parse_status_filter(raw: Option<&str>) -> Result<Option<AbsenceStatus>, ApiError> {
        match raw {
            None => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|_| ApiError::Validation(format!("Statut invalide: {s}"))),
        }
    }

    fn parse_view(raw: Option<&str>) -> Result<Option<View>, ApiError> {
        match raw {
            None => Ok(None),
            Some("upcoming") => Ok(Some(View::Upcoming)),
            Some("past") => Ok(Some(View::Past)),
            Some(v) => Err(ApiError::Validation(format!(
                "Vue invalide: {v} (attendu: upcoming ou past)"
            ))),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum View {
    Upcoming,
    Past,
}
