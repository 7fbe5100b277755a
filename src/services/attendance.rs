use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::tenant::{facility_today, schema_name},
    error::ApiError,
    models::{
        attendance::{
            AttendanceState, CheckinRecord, CheckinWithChild, ChildActionResult, ChildDayStatus,
            TodayOverview,
        },
        auth::ActorRef,
    },
    services::children::ChildService,
};

const RECENT_FEED_LIMIT: i64 = 20;

pub struct AttendanceService;

impl AttendanceService {
    /// Record a child's arrival for the facility-local today.
    ///
    /// One attendance record per child per day: a second check-in while the
    /// first is open, or after a checkout, is a Conflict. Two kiosks racing
    /// on the same child both pass the SELECT, and the partial unique index
    /// rejects the second INSERT with 23505.
    pub async fn check_in(
        pool: &PgPool,
        tenant: &str,
        child_id: Uuid,
        actor: ActorRef,
        notes: Option<&str>,
    ) -> Result<CheckinRecord, ApiError> {
        let today = facility_today(pool, tenant).await?;
        ChildService::get_active(pool, tenant, child_id).await?;
        Self::assert_actor_may_touch(pool, tenant, child_id, actor).await?;

        let schema = schema_name(tenant);
        let mut tx = pool.begin().await?;

        let existing = sqlx::query_as::<_, CheckinRecord>(&format!(
            r#"SELECT * FROM "{schema}".checkin_records
               WHERE child_id = $1 AND date = $2
               ORDER BY check_in_time DESC
               LIMIT 1
               FOR UPDATE"#
        ))
        .bind(child_id)
        .bind(today)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(record) = existing {
            return Err(match record.state() {
                AttendanceState::CheckedIn => {
                    ApiError::Conflict("Arrivée déjà enregistrée pour aujourd'hui".into())
                }
                _ => ApiError::Conflict(
                    "Un départ a déjà été enregistré pour aujourd'hui".into(),
                ),
            });
        }

        let record = sqlx::query_as::<_, CheckinRecord>(&format!(
            r#"INSERT INTO "{schema}".checkin_records
                   (child_id, date, check_in_time, checked_in_by, notes)
               VALUES ($1, $2, NOW(), $3, $4)
               RETURNING *"#
        ))
        .bind(child_id)
        .bind(today)
        .bind(actor.user_id())
        .bind(notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            ApiError::from(e)
                .duplicate_as_conflict("Arrivée déjà enregistrée pour aujourd'hui")
        })?;

        tx.commit().await?;
        Ok(record)
    }

    /// Close today's open record. Re-sending a checkout after the first one
    /// landed reads as NotFound (no open record), never as a second close.
    pub async fn check_out(
        pool: &PgPool,
        tenant: &str,
        child_id: Uuid,
        actor: ActorRef,
        notes: Option<&str>,
    ) -> Result<CheckinRecord, ApiError> {
        let today = facility_today(pool, tenant).await?;
        ChildService::get_active(pool, tenant, child_id).await?;
        Self::assert_actor_may_touch(pool, tenant, child_id, actor).await?;

        let schema = schema_name(tenant);
        let mut tx = pool.begin().await?;

        let open = sqlx::query_as::<_, CheckinRecord>(&format!(
            r#"SELECT * FROM "{schema}".checkin_records
               WHERE child_id = $1 AND date = $2 AND check_out_time IS NULL
               FOR UPDATE"#
        ))
        .bind(child_id)
        .bind(today)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Aucune arrivée ouverte pour aujourd'hui".into()))?;

        if Utc::now() <= open.check_in_time {
            return Err(ApiError::Validation(
                "L'heure de départ doit suivre l'heure d'arrivée".into(),
            ));
        }

        let record = sqlx::query_as::<_, CheckinRecord>(&format!(
            r#"UPDATE "{schema}".checkin_records
               SET check_out_time = NOW(),
                   checked_out_by = $2,
                   notes          = COALESCE($3, notes)
               WHERE id = $1
               RETURNING *"#
        ))
        .bind(open.id)
        .bind(actor.user_id())
        .bind(notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Kiosk batch arrival. Each child succeeds or fails on its own; one
    /// rejected child never blocks the siblings scanned with it.
    pub async fn check_in_many(
        pool: &PgPool,
        tenant: &str,
        child_ids: &[Uuid],
        actor: ActorRef,
        notes: Option<&str>,
    ) -> Result<Vec<ChildActionResult>, ApiError> {
        if child_ids.is_empty() {
            return Err(ApiError::Validation("Aucun enfant sélectionné".into()));
        }
        let mut results = Vec::with_capacity(child_ids.len());
        for &child_id in child_ids {
            match Self::check_in(pool, tenant, child_id, actor, notes).await {
                Ok(record) => results.push(ChildActionResult::success(child_id, record)),
                Err(e) => results.push(ChildActionResult::failure(child_id, &e)),
            }
        }
        Ok(results)
    }

    pub async fn check_out_many(
        pool: &PgPool,
        tenant: &str,
        child_ids: &[Uuid],
        actor: ActorRef,
        notes: Option<&str>,
    ) -> Result<Vec<ChildActionResult>, ApiError> {
        if child_ids.is_empty() {
            return Err(ApiError::Validation("Aucun enfant sélectionné".into()));
        }
        let mut results = Vec::with_capacity(child_ids.len());
        for &child_id in child_ids {
            match Self::check_out(pool, tenant, child_id, actor, notes).await {
                Ok(record) => results.push(ChildActionResult::success(child_id, record)),
                Err(e) => results.push(ChildActionResult::failure(child_id, &e)),
            }
        }
        Ok(results)
    }

    /// Tagged state of one child for a date (defaults to today). Derived once
    /// here; the UI and the reports both consume this, never the raw nulls.
    pub async fn status_for(
        pool: &PgPool,
        tenant: &str,
        child_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<ChildDayStatus, ApiError> {
        let date = match date {
            Some(d) => d,
            None => facility_today(pool, tenant).await?,
        };
        ChildService::get_active(pool, tenant, child_id).await?;

        let schema = schema_name(tenant);
        let record = sqlx::query_as::<_, CheckinRecord>(&format!(
            r#"SELECT * FROM "{schema}".checkin_records
               WHERE child_id = $1 AND date = $2
               ORDER BY check_in_time DESC
               LIMIT 1"#
        ))
        .bind(child_id)
        .bind(date)
        .fetch_optional(pool)
        .await?;

        let state = record
            .as_ref()
            .map(CheckinRecord::state)
            .unwrap_or(AttendanceState::NotCheckedIn);

        Ok(ChildDayStatus {
            child_id,
            date,
            state,
            record,
        })
    }

    /// All check-ins of a date joined with child identity, oldest first.
    pub async fn checkins_for_date(
        pool: &PgPool,
        tenant: &str,
        date: NaiveDate,
    ) -> Result<Vec<CheckinWithChild>, ApiError> {
        let schema = schema_name(tenant);
        let rows = sqlx::query_as::<_, CheckinWithChild>(&format!(
            r#"SELECT r.id, r.child_id, c.first_name, c.last_name, c.program,
                      r.date, r.check_in_time, r.check_out_time, r.notes
               FROM "{schema}".checkin_records r
               JOIN "{schema}".children c ON c.id = r.child_id
               WHERE r.date = $1
               ORDER BY r.check_in_time"#
        ))
        .bind(date)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Live counters + recent movements for the staff dashboard.
    pub async fn today_overview(pool: &PgPool, tenant: &str) -> Result<TodayOverview, ApiError> {
        let today = facility_today(pool, tenant).await?;
        let schema = schema_name(tenant);

        let active_children: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*)::BIGINT FROM "{schema}".children WHERE is_active = TRUE"#
        ))
        .fetch_one(pool)
        .await?;

        let absent: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(DISTINCT a.child_id)::BIGINT
               FROM "{schema}".absence_reports a
               JOIN "{schema}".children c ON c.id = a.child_id
               WHERE a.status <> 'cancelled'
                 AND c.is_active = TRUE
                 AND a.start_date <= $1
                 AND COALESCE(a.end_date, a.start_date) >= $1"#
        ))
        .bind(today)
        .fetch_one(pool)
        .await?;

        let (present, checked_out): (i64, i64) = sqlx::query_as(&format!(
            r#"SELECT
                   COUNT(*) FILTER (WHERE check_out_time IS NULL)::BIGINT,
                   COUNT(*) FILTER (WHERE check_out_time IS NOT NULL)::BIGINT
               FROM "{schema}".checkin_records
               WHERE date = $1"#
        ))
        .bind(today)
        .fetch_one(pool)
        .await?;

        let recent = sqlx::query_as::<_, CheckinWithChild>(&format!(
            r#"SELECT r.id, r.child_id, c.first_name, c.last_name, c.program,
                      r.date, r.check_in_time, r.check_out_time, r.notes
               FROM "{schema}".checkin_records r
               JOIN "{schema}".children c ON c.id = r.child_id
               WHERE r.date = $1
               ORDER BY GREATEST(r.check_in_time, COALESCE(r.check_out_time, r.check_in_time)) DESC
               LIMIT {RECENT_FEED_LIMIT}"#
        ))
        .bind(today)
        .fetch_all(pool)
        .await?;

        Ok(TodayOverview {
            date: today,
            expected: (active_children - absent).max(0),
            present,
            checked_out,
            absent,
            recent,
        })
    }

    /// Parents act only on their own children; staff on any child.
    async fn assert_actor_may_touch(
        pool: &PgPool,
        tenant: &str,
        child_id: Uuid,
        actor: ActorRef,
    ) -> Result<(), ApiError> {
        if let ActorRef::Parent(user_id) = actor {
            if !ChildService::is_parent_of(pool, tenant, child_id, user_id).await? {
                return Err(ApiError::Authorization(
                    "Cet enfant n'est pas associé à votre compte".into(),
                ));
            }
        }
        Ok(())
    }
}
