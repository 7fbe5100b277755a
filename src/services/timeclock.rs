use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    db::tenant::{day_bounds_utc, facility_timezone, schema_name},
    error::ApiError,
    models::timeclock::{
        derive_clock_status, AddPunchRequest, ClockStatus, EditPunchRequest, EmployeeClockRow,
        EntryType, TimeClockEntry, TodayBoard,
    },
    services::employees::EmployeeService,
};

/// entry_type is cast to TEXT on every fetch — the model carries it as a
/// String (schema-qualified enum OIDs confuse the runtime decoder).
const PUNCH_COLUMNS: &str = "id, employee_id, entry_type::TEXT AS entry_type, clock_in, \
     clock_out, was_adjusted, adjustment_reason, notes, created_at, updated_at";

pub struct TimeClockService;

impl TimeClockService {
    /// Open a shift punch. Refused while any punch is still open; the partial
    /// unique index backs the in-tx re-read against races.
    pub async fn clock_in(
        pool: &PgPool,
        tenant: &str,
        employee_id: Uuid,
    ) -> Result<TimeClockEntry, ApiError> {
        EmployeeService::get_active(pool, tenant, employee_id).await?;
        let schema = schema_name(tenant);
        let mut tx = pool.begin().await?;

        if Self::open_punch(&mut tx, &schema, employee_id).await?.is_some() {
            return Err(ApiError::Conflict(
                "Un pointage est déjà ouvert pour cet employé".into(),
            ));
        }

        let punch = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"INSERT INTO "{schema}".time_clock_entries (employee_id, entry_type, clock_in)
               VALUES ($1, 'shift', NOW())
               RETURNING {PUNCH_COLUMNS}"#
        ))
        .bind(employee_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            ApiError::from(e)
                .duplicate_as_conflict("Un pointage est déjà ouvert pour cet employé")
        })?;

        tx.commit().await?;
        Ok(punch)
    }

    /// Close the open punch, whichever type it is (clocking out during lunch
    /// ends the day from the lunch punch).
    pub async fn clock_out(
        pool: &PgPool,
        tenant: &str,
        employee_id: Uuid,
    ) -> Result<TimeClockEntry, ApiError> {
        EmployeeService::get_active(pool, tenant, employee_id).await?;
        let schema = schema_name(tenant);
        let mut tx = pool.begin().await?;

        let open = Self::open_punch(&mut tx, &schema, employee_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Aucun pointage ouvert".into()))?;

        if Utc::now() <= open.clock_in {
            return Err(ApiError::Validation(
                "L'heure de fin doit suivre l'heure de début".into(),
            ));
        }

        let punch = Self::close_punch(&mut tx, &schema, open.id).await?;
        tx.commit().await?;
        Ok(punch)
    }

    /// Close the open shift and open a lunch punch, atomically. Both run on
    /// the transaction timestamp, so the two intervals are exactly
    /// back-to-back.
    pub async fn start_lunch(
        pool: &PgPool,
        tenant: &str,
        employee_id: Uuid,
    ) -> Result<TimeClockEntry, ApiError> {
        EmployeeService::get_active(pool, tenant, employee_id).await?;
        let schema = schema_name(tenant);
        let mut tx = pool.begin().await?;

        let open = Self::open_punch(&mut tx, &schema, employee_id)
            .await?
            .ok_or_else(|| {
                ApiError::Conflict("Aucun quart ouvert — pointage requis avant la pause".into())
            })?;

        if open.kind() == EntryType::LunchBreak {
            return Err(ApiError::Conflict("Pause déjà en cours".into()));
        }
        if Utc::now() <= open.clock_in {
            return Err(ApiError::Validation(
                "L'heure de fin doit suivre l'heure de début".into(),
            ));
        }

        Self::close_punch(&mut tx, &schema, open.id).await?;
        let lunch = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"INSERT INTO "{schema}".time_clock_entries (employee_id, entry_type, clock_in)
               VALUES ($1, 'lunch_break', NOW())
               RETURNING {PUNCH_COLUMNS}"#
        ))
        .bind(employee_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ApiError::from(e).duplicate_as_conflict("Pause déjà en cours"))?;

        tx.commit().await?;
        Ok(lunch)
    }

    /// Close the open lunch punch and reopen a shift punch — back on the
    /// clock.
    pub async fn end_lunch(
        pool: &PgPool,
        tenant: &str,
        employee_id: Uuid,
    ) -> Result<TimeClockEntry, ApiError> {
        EmployeeService::get_active(pool, tenant, employee_id).await?;
        let schema = schema_name(tenant);
        let mut tx = pool.begin().await?;

        let open = Self::open_punch(&mut tx, &schema, employee_id).await?;
        let lunch = match open {
            Some(p) if p.kind() == EntryType::LunchBreak => p,
            _ => return Err(ApiError::NotFound("Aucune pause en cours".into())),
        };

        if Utc::now() <= lunch.clock_in {
            return Err(ApiError::Validation(
                "L'heure de fin doit suivre l'heure de début".into(),
            ));
        }

        Self::close_punch(&mut tx, &schema, lunch.id).await?;
        let shift = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"INSERT INTO "{schema}".time_clock_entries (employee_id, entry_type, clock_in)
               VALUES ($1, 'shift', NOW())
               RETURNING {PUNCH_COLUMNS}"#
        ))
        .bind(employee_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            ApiError::from(e)
                .duplicate_as_conflict("Un pointage est déjà ouvert pour cet employé")
        })?;

        tx.commit().await?;
        Ok(shift)
    }

    /// Admin backfill of a forgotten punch. The new interval must not touch
    /// any existing punch of the employee (open punches run until now).
    pub async fn add_punch(
        pool: &PgPool,
        tenant: &str,
        req: &AddPunchRequest,
    ) -> Result<TimeClockEntry, ApiError> {
        EmployeeService::get_active(pool, tenant, req.employee_id).await?;

        let entry_type = match req.entry_type.as_deref() {
            None => EntryType::Shift,
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::Validation(format!("Type de pointage invalide: {raw}")))?,
        };
        if let Some(out) = req.clock_out {
            if out <= req.clock_in {
                return Err(ApiError::Validation(
                    "L'heure de fin doit suivre l'heure de début".into(),
                ));
            }
        }

        let schema = schema_name(tenant);
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let candidates = Self::overlap_candidates(
            &mut tx,
            &schema,
            req.employee_id,
            req.clock_in,
            req.clock_out,
            now,
            None,
        )
        .await?;
        if let Some(hit) = first_overlap(&candidates, req.clock_in, req.clock_out, now) {
            return Err(ApiError::Conflict(format!(
                "Ce pointage chevauche un pointage existant (début {})",
                hit.clock_in.format("%Y-%m-%d %H:%M")
            )));
        }

        let punch = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"INSERT INTO "{schema}".time_clock_entries
                   (employee_id, entry_type, clock_in, clock_out, notes)
               VALUES ($1, $2::"{schema}".punch_type, $3, $4, $5)
               RETURNING {PUNCH_COLUMNS}"#
        ))
        .bind(req.employee_id)
        .bind(entry_type.to_string())
        .bind(req.clock_in)
        .bind(req.clock_out)
        .bind(&req.notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            ApiError::from(e)
                .duplicate_as_conflict("Un pointage est déjà ouvert pour cet employé")
        })?;

        tx.commit().await?;
        Ok(punch)
    }

    /// Admin correction of a punch's bounds. An adjustment reason is
    /// mandatory; the row is flagged `was_adjusted` forever.
    pub async fn edit_punch(
        pool: &PgPool,
        tenant: &str,
        punch_id: Uuid,
        req: &EditPunchRequest,
    ) -> Result<TimeClockEntry, ApiError> {
        let reason = req
            .adjustment_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                ApiError::Validation("Le motif de l'ajustement est requis".into())
            })?;

        let schema = schema_name(tenant);
        let now = Utc::now();
        let mut tx = pool.begin().await?;

        let punch = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"SELECT {PUNCH_COLUMNS} FROM "{schema}".time_clock_entries
               WHERE id = $1
               FOR UPDATE"#
        ))
        .bind(punch_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Pointage introuvable".into()))?;

        let new_in = req.clock_in.unwrap_or(punch.clock_in);
        let new_out = req.clock_out.or(punch.clock_out);
        if let Some(out) = new_out {
            if out <= new_in {
                return Err(ApiError::Validation(
                    "L'heure de fin doit suivre l'heure de début".into(),
                ));
            }
        }

        let candidates = Self::overlap_candidates(
            &mut tx,
            &schema,
            punch.employee_id,
            new_in,
            new_out,
            now,
            Some(punch_id),
        )
        .await?;
        if let Some(hit) = first_overlap(&candidates, new_in, new_out, now) {
            return Err(ApiError::Conflict(format!(
                "Ce pointage chevauche un pointage existant (début {})",
                hit.clock_in.format("%Y-%m-%d %H:%M")
            )));
        }

        let updated = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"UPDATE "{schema}".time_clock_entries
               SET clock_in = $2,
                   clock_out = $3,
                   was_adjusted = TRUE,
                   adjustment_reason = $4
               WHERE id = $1
               RETURNING {PUNCH_COLUMNS}"#
        ))
        .bind(punch_id)
        .bind(new_in)
        .bind(new_out)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Hard delete. The adjustment reason on edits is the only audit surface;
    /// deletions leave none, which is the accepted trade-off here.
    pub async fn delete_punch(
        pool: &PgPool,
        tenant: &str,
        punch_id: Uuid,
    ) -> Result<(), ApiError> {
        let schema = schema_name(tenant);
        let deleted: Option<Uuid> = sqlx::query_scalar(&format!(
            r#"DELETE FROM "{schema}".time_clock_entries WHERE id = $1 RETURNING id"#
        ))
        .bind(punch_id)
        .fetch_optional(pool)
        .await?;
        deleted
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound("Pointage introuvable".into()))
    }

    /// Status + relevant punches for one employee: today's punches plus any
    /// still-open punch from an earlier day (a forgotten open punch keeps the
    /// employee "clocked in" until someone closes it).
    pub async fn current_status(
        pool: &PgPool,
        tenant: &str,
        employee_id: Uuid,
    ) -> Result<(ClockStatus, Vec<TimeClockEntry>), ApiError> {
        EmployeeService::get_active(pool, tenant, employee_id).await?;
        let punches = Self::live_punches(pool, tenant, Some(employee_id)).await?;
        let status = derive_clock_status(&punches);
        Ok((status, punches))
    }

    /// Live board for the staff screen: every active employee with status and
    /// punches.
    pub async fn today_board(pool: &PgPool, tenant: &str) -> Result<TodayBoard, ApiError> {
        let tz = facility_timezone(pool, tenant).await?;
        let today = Utc::now().with_timezone(&tz).date_naive();

        let employees = EmployeeService::list(pool, tenant).await?;
        let punches = Self::live_punches(pool, tenant, None).await?;

        let mut by_employee: std::collections::HashMap<Uuid, Vec<TimeClockEntry>> =
            std::collections::HashMap::new();
        for p in punches {
            by_employee.entry(p.employee_id).or_default().push(p);
        }

        let mut rows = Vec::with_capacity(employees.len());
        for e in employees {
            let theirs = by_employee.remove(&e.id).unwrap_or_default();
            rows.push(EmployeeClockRow {
                employee_id: e.id,
                first_name: e.first_name,
                last_name: e.last_name,
                position: e.position,
                status: derive_clock_status(&theirs),
                punches: theirs,
            });
        }

        Ok(TodayBoard {
            date: today,
            employees: rows,
        })
    }

    /// All punches whose local day (by clock_in) is `date` — the aggregator's
    /// feed. Overnight punches belong to the day they started.
    pub async fn punches_for_date(
        pool: &PgPool,
        tenant: &str,
        date: NaiveDate,
    ) -> Result<Vec<TimeClockEntry>, ApiError> {
        let tz = facility_timezone(pool, tenant).await?;
        let (start, end) = day_bounds_utc(date, tz);
        let schema = schema_name(tenant);
        let punches = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"SELECT {PUNCH_COLUMNS} FROM "{schema}".time_clock_entries
               WHERE clock_in >= $1 AND clock_in < $2
               ORDER BY clock_in"#
        ))
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;
        Ok(punches)
    }

    /// Today's punches plus open punches from any day, optionally for one
    /// employee.
    async fn live_punches(
        pool: &PgPool,
        tenant: &str,
        employee_id: Option<Uuid>,
    ) -> Result<Vec<TimeClockEntry>, ApiError> {
        let tz = facility_timezone(pool, tenant).await?;
        let today = Utc::now().with_timezone(&tz).date_naive();
        let (start, end) = day_bounds_utc(today, tz);
        let schema = schema_name(tenant);

        let punches = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"SELECT {PUNCH_COLUMNS} FROM "{schema}".time_clock_entries
               WHERE ($1::UUID IS NULL OR employee_id = $1)
                 AND (clock_out IS NULL OR (clock_in >= $2 AND clock_in < $3))
               ORDER BY clock_in"#
        ))
        .bind(employee_id)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;
        Ok(punches)
    }

    async fn open_punch(
        tx: &mut Transaction<'_, Postgres>,
        schema: &str,
        employee_id: Uuid,
    ) -> Result<Option<TimeClockEntry>, ApiError> {
        let punch = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"SELECT {PUNCH_COLUMNS} FROM "{schema}".time_clock_entries
               WHERE employee_id = $1 AND clock_out IS NULL
               FOR UPDATE"#
        ))
        .bind(employee_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(punch)
    }

    async fn close_punch(
        tx: &mut Transaction<'_, Postgres>,
        schema: &str,
        punch_id: Uuid,
    ) -> Result<TimeClockEntry, ApiError> {
        let punch = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"UPDATE "{schema}".time_clock_entries
               SET clock_out = NOW()
               WHERE id = $1
               RETURNING {PUNCH_COLUMNS}"#
        ))
        .bind(punch_id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(punch)
    }

    /// Punches that could overlap `[start, end-or-now)`, locked for the
    /// duration of the transaction.
    async fn overlap_candidates(
        tx: &mut Transaction<'_, Postgres>,
        schema: &str,
        employee_id: Uuid,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Vec<TimeClockEntry>, ApiError> {
        let punches = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"SELECT {PUNCH_COLUMNS} FROM "{schema}".time_clock_entries
               WHERE employee_id = $1
                 AND ($2::UUID IS NULL OR id <> $2)
                 AND clock_in < $3
                 AND COALESCE(clock_out, $4) > $5
               FOR UPDATE"#
        ))
        .bind(employee_id)
        .bind(exclude)
        .bind(end.unwrap_or(now))
        .bind(now)
        .bind(start)
        .fetch_all(&mut **tx)
        .await?;
        Ok(punches)
    }
}

/// Half-open overlap test: a punch occupies `[clock_in, clock_out-or-now)`.
/// Back-to-back punches (a shift ending exactly when the lunch starts) do not
/// overlap. Returns the first conflicting punch.
pub fn first_overlap<'a>(
    punches: &'a [TimeClockEntry],
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<&'a TimeClockEntry> {
    let new_end = end.unwrap_or(now);
    punches.iter().find(|p| {
        let p_end = p.clock_out.unwrap_or(now);
        p.clock_in < new_end && start < p_end
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    fn punch(in_t: DateTime<Utc>, out_t: Option<DateTime<Utc>>) -> TimeClockEntry {
        let now = Utc::now();
        TimeClockEntry {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            entry_type: "shift".to_string(),
            clock_in: in_t,
            clock_out: out_t,
            was_adjusted: false,
            adjustment_reason: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_back_to_back_punches_do_not_overlap() {
        // Quart 8h-12h, nouveau pointage 12h-13h: bord à bord, accepté
        let existing = vec![punch(at(8, 0), Some(at(12, 0)))];
        assert!(first_overlap(&existing, at(12, 0), Some(at(13, 0)), at(18, 0)).is_none());
        assert!(first_overlap(&existing, at(7, 0), Some(at(8, 0)), at(18, 0)).is_none());
    }

    #[test]
    fn test_contained_interval_overlaps() {
        let existing = vec![punch(at(8, 0), Some(at(17, 0)))];
        assert!(first_overlap(&existing, at(9, 0), Some(at(10, 0)), at(18, 0)).is_some());
    }

    #[test]
    fn test_partial_overlap_detected() {
        let existing = vec![punch(at(8, 0), Some(at(12, 0)))];
        assert!(first_overlap(&existing, at(11, 0), Some(at(14, 0)), at(18, 0)).is_some());
        assert!(first_overlap(&existing, at(6, 0), Some(at(8, 30)), at(18, 0)).is_some());
    }

    #[test]
    fn test_open_punch_runs_until_now() {
        // Pointage ouvert depuis 8h, maintenant 15h: occupe [8h, 15h)
        let existing = vec![punch(at(8, 0), None)];
        assert!(first_overlap(&existing, at(12, 0), Some(at(13, 0)), at(15, 0)).is_some());
        // Un intervalle entièrement après "maintenant" ne touche à rien
        assert!(first_overlap(&existing, at(16, 0), Some(at(17, 0)), at(15, 0)).is_none());
    }

    #[test]
    fn test_new_open_interval_vs_closed_history() {
        // Nouveau pointage ouvert à 14h (maintenant 15h) vs quart fermé le matin
        let existing = vec![punch(at(8, 0), Some(at(12, 0)))];
        assert!(first_overlap(&existing, at(14, 0), None, at(15, 0)).is_none());
        assert!(first_overlap(&existing, at(11, 0), None, at(15, 0)).is_some());
    }
}
