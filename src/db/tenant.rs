use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use sqlx::PgPool;

/// Fallback when a garderie has no usable timezone configured.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Montreal;

/// Provision a new per-tenant PostgreSQL schema with all required tables.
/// Called when a new garderie is created and re-run on every startup
/// (idempotent).
pub async fn provision_tenant_schema(pool: &PgPool, slug: &str) -> anyhow::Result<()> {
    let schema = schema_name(slug);

    // --- Create schema ---
    sqlx::raw_sql(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
        .execute(pool)
        .await?;

    // --- Enum: user_role ---
    sqlx::raw_sql(&format!(
        "DO $$ BEGIN
           IF NOT EXISTS (
             SELECT 1 FROM pg_type t
             JOIN pg_namespace n ON n.oid = t.typnamespace
             WHERE t.typname = 'user_role' AND n.nspname = '{schema}'
           ) THEN
             CREATE TYPE \"{schema}\".user_role AS ENUM
               ('super_admin','admin_garderie','educateur','parent');
           END IF;
         END $$"
    ))
    .execute(pool)
    .await?;

    // --- Users (accounts live here; tokens are issued by the identity service) ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".users (
            id         UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            email      VARCHAR(255) UNIQUE NOT NULL,
            first_name VARCHAR(128) NOT NULL,
            last_name  VARCHAR(128) NOT NULL,
            role       "{schema}".user_role NOT NULL DEFAULT 'parent',
            pin_hash   TEXT,
            is_active  BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    ))
    .execute(pool)
    .await?;

    // Ensure the column exists for existing tenant schemas (idempotent)
    sqlx::raw_sql(&format!(
        r#"ALTER TABLE "{schema}".users ADD COLUMN IF NOT EXISTS pin_hash TEXT"#
    ))
    .execute(pool)
    .await?;

    // --- Children ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".children (
            id         UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            first_name VARCHAR(128) NOT NULL,
            last_name  VARCHAR(128) NOT NULL,
            birth_date DATE NOT NULL,
            program    VARCHAR(128),
            is_active  BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    ))
    .execute(pool)
    .await?;

    // --- Child–parent link ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".child_parents (
            child_id     UUID NOT NULL REFERENCES "{schema}".children(id) ON DELETE CASCADE,
            user_id      UUID NOT NULL REFERENCES "{schema}".users(id)    ON DELETE CASCADE,
            relationship VARCHAR(64) NOT NULL DEFAULT 'parent',
            PRIMARY KEY (child_id, user_id)
        )"#
    ))
    .execute(pool)
    .await?;

    // --- Push tokens (mobile devices, one row per device) ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".push_tokens (
            id         UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            user_id    UUID NOT NULL REFERENCES "{schema}".users(id) ON DELETE CASCADE,
            platform   VARCHAR(16) NOT NULL,
            token      TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, token)
        )"#
    ))
    .execute(pool)
    .await?;

    // --- Employees ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".employees (
            id          UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            first_name  VARCHAR(128) NOT NULL,
            last_name   VARCHAR(128) NOT NULL,
            position    VARCHAR(128),
            hourly_rate DOUBLE PRECISION,
            pin_hash    TEXT,
            is_active   BOOLEAN NOT NULL DEFAULT TRUE,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    ))
    .execute(pool)
    .await?;

    // --- Check-in records ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".checkin_records (
            id             UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            child_id       UUID NOT NULL REFERENCES "{schema}".children(id) ON DELETE CASCADE,
            date           DATE NOT NULL,
            check_in_time  TIMESTAMPTZ NOT NULL,
            check_out_time TIMESTAMPTZ,
            checked_in_by  UUID NOT NULL REFERENCES "{schema}".users(id),
            checked_out_by UUID REFERENCES "{schema}".users(id),
            notes          TEXT,
            created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CHECK (check_out_time IS NULL OR check_out_time > check_in_time)
        )"#
    ))
    .execute(pool)
    .await?;

    // One open record per child per day; the losing writer of a check-in race
    // fails here with 23505.
    sqlx::raw_sql(&format!(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS checkin_records_open_idx
             ON "{schema}".checkin_records(child_id, date)
             WHERE check_out_time IS NULL;
           CREATE INDEX IF NOT EXISTS checkin_records_date_idx
             ON "{schema}".checkin_records(date)"#
    ))
    .execute(pool)
    .await?;

    // --- Absence reasons (fixed vocabulary, seeded) ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".absence_reasons (
            id            UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            code          VARCHAR(32) UNIQUE NOT NULL,
            label         VARCHAR(128) NOT NULL,
            display_order SMALLINT NOT NULL DEFAULT 0,
            is_active     BOOLEAN NOT NULL DEFAULT TRUE,
            created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#
    ))
    .execute(pool)
    .await?;

    sqlx::raw_sql(&format!(
        r#"INSERT INTO "{schema}".absence_reasons (code, label, display_order) VALUES
             ('illness',  'Maladie',            1),
             ('vacation', 'Vacances',           2),
             ('medical',  'Rendez-vous médical', 3),
             ('family',   'Raison familiale',   4),
             ('other',    'Autre',              5)
           ON CONFLICT (code) DO NOTHING"#
    ))
    .execute(pool)
    .await?;

    // --- Enum: absence_status ---
    sqlx::raw_sql(&format!(
        "DO $$ BEGIN
           IF NOT EXISTS (
             SELECT 1 FROM pg_type t
             JOIN pg_namespace n ON n.oid = t.typnamespace
             WHERE t.typname = 'absence_status' AND n.nspname = '{schema}'
           ) THEN
             CREATE TYPE \"{schema}\".absence_status AS ENUM
               ('pending','acknowledged','cancelled');
           END IF;
         END $$"
    ))
    .execute(pool)
    .await?;

    // --- Absence reports ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".absence_reports (
            id                   UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            child_id             UUID NOT NULL REFERENCES "{schema}".children(id) ON DELETE CASCADE,
            reason_id            UUID NOT NULL REFERENCES "{schema}".absence_reasons(id),
            start_date           DATE NOT NULL,
            end_date             DATE,
            notes                TEXT,
            expected_return_date DATE,
            status               "{schema}".absence_status NOT NULL DEFAULT 'pending',
            reported_by          UUID NOT NULL REFERENCES "{schema}".users(id),
            acknowledged_by      UUID REFERENCES "{schema}".users(id),
            acknowledged_at      TIMESTAMPTZ,
            cancelled_at         TIMESTAMPTZ,
            created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CHECK (end_date IS NULL OR end_date >= start_date)
        )"#
    ))
    .execute(pool)
    .await?;

    sqlx::raw_sql(&format!(
        r#"CREATE INDEX IF NOT EXISTS absence_reports_child_idx
             ON "{schema}".absence_reports(child_id, start_date);
           CREATE INDEX IF NOT EXISTS absence_reports_status_idx
             ON "{schema}".absence_reports(status);
           CREATE INDEX IF NOT EXISTS absence_reports_dates_idx
             ON "{schema}".absence_reports(start_date, end_date)"#
    ))
    .execute(pool)
    .await?;

    // --- Enum: punch_type ---
    sqlx::raw_sql(&format!(
        "DO $$ BEGIN
           IF NOT EXISTS (
             SELECT 1 FROM pg_type t
             JOIN pg_namespace n ON n.oid = t.typnamespace
             WHERE t.typname = 'punch_type' AND n.nspname = '{schema}'
           ) THEN
             CREATE TYPE \"{schema}\".punch_type AS ENUM ('shift','lunch_break');
           END IF;
         END $$"
    ))
    .execute(pool)
    .await?;

    // --- Time clock entries ---
    sqlx::raw_sql(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{schema}".time_clock_entries (
            id                UUID PRIMARY KEY DEFAULT public.uuid_generate_v4(),
            employee_id       UUID NOT NULL REFERENCES "{schema}".employees(id) ON DELETE CASCADE,
            entry_type        "{schema}".punch_type NOT NULL DEFAULT 'shift',
            clock_in          TIMESTAMPTZ NOT NULL,
            clock_out         TIMESTAMPTZ,
            was_adjusted      BOOLEAN NOT NULL DEFAULT FALSE,
            adjustment_reason TEXT,
            notes             TEXT,
            created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CHECK (clock_out IS NULL OR clock_out > clock_in)
        )"#
    ))
    .execute(pool)
    .await?;

    // At most one open punch per employee, tenant-wide.
    sqlx::raw_sql(&format!(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS time_clock_open_idx
             ON "{schema}".time_clock_entries(employee_id)
             WHERE clock_out IS NULL;
           CREATE INDEX IF NOT EXISTS time_clock_employee_idx
             ON "{schema}".time_clock_entries(employee_id, clock_in)"#
    ))
    .execute(pool)
    .await?;

    // --- updated_at trigger function ---
    sqlx::raw_sql(&format!(
        r#"CREATE OR REPLACE FUNCTION "{schema}".update_updated_at()
           RETURNS TRIGGER AS $fn$
           BEGIN NEW.updated_at = NOW(); RETURN NEW; END;
           $fn$ LANGUAGE plpgsql"#
    ))
    .execute(pool)
    .await?;

    // --- Triggers (one per table, idempotent via DROP IF EXISTS + CREATE) ---
    for table in &[
        "users",
        "children",
        "employees",
        "checkin_records",
        "absence_reports",
        "time_clock_entries",
    ] {
        let trigger = format!("{table}_updated_at");
        sqlx::raw_sql(&format!(
            r#"DROP TRIGGER IF EXISTS "{trigger}" ON "{schema}"."{table}";
               CREATE TRIGGER "{trigger}"
               BEFORE UPDATE ON "{schema}"."{table}"
               FOR EACH ROW EXECUTE FUNCTION "{schema}".update_updated_at()"#
        ))
        .execute(pool)
        .await?;
    }

    tracing::info!("Provisioned tenant schema: {schema}");
    Ok(())
}

/// Returns the PostgreSQL schema name for a given garderie slug.
pub fn schema_name(slug: &str) -> String {
    format!("garderie_{}", slug.to_lowercase().replace('-', "_"))
}

/// Timezone configured for the garderie. Unknown or missing values fall back
/// to America/Montreal rather than failing the request.
pub async fn facility_timezone(pool: &PgPool, slug: &str) -> Result<Tz, sqlx::Error> {
    let tz_name: Option<String> =
        sqlx::query_scalar("SELECT timezone FROM public.garderies WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await?;

    Ok(tz_name
        .and_then(|name| {
            name.parse::<Tz>()
                .map_err(|_| tracing::warn!("Unknown timezone '{name}' for tenant {slug}"))
                .ok()
        })
        .unwrap_or(DEFAULT_TIMEZONE))
}

/// The garderie's current local date. Every "today" in the attendance domain
/// is this date, never the UTC one.
pub async fn facility_today(pool: &PgPool, slug: &str) -> Result<NaiveDate, sqlx::Error> {
    let tz = facility_timezone(pool, slug).await?;
    Ok(Utc::now().with_timezone(&tz).date_naive())
}

/// UTC instants bounding the facility-local day `[00:00, next 00:00)`.
pub fn day_bounds_utc(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    (local_midnight_utc(date, tz), local_midnight_utc(date + chrono::Duration::days(1), tz))
}

fn local_midnight_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    // earliest() handles DST transitions where local midnight is ambiguous
    // or skipped.
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Facility-local calendar day an instant falls on.
pub fn local_date_of(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mtl() -> Tz {
        chrono_tz::America::Montreal
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_day_bounds_winter() {
        // EST (UTC-5): minuit local = 05:00 UTC
        let (start, end) = day_bounds_utc(date("2026-01-15"), mtl());
        assert_eq!(start, utc("2026-01-15T05:00:00Z"));
        assert_eq!(end, utc("2026-01-16T05:00:00Z"));
    }

    #[test]
    fn test_day_bounds_spring_forward() {
        // 8 mars 2026: passage à l'heure avancée, journée de 23 h
        let (start, end) = day_bounds_utc(date("2026-03-08"), mtl());
        assert_eq!(start, utc("2026-03-08T05:00:00Z"));
        assert_eq!(end, utc("2026-03-09T04:00:00Z"));
        assert_eq!((end - start).num_hours(), 23);
    }

    #[test]
    fn test_day_bounds_fall_back() {
        // 1er novembre 2026: retour à l'heure normale, journée de 25 h
        let (start, end) = day_bounds_utc(date("2026-11-01"), mtl());
        assert_eq!(start, utc("2026-11-01T04:00:00Z"));
        assert_eq!(end, utc("2026-11-02T05:00:00Z"));
        assert_eq!((end - start).num_hours(), 25);
    }

    #[test]
    fn test_local_date_of_late_evening() {
        // 23h30 locale le 15 → encore le 15, même si c'est déjà le 16 en UTC
        assert_eq!(local_date_of(utc("2026-01-16T04:30:00Z"), mtl()), date("2026-01-15"));
        assert_eq!(local_date_of(utc("2026-01-16T05:00:00Z"), mtl()), date("2026-01-16"));
    }

    #[test]
    fn test_schema_name_normalizes_slug() {
        assert_eq!(schema_name("demo"), "garderie_demo");
        assert_eq!(schema_name("Les-Petits"), "garderie_les_petits");
    }
}
