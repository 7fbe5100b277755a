//! Demo tenant seed script
//!
//! Seeds a tenant with realistic French-language attendance data:
//! - Garderie: Garderie Les Petits Explorateurs (Démo), America/Montreal
//! - 4 users: 1 admin, 1 educateur, 2 parents (kiosk PIN for the parents)
//! - 10 children across 3 programs, with parent links
//! - 4 employees with kiosk PINs and hourly rates
//! - Two weeks of check-ins, absence reports and punches, plus a live "today"
//!   (children still present, one employee on lunch, one stale open punch)
//!
//! Usage:
//!   DATABASE_URL=... ./seed-demo [--tenant demo]

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::env;
use uuid::Uuid;

use pointage_api::db::tenant::{provision_tenant_schema, schema_name, DEFAULT_TIMEZONE};

#[derive(Parser)]
#[command(name = "seed-demo", about = "Seed a demo garderie with attendance data")]
struct Args {
    /// Tenant slug to (re)create
    #[arg(long, default_value = "demo")]
    tenant: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let slug = args.tenant;
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL required")?;

    println!("=== Seed Demo Tenant ({slug}) ===");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")?;

    let schema = schema_name(&slug);
    let tz = DEFAULT_TIMEZONE;
    let today = Utc::now().with_timezone(&tz).date_naive();
    let now = Utc::now();

    // 1. Clean existing tenant
    println!("Cleaning existing tenant...");
    sqlx::raw_sql(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"))
        .execute(&pool)
        .await
        .context("Failed to drop schema")?;
    sqlx::query("DELETE FROM public.garderies WHERE slug = $1")
        .bind(&slug)
        .execute(&pool)
        .await
        .context("Failed to delete garderie")?;

    // 2. Create garderie record
    println!("Creating garderie record...");
    sqlx::query(
        "INSERT INTO public.garderies (slug, name, timezone, is_active)
         VALUES ($1, 'Garderie Les Petits Explorateurs (Démo)', 'America/Montreal', TRUE)",
    )
    .bind(&slug)
    .execute(&pool)
    .await
    .context("Failed to insert garderie")?;

    // 3. Provision tenant schema (creates all tables, enums, triggers, reasons)
    println!("Provisioning tenant schema...");
    provision_tenant_schema(&pool, &slug)
        .await
        .context("Failed to provision tenant schema")?;

    // 4. Insert users (parents get a kiosk PIN; cost 10 for seed speed)
    println!("Inserting users...");
    let admin_id = Uuid::new_v4();
    let educateur_id = Uuid::new_v4();
    let parent1_id = Uuid::new_v4();
    let parent2_id = Uuid::new_v4();

    let users: [(Uuid, &str, &str, &str, &str, Option<&str>); 4] = [
        (admin_id,     "admin@demo.pointage.app",    "Marie",         "Tremblay", "admin_garderie", None),
        (educateur_id, "sophie@demo.pointage.app",   "Sophie",        "Gagnon",   "educateur",      None),
        (parent1_id,   "jean@demo.pointage.app",     "Jean-François", "Leblanc",  "parent",         Some("2468")),
        (parent2_id,   "isabelle@demo.pointage.app", "Isabelle",      "Roy",      "parent",         Some("1357")),
    ];

    for (id, email, first, last, role, pin) in &users {
        let pin_hash = match pin {
            Some(p) => Some(bcrypt::hash(p, 10).context("Failed to hash PIN")?),
            None => None,
        };
        sqlx::query(&format!(
            r#"INSERT INTO "{schema}".users (id, email, first_name, last_name, role, pin_hash)
               VALUES ($1, $2, $3, $4, $5::"{schema}".user_role, $6)"#
        ))
        .bind(id)
        .bind(email)
        .bind(first)
        .bind(last)
        .bind(role)
        .bind(pin_hash)
        .execute(&pool)
        .await
        .with_context(|| format!("Failed to insert user {email}"))?;
    }

    // 5. Insert children
    println!("Inserting children...");

    // (id, first_name, last_name, birth_date, program)
    let children: Vec<(Uuid, &str, &str, NaiveDate, &str)> = vec![
        // Poupons (0-18 mois)
        (Uuid::new_v4(), "Léa",      "Tremblay", today - Duration::days(180),  "Poupons"),
        (Uuid::new_v4(), "Emma",     "Gagnon",   today - Duration::days(250),  "Poupons"),
        (Uuid::new_v4(), "Lucas",    "Leblanc",  today - Duration::days(320),  "Poupons"),
        // Bambins (18 mois - 3 ans)
        (Uuid::new_v4(), "Noah",     "Roy",      today - Duration::days(600),  "Bambins"),
        (Uuid::new_v4(), "Olivia",   "Tremblay", today - Duration::days(700),  "Bambins"),
        (Uuid::new_v4(), "Théo",     "Gagnon",   today - Duration::days(800),  "Bambins"),
        (Uuid::new_v4(), "Juliette", "Martin",   today - Duration::days(900),  "Bambins"),
        // Explorateurs (3-5 ans)
        (Uuid::new_v4(), "Liam",     "Bouchard", today - Duration::days(1200), "Explorateurs"),
        (Uuid::new_v4(), "Chloé",    "Leblanc",  today - Duration::days(1400), "Explorateurs"),
        (Uuid::new_v4(), "Nathan",   "Roy",      today - Duration::days(1600), "Explorateurs"),
    ];

    let child_ids: Vec<Uuid> = children.iter().map(|(id, _, _, _, _)| *id).collect();

    for (id, first_name, last_name, birth_date, program) in &children {
        sqlx::query(&format!(
            r#"INSERT INTO "{schema}".children (id, first_name, last_name, birth_date, program)
               VALUES ($1, $2, $3, $4, $5)"#
        ))
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .bind(birth_date)
        .bind(program)
        .execute(&pool)
        .await
        .with_context(|| format!("Failed to insert child {first_name}"))?;
    }

    // 6. Link children to parents
    println!("Linking children to parents...");
    // Jean-François Leblanc: Léa [0], Noah [3], Chloé [8]
    // Isabelle Roy: Emma [1], Olivia [4]
    let parent_links = [
        (child_ids[0], parent1_id),
        (child_ids[3], parent1_id),
        (child_ids[8], parent1_id),
        (child_ids[1], parent2_id),
        (child_ids[4], parent2_id),
    ];

    for (child_id, user_id) in &parent_links {
        sqlx::query(&format!(
            r#"INSERT INTO "{schema}".child_parents (child_id, user_id, relationship)
               VALUES ($1, $2, 'parent')"#
        ))
        .bind(child_id)
        .bind(user_id)
        .execute(&pool)
        .await
        .context("Failed to insert child_parent link")?;
    }

    // Who checks a given child in: the linked parent if any, otherwise staff.
    let checked_in_by: HashMap<Uuid, Uuid> = {
        let mut map = HashMap::new();
        for (child_id, user_id) in &parent_links {
            map.entry(*child_id).or_insert(*user_id);
        }
        map
    };

    // 7. Insert employees
    println!("Inserting employees...");

    // (id, first_name, last_name, position, hourly_rate, pin)
    let employees: Vec<(Uuid, &str, &str, &str, Option<f64>, &str)> = vec![
        (Uuid::new_v4(), "Sophie",  "Gagnon",    "Éducatrice",      Some(24.50), "8642"),
        (Uuid::new_v4(), "Camille", "Bouchard",  "Éducatrice",      Some(23.00), "9753"),
        (Uuid::new_v4(), "Marc",    "Pelletier", "Cuisinier",       Some(21.75), "5310"),
        (Uuid::new_v4(), "Julie",   "Fortin",    "Aide-éducatrice", None,        "4826"),
    ];

    for (id, first, last, position, rate, pin) in &employees {
        let pin_hash = bcrypt::hash(pin, 10).context("Failed to hash PIN")?;
        sqlx::query(&format!(
            r#"INSERT INTO "{schema}".employees (id, first_name, last_name, position, hourly_rate, pin_hash)
               VALUES ($1, $2, $3, $4, $5, $6)"#
        ))
        .bind(id)
        .bind(first)
        .bind(last)
        .bind(position)
        .bind(rate)
        .bind(pin_hash)
        .execute(&pool)
        .await
        .with_context(|| format!("Failed to insert employee {first}"))?;
    }

    let sophie_id = employees[0].0;
    let camille_id = employees[1].0;
    let marc_id = employees[2].0;
    let julie_id = employees[3].0;

    // 8. Load the seeded absence reasons (provisioned with the schema)
    let reasons: HashMap<String, Uuid> = sqlx::query_as::<_, (String, Uuid)>(&format!(
        r#"SELECT code, id FROM "{schema}".absence_reasons"#
    ))
    .fetch_all(&pool)
    .await
    .context("Failed to load absence reasons")?
    .into_iter()
    .collect();
    let reason = |code: &str| -> Result<Uuid> {
        reasons
            .get(code)
            .copied()
            .with_context(|| format!("Missing absence reason {code}"))
    };

    // Business days of the last two weeks, oldest first, today excluded.
    let mut business_days: Vec<NaiveDate> = Vec::new();
    let mut day = today - Duration::days(14);
    while day < today {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            business_days.push(day);
        }
        day += Duration::days(1);
    }

    let noah_sick_day = business_days[business_days.len() - 4];
    let camille_off_day = business_days[2];
    let chloe_cancelled_day = business_days[1];
    let julie_forgot_day = *business_days.last().context("No business days")?;

    // 9. Absence reports (pending / acknowledged / cancelled mix)
    println!("Inserting absence reports...");

    // Noah, malade il y a quelques jours — signalé par son père, confirmé.
    sqlx::query(&format!(
        r#"INSERT INTO "{schema}".absence_reports
           (child_id, reason_id, start_date, notes, status, reported_by, acknowledged_by, acknowledged_at)
           VALUES ($1, $2, $3, $4, 'acknowledged'::"{schema}".absence_status, $5, $6, $7)"#
    ))
    .bind(child_ids[3])
    .bind(reason("illness")?)
    .bind(noah_sick_day)
    .bind("Fièvre depuis hier soir")
    .bind(parent1_id)
    .bind(admin_id)
    .bind(at(tz, noah_sick_day, 8, 10))
    .execute(&pool)
    .await
    .context("Failed to insert Noah absence")?;

    // Emma, rendez-vous médical aujourd'hui — toujours en attente.
    sqlx::query(&format!(
        r#"INSERT INTO "{schema}".absence_reports
           (child_id, reason_id, start_date, notes, status, reported_by)
           VALUES ($1, $2, $3, $4, 'pending'::"{schema}".absence_status, $5)"#
    ))
    .bind(child_ids[1])
    .bind(reason("medical")?)
    .bind(today)
    .bind("Rendez-vous chez le pédiatre")
    .bind(parent2_id)
    .execute(&pool)
    .await
    .context("Failed to insert Emma absence")?;

    // Olivia, vacances la semaine prochaine (lundi à vendredi).
    let days_to_monday = (7 - today.weekday().num_days_from_monday()) % 7;
    let next_monday =
        today + Duration::days(if days_to_monday == 0 { 7 } else { days_to_monday as i64 });
    sqlx::query(&format!(
        r#"INSERT INTO "{schema}".absence_reports
           (child_id, reason_id, start_date, end_date, expected_return_date, status, reported_by)
           VALUES ($1, $2, $3, $4, $5, 'pending'::"{schema}".absence_status, $6)"#
    ))
    .bind(child_ids[4])
    .bind(reason("vacation")?)
    .bind(next_monday)
    .bind(next_monday + Duration::days(4))
    .bind(next_monday + Duration::days(7))
    .bind(parent2_id)
    .execute(&pool)
    .await
    .context("Failed to insert Olivia absence")?;

    // Chloé, absence familiale annulée — elle est finalement venue.
    sqlx::query(&format!(
        r#"INSERT INTO "{schema}".absence_reports
           (child_id, reason_id, start_date, status, reported_by, cancelled_at)
           VALUES ($1, $2, $3, 'cancelled'::"{schema}".absence_status, $4, $5)"#
    ))
    .bind(child_ids[8])
    .bind(reason("family")?)
    .bind(chloe_cancelled_day)
    .bind(parent1_id)
    .bind(at(tz, chloe_cancelled_day - Duration::days(1), 19, 30))
    .execute(&pool)
    .await
    .context("Failed to insert Chloé absence")?;

    // 10. Check-in history (past business days, all closed)
    println!("Inserting check-in history...");
    let mut checkin_count = 0;
    for &d in &business_days {
        for (idx, child_id) in child_ids.iter().enumerate() {
            // Noah était malade ce jour-là
            if *child_id == child_ids[3] && d == noah_sick_day {
                continue;
            }
            let by = checked_in_by.get(child_id).copied().unwrap_or(admin_id);
            let check_in = at(tz, d, 7, 30 + (idx as u32 * 6) % 30);
            let check_out = at(tz, d, 16, 10 + (idx as u32 * 4) % 45);
            insert_checkin(&pool, &schema, *child_id, d, check_in, Some(check_out), by).await?;
            checkin_count += 1;
        }
    }

    // Today: seven children arrived, two already left, Emma absent.
    for (idx, child_id) in child_ids.iter().enumerate() {
        if idx >= 7 || *child_id == child_ids[1] {
            continue;
        }
        let by = checked_in_by.get(child_id).copied().unwrap_or(admin_id);
        let check_in = now - Duration::minutes(170 - idx as i64 * 15);
        let check_out = (idx % 3 == 2).then(|| now - Duration::minutes(20 + idx as i64));
        insert_checkin(&pool, &schema, *child_id, today, check_in, check_out, by).await?;
        checkin_count += 1;
    }

    // 11. Punch history
    println!("Inserting time-clock history...");
    let mut punch_count = 0;
    for &d in &business_days {
        // Sophie: quart coupé par une pause dîner
        punch_count += insert_day(&pool, &schema, tz, sophie_id, d, &[
            ("shift", (7, 45), Some((12, 0))),
            ("lunch_break", (12, 0), Some((12, 45))),
            ("shift", (12, 45), Some((17, 0))),
        ])
        .await?;

        if d != camille_off_day {
            punch_count += insert_day(&pool, &schema, tz, camille_id, d, &[
                ("shift", (8, 30), Some((13, 0))),
                ("lunch_break", (13, 0), Some((13, 30))),
                ("shift", (13, 30), Some((17, 30))),
            ])
            .await?;
        }

        // Marc: quart continu, sans pause
        punch_count += insert_day(&pool, &schema, tz, marc_id, d, &[
            ("shift", (9, 0), Some((15, 0))),
        ])
        .await?;

        // Julie: le dernier jour, elle a oublié de pointer sa sortie
        if d == julie_forgot_day {
            punch_count += insert_day(&pool, &schema, tz, julie_id, d, &[
                ("shift", (10, 0), None),
            ])
            .await?;
        } else {
            punch_count += insert_day(&pool, &schema, tz, julie_id, d, &[
                ("shift", (10, 0), Some((14, 30))),
            ])
            .await?;
        }
    }

    // Today: Sophie clocked in, Camille on lunch, Marc already gone.
    insert_punch(&pool, &schema, sophie_id, "shift", now - Duration::hours(4), None).await?;
    insert_punch(
        &pool,
        &schema,
        camille_id,
        "shift",
        now - Duration::hours(5),
        Some(now - Duration::hours(1)),
    )
    .await?;
    insert_punch(&pool, &schema, camille_id, "lunch_break", now - Duration::hours(1), None).await?;
    insert_punch(
        &pool,
        &schema,
        marc_id,
        "shift",
        now - Duration::hours(6),
        Some(now - Duration::minutes(30)),
    )
    .await?;
    punch_count += 4;

    // 12. Summary
    println!();
    println!("=== Done ===");
    println!("Garderie   : {slug} (America/Montreal)");
    println!("Users      : 4 (PIN parents: Jean-François 2468, Isabelle 1357)");
    println!("Children   : {} ({} check-ins)", children.len(), checkin_count);
    println!("Employees  : {} ({} punches)", employees.len(), punch_count);
    println!("PIN employés: Sophie 8642, Camille 9753, Marc 5310, Julie 4826");
    println!();
    println!("Exemple kiosque:");
    println!("  curl -X POST -H 'X-Tenant: {slug}' -H 'Content-Type: application/json' \\");
    println!("       -d '{{\"pin\":\"2468\"}}' http://localhost:8080/kiosk/verify-pin");

    Ok(())
}

/// A facility-local wall-clock instant, as UTC.
fn at(tz: Tz, day: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
    use chrono::TimeZone;
    let naive = day.and_hms_opt(h, m, 0).expect("valid wall-clock time");
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

async fn insert_checkin(
    pool: &PgPool,
    schema: &str,
    child_id: Uuid,
    date: NaiveDate,
    check_in: DateTime<Utc>,
    check_out: Option<DateTime<Utc>>,
    by: Uuid,
) -> Result<()> {
    sqlx::query(&format!(
        r#"INSERT INTO "{schema}".checkin_records
           (child_id, date, check_in_time, check_out_time, checked_in_by, checked_out_by)
           VALUES ($1, $2, $3, $4, $5, $6)"#
    ))
    .bind(child_id)
    .bind(date)
    .bind(check_in)
    .bind(check_out)
    .bind(by)
    .bind(check_out.map(|_| by))
    .execute(pool)
    .await
    .context("Failed to insert check-in")?;
    Ok(())
}

async fn insert_punch(
    pool: &PgPool,
    schema: &str,
    employee_id: Uuid,
    entry_type: &str,
    clock_in: DateTime<Utc>,
    clock_out: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(&format!(
        r#"INSERT INTO "{schema}".time_clock_entries (employee_id, entry_type, clock_in, clock_out)
           VALUES ($1, $2::"{schema}".punch_type, $3, $4)"#
    ))
    .bind(employee_id)
    .bind(entry_type)
    .bind(clock_in)
    .bind(clock_out)
    .execute(pool)
    .await
    .context("Failed to insert punch")?;
    Ok(())
}

/// Insert one employee-day of punches given as (type, in, out) wall-clock times.
async fn insert_day(
    pool: &PgPool,
    schema: &str,
    tz: Tz,
    employee_id: Uuid,
    day: NaiveDate,
    punches: &[(&str, (u32, u32), Option<(u32, u32)>)],
) -> Result<usize> {
    for (entry_type, (in_h, in_m), out) in punches {
        let clock_in = at(tz, day, *in_h, *in_m);
        let clock_out = out.map(|(h, m)| at(tz, day, h, m));
        insert_punch(pool, schema, employee_id, entry_type, clock_in, clock_out).await?;
    }
    Ok(punches.len())
}
