use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::tenant::facility_today;

lazy_static! {
    // ── Event counters (increment on each event) ────────────────────────────
    pub static ref CHECKINS_COUNTER: CounterVec = register_counter_vec!(
        "api_checkins_total",
        "Arrivées/départs d'enfants par tenant et action",
        &["tenant", "action"]
    ).unwrap();

    pub static ref PUNCHES_COUNTER: CounterVec = register_counter_vec!(
        "api_punches_total",
        "Pointages d'employés par tenant et action",
        &["tenant", "action"]
    ).unwrap();

    pub static ref PIN_ATTEMPTS_COUNTER: CounterVec = register_counter_vec!(
        "api_pin_attempts_total",
        "Vérifications de NIP kiosque par tenant et statut",
        &["tenant", "status"]
    ).unwrap();

    pub static ref ABSENCES_COUNTER: CounterVec = register_counter_vec!(
        "api_absence_reports_total",
        "Rapports d'absence par tenant et action",
        &["tenant", "action"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref CHILDREN_GAUGE: GaugeVec = register_gauge_vec!(
        "garderie_children_active_total",
        "Enfants actifs par tenant",
        &["tenant"]
    ).unwrap();

    pub static ref CHILDREN_PRESENT_GAUGE: GaugeVec = register_gauge_vec!(
        "garderie_children_present_total",
        "Enfants présents (arrivée ouverte aujourd'hui) par tenant",
        &["tenant"]
    ).unwrap();

    pub static ref EMPLOYEES_CLOCKED_IN_GAUGE: GaugeVec = register_gauge_vec!(
        "garderie_employees_clocked_in_total",
        "Employés avec un pointage ouvert par tenant",
        &["tenant"]
    ).unwrap();

    pub static ref ABSENCES_PENDING_GAUGE: GaugeVec = register_gauge_vec!(
        "garderie_absences_pending_total",
        "Rapports d'absence en attente de confirmation par tenant",
        &["tenant"]
    ).unwrap();

    pub static ref TENANTS_GAUGE: Gauge = register_gauge!(
        "garderie_tenants_active_total",
        "Nombre de tenants actifs"
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        // Initial collection on startup
        if let Err(e) = collect(&pool).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let tenants: Vec<String> =
        sqlx::query_scalar("SELECT slug FROM public.garderies WHERE is_active = TRUE")
            .fetch_all(pool)
            .await?;

    TENANTS_GAUGE.set(tenants.len() as f64);

    for slug in &tenants {
        let schema = format!("garderie_{}", slug);
        let today = match facility_today(pool, slug).await {
            Ok(d) => d,
            Err(e) => {
                warn!("Metrics: timezone lookup failed for {slug}: {e}");
                continue;
            }
        };

        // Active children
        let children: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*)::BIGINT FROM "{schema}".children WHERE is_active = TRUE"#
        ))
        .fetch_one(pool)
        .await
        .unwrap_or(0);
        CHILDREN_GAUGE.with_label_values(&[slug]).set(children as f64);

        // Children currently on site
        let present: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*)::BIGINT FROM "{schema}".checkin_records
               WHERE date = $1 AND check_out_time IS NULL"#
        ))
        .bind(today)
        .fetch_one(pool)
        .await
        .unwrap_or(0);
        CHILDREN_PRESENT_GAUGE.with_label_values(&[slug]).set(present as f64);

        // Employees on the clock
        let clocked_in: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*)::BIGINT FROM "{schema}".time_clock_entries
               WHERE clock_out IS NULL"#
        ))
        .fetch_one(pool)
        .await
        .unwrap_or(0);
        EMPLOYEES_CLOCKED_IN_GAUGE.with_label_values(&[slug]).set(clocked_in as f64);

        // Absence reports waiting for staff
        let pending: i64 = sqlx::query_scalar(&format!(
            r#"SELECT COUNT(*)::BIGINT FROM "{schema}".absence_reports
               WHERE status = 'pending'"#
        ))
        .fetch_one(pool)
        .await
        .unwrap_or(0);
        ABSENCES_PENDING_GAUGE.with_label_values(&[slug]).set(pending as f64);
    }

    info!("Metrics: collected for {} tenant(s)", tenants.len());
    Ok(())
}
