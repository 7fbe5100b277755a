use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use redis::Client as RedisClient;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pointage_api::config::Config;
use pointage_api::middleware::auth::JwtSecret;
use pointage_api::services::notifications::NotificationService;
use pointage_api::{db, routes, services, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    db::migrate_all_existing_tenants(&pool).await?;
    info!("Database connected and migrations applied");

    let redis_client = RedisClient::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connected");

    let notifications = Arc::new(NotificationService::new(config.fcm_api_key.clone()));

    let state = AppState {
        db: pool.clone(),
        redis: redis_conn,
        config: config.clone(),
        notifications,
    };

    // Build CORS: allow the app base domain and its subdomains (tenant subdomains).
    // In development (localhost), all origins are allowed.
    let base_url = config.app_base_url.clone();
    let cors_origin = {
        let base = base_url.clone();
        AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let o = match origin.to_str() {
                Ok(s) => s,
                Err(_) => return false,
            };
            // Always allow localhost / 127.0.0.1 for local development
            if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
                return true;
            }
            // Exact match of app_base_url
            if o == base {
                return true;
            }
            // Subdomain match: extract domain portion from base URL and allow *.domain
            if let Some(idx) = base.find("://") {
                let after_scheme = &base[idx + 3..];
                let domain = after_scheme.split('/').next().unwrap_or(after_scheme);
                let domain_clean = domain.split(':').next().unwrap_or(domain);
                if o.contains(&format!(".{domain_clean}")) {
                    return true;
                }
            }
            false
        })
    };

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-tenant"),
            header::HeaderName::from_static("idempotency-key"),
        ]))
        .allow_origin(cors_origin);

    let jwt_secret = JwtSecret(config.jwt_secret.clone());

    services::metrics::start(pool);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Kiosk (PIN-authenticated, no JWT)
        .route("/kiosk/verify-pin", post(routes::kiosk::verify_pin))
        .route("/kiosk/checkin", post(routes::kiosk::checkin))
        .route("/kiosk/checkout", post(routes::kiosk::checkout))
        .route("/kiosk/employee/clockin", post(routes::kiosk::employee_clockin))
        .route("/kiosk/employee/clockout", post(routes::kiosk::employee_clockout))
        .route("/kiosk/employee/lunch-start", post(routes::kiosk::employee_lunch_start))
        .route("/kiosk/employee/lunch-end", post(routes::kiosk::employee_lunch_end))
        // Attendance (staff)
        .route("/attendance/today", get(routes::attendance::today))
        .route("/attendance/status/{child_id}", get(routes::attendance::child_status))
        .route(
            "/attendance/absences",
            get(routes::attendance::list_absences).post(routes::attendance::report_absence),
        )
        .route(
            "/attendance/absences/{id}/acknowledge",
            put(routes::attendance::acknowledge_absence),
        )
        .route("/attendance/absence-reasons", get(routes::attendance::absence_reasons))
        .route("/attendance/report", get(routes::attendance::daily_report))
        // Time clock (staff; punch corrections are admin-only)
        .route("/timeclock/today", get(routes::timeclock::today))
        .route("/timeclock/daily-report", get(routes::timeclock::daily_report))
        .route("/timeclock/weekly-report", get(routes::timeclock::weekly_report))
        .route("/timeclock/entries", post(routes::timeclock::add_entry))
        .route(
            "/timeclock/entries/{id}",
            put(routes::timeclock::edit_entry).delete(routes::timeclock::delete_entry),
        )
        // Parent portal
        .route("/portal/children", get(routes::portal::children))
        .route(
            "/portal/absences",
            get(routes::portal::list_absences).post(routes::portal::report_absence),
        )
        .route("/portal/absences/{id}", delete(routes::portal::cancel_absence))
        .route("/portal/absence-reasons", get(routes::portal::absence_reasons))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // JSON-only API — keep request bodies small
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("pointage API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
