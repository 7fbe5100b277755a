use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub fcm_api_key: Option<String>,
    pub app_base_url: String,
    /// Max failed PIN attempts per tenant+client before the kiosk is locked out.
    pub kiosk_pin_max_attempts: u64,
    pub kiosk_pin_window_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            fcm_api_key: env::var("FCM_API_KEY").ok().filter(|s| !s.is_empty()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
            kiosk_pin_max_attempts: env::var("KIOSK_PIN_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            kiosk_pin_window_secs: env::var("KIOSK_PIN_WINDOW_SECS")
                .unwrap_or_else(|_| "300".into())
                .parse()?,
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
