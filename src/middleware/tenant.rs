use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::AppState;

/// Validates that a slug only contains lowercase ASCII letters, digits and hyphens,
/// does not start or end with a hyphen, and is between 2 and 63 characters.
/// This prevents SQL injection via the tenant name used in format!() schema queries.
fn is_valid_slug(s: &str) -> bool {
    let len = s.len();
    len >= 2
        && len <= 63
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
}

/// Extracts the tenant slug from the `X-Tenant` header or first subdomain,
/// then validates the tenant exists and is active.
#[derive(Debug, Clone)]
pub struct TenantSlug(pub String);

impl FromRequestParts<AppState> for TenantSlug {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let slug = extract_slug(parts)?;

        let is_active: Option<bool> =
            sqlx::query_scalar("SELECT is_active FROM public.garderies WHERE slug = $1")
                .bind(&slug)
                .fetch_optional(&state.db)
                .await?;

        match is_active {
            None => Err(ApiError::NotFound("Garderie introuvable".into())),
            Some(false) => Err(ApiError::Authorization("Compte désactivé".into())),
            Some(true) => Ok(TenantSlug(slug)),
        }
    }
}

fn extract_slug(parts: &Parts) -> Result<String, ApiError> {
    // 1. X-Tenant header
    if let Some(tenant) = parts
        .headers
        .get("X-Tenant")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty())
    {
        if !is_valid_slug(&tenant) {
            return Err(ApiError::Validation("Identifiant de garderie invalide".into()));
        }
        return Ok(tenant);
    }

    // 2. Subdomain from Host header
    if let Some(host) = parts.headers.get("Host").and_then(|v| v.to_str().ok()) {
        let domain = host.split(':').next().unwrap_or(host);
        let parts_vec: Vec<&str> = domain.split('.').collect();
        if parts_vec.len() >= 3 {
            let subdomain = parts_vec[0].to_lowercase();
            if subdomain != "www" && subdomain != "api" {
                if !is_valid_slug(&subdomain) {
                    return Err(ApiError::Validation("Identifiant de garderie invalide".into()));
                }
                return Ok(subdomain);
            }
        }
    }

    Err(ApiError::Validation("Missing X-Tenant header".into()))
}
