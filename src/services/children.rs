use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::tenant::schema_name, error::ApiError, models::child::Child};

pub struct ChildService;

impl ChildService {
    pub async fn list(pool: &PgPool, tenant: &str) -> Result<Vec<Child>, ApiError> {
        let schema = schema_name(tenant);
        let children = sqlx::query_as::<_, Child>(&format!(
            r#"SELECT * FROM "{schema}".children WHERE is_active = TRUE
               ORDER BY last_name, first_name"#
        ))
        .fetch_all(pool)
        .await?;
        Ok(children)
    }

    pub async fn list_for_parent(
        pool: &PgPool,
        tenant: &str,
        parent_id: Uuid,
    ) -> Result<Vec<Child>, ApiError> {
        let schema = schema_name(tenant);
        let children = sqlx::query_as::<_, Child>(&format!(
            r#"SELECT c.* FROM "{schema}".children c
               JOIN "{schema}".child_parents cp ON cp.child_id = c.id
               WHERE cp.user_id = $1 AND c.is_active = TRUE
               ORDER BY c.last_name, c.first_name"#
        ))
        .bind(parent_id)
        .fetch_all(pool)
        .await?;
        Ok(children)
    }

    /// Active child or NotFound. Deactivated children are invisible to the
    /// attendance flows.
    pub async fn get_active(
        pool: &PgPool,
        tenant: &str,
        child_id: Uuid,
    ) -> Result<Child, ApiError> {
        let schema = schema_name(tenant);
        let child = sqlx::query_as::<_, Child>(&format!(
            r#"SELECT * FROM "{schema}".children WHERE id = $1 AND is_active = TRUE"#
        ))
        .bind(child_id)
        .fetch_optional(pool)
        .await?;
        child.ok_or_else(|| ApiError::NotFound("Enfant introuvable".into()))
    }

    pub async fn is_parent_of(
        pool: &PgPool,
        tenant: &str,
        child_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, ApiError> {
        let schema = schema_name(tenant);
        let exists: bool = sqlx::query_scalar(&format!(
            r#"SELECT EXISTS(
                 SELECT 1 FROM "{schema}".child_parents
                 WHERE child_id = $1 AND user_id = $2
               )"#
        ))
        .bind(child_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    /// Parent user ids linked to a child, for notification fan-out.
    pub async fn parent_ids(
        pool: &PgPool,
        tenant: &str,
        child_id: Uuid,
    ) -> Result<Vec<Uuid>, ApiError> {
        let schema = schema_name(tenant);
        let ids: Vec<Uuid> = sqlx::query_scalar(&format!(
            r#"SELECT cp.user_id FROM "{schema}".child_parents cp
               JOIN "{schema}".users u ON u.id = cp.user_id
               WHERE cp.child_id = $1 AND u.is_active = TRUE"#
        ))
        .bind(child_id)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }
}
