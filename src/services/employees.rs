use sqlx::PgPool;
use uuid::Uuid;

use crate::{db::tenant::schema_name, error::ApiError, models::employee::Employee};

pub struct EmployeeService;

impl EmployeeService {
    pub async fn list(pool: &PgPool, tenant: &str) -> Result<Vec<Employee>, ApiError> {
        let schema = schema_name(tenant);
        let employees = sqlx::query_as::<_, Employee>(&format!(
            r#"SELECT * FROM "{schema}".employees WHERE is_active = TRUE
               ORDER BY last_name, first_name"#
        ))
        .fetch_all(pool)
        .await?;
        Ok(employees)
    }

    pub async fn get_active(
        pool: &PgPool,
        tenant: &str,
        employee_id: Uuid,
    ) -> Result<Employee, ApiError> {
        let schema = schema_name(tenant);
        let employee = sqlx::query_as::<_, Employee>(&format!(
            r#"SELECT * FROM "{schema}".employees WHERE id = $1 AND is_active = TRUE"#
        ))
        .bind(employee_id)
        .fetch_optional(pool)
        .await?;
        employee.ok_or_else(|| ApiError::NotFound("Employé introuvable".into()))
    }
}
