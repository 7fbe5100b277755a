use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::tenant::schema_name,
    error::ApiError,
    models::{employee::Employee, user::User},
};

/// Who a kiosk PIN resolved to. A PIN may match a parent/staff account AND an
/// employee record at the same time; the kiosk screen picks by context (child
/// actions use `user`, punch actions use `employee`).
#[derive(Debug)]
pub struct ResolvedPin {
    pub user: Option<User>,
    pub employee: Option<Employee>,
}

pub struct ActorGateway;

impl ActorGateway {
    /// Resolve a raw kiosk PIN against every active PIN holder of the tenant:
    /// parent accounts on one side, employees on the other. bcrypt over each
    /// candidate; fine at garderie scale (tens of rows). No match at all is a
    /// NotFound, which the kiosk route rate-limits.
    pub async fn resolve_pin(
        pool: &PgPool,
        tenant: &str,
        pin: &str,
    ) -> Result<ResolvedPin, ApiError> {
        if pin.trim().is_empty() {
            return Err(ApiError::Validation("NIP requis".into()));
        }
        let schema = schema_name(tenant);

        let users = sqlx::query_as::<_, User>(&format!(
            r#"SELECT id, email, first_name, last_name, role::TEXT AS role,
                      pin_hash, is_active, created_at, updated_at
               FROM "{schema}".users
               WHERE is_active = TRUE AND pin_hash IS NOT NULL AND role = 'parent'"#
        ))
        .fetch_all(pool)
        .await?;

        let user = users.into_iter().find(|u| {
            u.pin_hash
                .as_deref()
                .map(|h| bcrypt::verify(pin, h).unwrap_or(false))
                .unwrap_or(false)
        });

        let employees = sqlx::query_as::<_, Employee>(&format!(
            r#"SELECT * FROM "{schema}".employees
               WHERE is_active = TRUE AND pin_hash IS NOT NULL"#
        ))
        .fetch_all(pool)
        .await?;

        let employee = employees.into_iter().find(|e| {
            e.pin_hash
                .as_deref()
                .map(|h| bcrypt::verify(pin, h).unwrap_or(false))
                .unwrap_or(false)
        });

        if user.is_none() && employee.is_none() {
            return Err(ApiError::NotFound("NIP non reconnu".into()));
        }
        Ok(ResolvedPin { user, employee })
    }

    /// Punch actions name their employee explicitly; the PIN must be that
    /// employee's own.
    pub async fn verify_employee_pin(
        pool: &PgPool,
        tenant: &str,
        employee_id: Uuid,
        pin: &str,
    ) -> Result<Employee, ApiError> {
        let employee =
            crate::services::employees::EmployeeService::get_active(pool, tenant, employee_id)
                .await?;

        let valid = employee
            .pin_hash
            .as_deref()
            .map(|h| bcrypt::verify(pin, h).unwrap_or(false))
            .unwrap_or(false);

        if !valid {
            return Err(ApiError::Authorization("NIP invalide".into()));
        }
        Ok(employee)
    }
}
