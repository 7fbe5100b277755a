use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceStatus {
    Pending,
    Acknowledged,
    Cancelled,
}

impl std::fmt::Display for AbsenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AbsenceStatus::Pending => "pending",
            AbsenceStatus::Acknowledged => "acknowledged",
            AbsenceStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AbsenceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AbsenceStatus::Pending),
            "acknowledged" => Ok(AbsenceStatus::Acknowledged),
            "cancelled" => Ok(AbsenceStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Unknown absence status: {s}")),
        }
    }
}

/// Fixed vocabulary row (illness, vacation, ...). Seeded at provisioning.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AbsenceReason {
    pub id: Uuid,
    pub code: String,
    pub label: String,
    pub display_order: i16,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// DB row struct — status is fetched as TEXT (status::TEXT), same OID-mismatch
/// workaround as User.role.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AbsenceReport {
    pub id: Uuid,
    pub child_id: Uuid,
    pub reason_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub expected_return_date: Option<NaiveDate>,
    pub status: String,
    pub reported_by: Uuid,
    pub acknowledged_by: Option<Uuid>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AbsenceReport {
    pub fn status(&self) -> AbsenceStatus {
        self.status.parse().unwrap_or(AbsenceStatus::Pending)
    }

    /// Single-day reports have no end_date; the report then ends on its start.
    pub fn effective_end(&self) -> NaiveDate {
        self.end_date.unwrap_or(self.start_date)
    }

    /// Whether the report covers `date` (inclusive on both ends).
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.effective_end()
    }

    /// A parent may cancel only while the report is still pending and has not
    /// fully elapsed. Acknowledged and cancelled are both terminal.
    pub fn cancellable_on(&self, today: NaiveDate) -> bool {
        self.status() == AbsenceStatus::Pending && self.effective_end() >= today
    }
}

/// Report row joined with child + reason labels, for staff and portal lists.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AbsenceWithChild {
    pub id: Uuid,
    pub child_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub reason_code: String,
    pub reason_label: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub expected_return_date: Option<NaiveDate>,
    pub status: String,
    pub reported_by: Uuid,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReportAbsenceRequest {
    pub child_id: Uuid,
    pub reason_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub expected_return_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AbsenceListQuery {
    pub status: Option<String>,
    pub child_id: Option<Uuid>,
    /// "upcoming" | "past" — split on the facility-local today.
    pub view: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(start: &str, end: Option<&str>, status: &str) -> AbsenceReport {
        let now = Utc::now();
        AbsenceReport {
            id: Uuid::new_v4(),
            child_id: Uuid::new_v4(),
            reason_id: Uuid::new_v4(),
            start_date: start.parse().unwrap(),
            end_date: end.map(|e| e.parse().unwrap()),
            notes: None,
            expected_return_date: None,
            status: status.to_string(),
            reported_by: Uuid::new_v4(),
            acknowledged_by: None,
            acknowledged_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_covers_single_day() {
        let r = report("2026-03-10", None, "pending");
        assert!(r.covers("2026-03-10".parse().unwrap()));
        assert!(!r.covers("2026-03-09".parse().unwrap()));
        assert!(!r.covers("2026-03-11".parse().unwrap()));
    }

    #[test]
    fn test_covers_range_inclusive() {
        let r = report("2026-03-10", Some("2026-03-12"), "acknowledged");
        assert!(r.covers("2026-03-10".parse().unwrap()));
        assert!(r.covers("2026-03-11".parse().unwrap()));
        assert!(r.covers("2026-03-12".parse().unwrap()));
        assert!(!r.covers("2026-03-13".parse().unwrap()));
    }

    #[test]
    fn test_cancellable_only_while_pending() {
        let today: NaiveDate = "2026-03-10".parse().unwrap();

        // Un rapport pending qui n'est pas terminé peut être annulé
        assert!(report("2026-03-10", None, "pending").cancellable_on(today));
        assert!(report("2026-03-09", Some("2026-03-11"), "pending").cancellable_on(today));

        // Accusé réception ou déjà annulé: terminal
        assert!(!report("2026-03-10", None, "acknowledged").cancellable_on(today));
        assert!(!report("2026-03-10", None, "cancelled").cancellable_on(today));

        // Entièrement dans le passé: trop tard
        assert!(!report("2026-03-08", Some("2026-03-09"), "pending").cancellable_on(today));
    }
}
