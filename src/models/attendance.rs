use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-day attendance state of a child, derived from the day's record.
/// `checked_out` is terminal: a second check-in on the same day is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    NotCheckedIn,
    CheckedIn,
    CheckedOut,
}

impl AttendanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceState::NotCheckedIn => "not_checked_in",
            AttendanceState::CheckedIn => "checked_in",
            AttendanceState::CheckedOut => "checked_out",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckinRecord {
    pub id: Uuid,
    pub child_id: Uuid,
    /// Facility-local day the record belongs to.
    pub date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub checked_in_by: Uuid,
    pub checked_out_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckinRecord {
    pub fn state(&self) -> AttendanceState {
        if self.check_out_time.is_some() {
            AttendanceState::CheckedOut
        } else {
            AttendanceState::CheckedIn
        }
    }
}

/// Check-in row joined with the child's identity, for feeds and reports.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CheckinWithChild {
    pub id: Uuid,
    pub child_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub program: Option<String>,
    pub date: NaiveDate,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// GET /attendance/status/{child_id} payload.
#[derive(Debug, Serialize)]
pub struct ChildDayStatus {
    pub child_id: Uuid,
    pub date: NaiveDate,
    pub state: AttendanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CheckinRecord>,
}

/// GET /attendance/today payload for the staff dashboard.
#[derive(Debug, Serialize)]
pub struct TodayOverview {
    pub date: NaiveDate,
    /// Active children minus those covered by a non-cancelled absence.
    pub expected: i64,
    pub present: i64,
    pub checked_out: i64,
    pub absent: i64,
    pub recent: Vec<CheckinWithChild>,
}

/// Kiosk batch check-in / check-out body.
#[derive(Debug, Deserialize)]
pub struct KioskAttendanceRequest {
    pub pin: String,
    pub child_ids: Vec<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttendanceStatusQuery {
    pub date: Option<NaiveDate>,
}

/// Per-child outcome of a batch action. One child failing (already checked in,
/// not linked to the parent, ...) never blocks the others.
#[derive(Debug, Serialize)]
pub struct ChildActionResult {
    pub child_id: Uuid,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CheckinRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl ChildActionResult {
    pub fn success(child_id: Uuid, record: CheckinRecord) -> Self {
        Self {
            child_id,
            ok: true,
            record: Some(record),
            error: None,
            kind: None,
        }
    }

    pub fn failure(child_id: Uuid, err: &crate::error::ApiError) -> Self {
        Self {
            child_id,
            ok: false,
            record: None,
            error: Some(err.to_string()),
            kind: Some(err.kind()),
        }
    }
}
