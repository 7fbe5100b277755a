use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Shift,
    LunchBreak,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryType::Shift => "shift",
            EntryType::LunchBreak => "lunch_break",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for EntryType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shift" => Ok(EntryType::Shift),
            "lunch_break" => Ok(EntryType::LunchBreak),
            _ => Err(anyhow::anyhow!("Unknown entry type: {s}")),
        }
    }
}

/// Current state of an employee, derived from today's punches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockStatus {
    NotClockedIn,
    ClockedIn,
    OnLunch,
    ClockedOut,
}

impl ClockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockStatus::NotClockedIn => "not_clocked_in",
            ClockStatus::ClockedIn => "clocked_in",
            ClockStatus::OnLunch => "on_lunch",
            ClockStatus::ClockedOut => "clocked_out",
        }
    }
}

/// DB row struct — entry_type is fetched as TEXT (entry_type::TEXT), same
/// OID-mismatch workaround as User.role.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TimeClockEntry {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub entry_type: String,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    pub was_adjusted: bool,
    pub adjustment_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeClockEntry {
    pub fn kind(&self) -> EntryType {
        self.entry_type.parse().unwrap_or(EntryType::Shift)
    }

    pub fn is_open(&self) -> bool {
        self.clock_out.is_none()
    }
}

/// Derive the employee's status from a day's punches. The punch with the
/// latest clock_in wins; at most one punch may be open at a time, so an open
/// punch is always that latest one.
pub fn derive_clock_status(punches: &[TimeClockEntry]) -> ClockStatus {
    let latest = punches.iter().max_by_key(|p| p.clock_in);
    match latest {
        None => ClockStatus::NotClockedIn,
        Some(p) if p.is_open() => match p.kind() {
            EntryType::LunchBreak => ClockStatus::OnLunch,
            EntryType::Shift => ClockStatus::ClockedIn,
        },
        Some(_) => ClockStatus::ClockedOut,
    }
}

/// Kiosk body for the four employee punch actions.
#[derive(Debug, Deserialize)]
pub struct EmployeePunchRequest {
    pub employee_id: Uuid,
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPunchRequest {
    pub employee_id: Uuid,
    /// "shift" (default) or "lunch_break".
    pub entry_type: Option<String>,
    pub clock_in: DateTime<Utc>,
    pub clock_out: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Admin punch correction. The reason is mandatory; it is the whole audit
/// trail for manual edits.
#[derive(Debug, Deserialize)]
pub struct EditPunchRequest {
    pub clock_in: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
    pub adjustment_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PunchDateQuery {
    pub date: Option<NaiveDate>,
}

/// One line of the live staff board (GET /timeclock/today).
#[derive(Debug, Serialize)]
pub struct EmployeeClockRow {
    pub employee_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub status: ClockStatus,
    pub punches: Vec<TimeClockEntry>,
}

#[derive(Debug, Serialize)]
pub struct TodayBoard {
    pub date: NaiveDate,
    pub employees: Vec<EmployeeClockRow>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn punch(kind: &str, in_h: u32, out_h: Option<u32>) -> TimeClockEntry {
        let day = |h| Utc.with_ymd_and_hms(2026, 3, 10, h, 0, 0).unwrap();
        let now = Utc::now();
        TimeClockEntry {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            entry_type: kind.to_string(),
            clock_in: day(in_h),
            clock_out: out_h.map(day),
            was_adjusted: false,
            adjustment_reason: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_no_punches() {
        assert_eq!(derive_clock_status(&[]), ClockStatus::NotClockedIn);
    }

    #[test]
    fn test_status_open_shift() {
        let punches = vec![punch("shift", 8, None)];
        assert_eq!(derive_clock_status(&punches), ClockStatus::ClockedIn);
    }

    #[test]
    fn test_status_on_lunch() {
        // Quart fermé à midi, pause dîner ouverte
        let punches = vec![punch("shift", 8, Some(12)), punch("lunch_break", 12, None)];
        assert_eq!(derive_clock_status(&punches), ClockStatus::OnLunch);
    }

    #[test]
    fn test_status_back_from_lunch() {
        let punches = vec![
            punch("shift", 8, Some(12)),
            punch("lunch_break", 12, Some(13)),
            punch("shift", 13, None),
        ];
        assert_eq!(derive_clock_status(&punches), ClockStatus::ClockedIn);
    }

    #[test]
    fn test_status_all_closed() {
        let punches = vec![punch("shift", 8, Some(12)), punch("shift", 13, Some(17))];
        assert_eq!(derive_clock_status(&punches), ClockStatus::ClockedOut);
    }
}
