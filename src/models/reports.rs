use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::absence::AbsenceWithChild;
use super::attendance::CheckinWithChild;
use super::timeclock::{ClockStatus, TimeClockEntry};

#[derive(Debug, Serialize)]
pub struct ProgramAttendance {
    pub program: String,
    pub enrolled: i64,
    pub attended: i64,
}

/// GET /attendance/report payload. Recomputed from rows on every call.
#[derive(Debug, Serialize)]
pub struct DailyAttendanceReport {
    pub date: NaiveDate,
    /// Active children minus those covered by a non-cancelled absence.
    pub expected: i64,
    pub attended: i64,
    pub absent: i64,
    pub by_program: Vec<ProgramAttendance>,
    pub checkins: Vec<CheckinWithChild>,
    pub absences: Vec<AbsenceWithChild>,
}

#[derive(Debug, Serialize)]
pub struct EmployeeDaySummary {
    pub employee_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub status: ClockStatus,
    pub worked: bool,
    pub first_in: Option<DateTime<Utc>>,
    /// Null while any punch of the day is still open.
    pub last_out: Option<DateTime<Utc>>,
    pub work_minutes: i64,
    pub lunch_minutes: i64,
    pub has_open_punch: bool,
    pub punches: Vec<TimeClockEntry>,
}

#[derive(Debug, Serialize)]
pub struct DailyEmployeeTotals {
    pub worked: i64,
    pub absent: i64,
    pub total_work_minutes: i64,
    pub open_punches: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyEmployeeReport {
    pub date: NaiveDate,
    pub employees: Vec<EmployeeDaySummary>,
    pub summary: DailyEmployeeTotals,
}

#[derive(Debug, Serialize)]
pub struct EmployeeWeekSummary {
    pub employee_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub position: Option<String>,
    pub hourly_rate: Option<f64>,
    pub days_worked: i64,
    pub work_minutes: i64,
    /// work_minutes / 60, one decimal — display value only.
    pub work_hours: f64,
    pub lunch_minutes: i64,
    /// round(exact hours × hourly_rate, 2); null without an hourly rate.
    pub estimated_pay: Option<f64>,
    pub has_open_punch: bool,
}

#[derive(Debug, Serialize)]
pub struct DailyBreakdownRow {
    pub date: NaiveDate,
    pub employees_worked: i64,
    pub work_hours: f64,
    pub lunch_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct WeeklyTotals {
    pub total_work_hours: f64,
    pub total_lunch_minutes: i64,
    pub open_punches: i64,
    pub employees_with_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct WeeklyReport {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub employees: Vec<EmployeeWeekSummary>,
    pub daily_breakdown: Vec<DailyBreakdownRow>,
    pub summary: WeeklyTotals,
}

#[derive(Debug, Deserialize)]
pub struct ReportDateQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct WeeklyRangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}
