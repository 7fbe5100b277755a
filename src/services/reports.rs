use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::tenant::{day_bounds_utc, facility_timezone, facility_today, local_date_of, schema_name},
    error::ApiError,
    models::{
        absence::AbsenceWithChild,
        attendance::CheckinWithChild,
        child::Child,
        reports::{
            DailyAttendanceReport, DailyBreakdownRow, DailyEmployeeReport, DailyEmployeeTotals,
            EmployeeDaySummary, EmployeeWeekSummary, ProgramAttendance, WeeklyReport,
            WeeklyTotals,
        },
        timeclock::{derive_clock_status, ClockStatus, EntryType, TimeClockEntry},
    },
    services::{
        absences::AbsenceService, attendance::AttendanceService, children::ChildService,
        employees::EmployeeService, timeclock::TimeClockService,
    },
};

const MAX_RANGE_DAYS: i64 = 62;
const NO_PROGRAM_LABEL: &str = "Sans programme";

/// Numeric core of one employee-day, computed by `summarize_day`.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySlice {
    pub status: ClockStatus,
    pub first_in: Option<DateTime<Utc>>,
    pub last_out: Option<DateTime<Utc>>,
    pub work_minutes: i64,
    pub lunch_minutes: i64,
    pub has_open_punch: bool,
}

pub struct ReportService;

impl ReportService {
    /// Full daily attendance report: headline counts, per-program breakdown,
    /// and the raw check-in / absence rows the screen renders.
    pub async fn daily_attendance(
        pool: &PgPool,
        tenant: &str,
        date: Option<NaiveDate>,
    ) -> Result<DailyAttendanceReport, ApiError> {
        let date = match date {
            Some(d) => d,
            None => facility_today(pool, tenant).await?,
        };

        let children = ChildService::list(pool, tenant).await?;
        let checkins = AttendanceService::checkins_for_date(pool, tenant, date).await?;
        let absences = AbsenceService::covering_date(pool, tenant, date).await?;

        Ok(build_daily_attendance(date, &children, checkins, absences))
    }

    /// Per-employee day summaries with payroll minutes. Zero-punch employees
    /// appear as absent so payroll sees the hole.
    pub async fn daily_employees(
        pool: &PgPool,
        tenant: &str,
        date: Option<NaiveDate>,
    ) -> Result<DailyEmployeeReport, ApiError> {
        let today = facility_today(pool, tenant).await?;
        let date = date.unwrap_or(today);
        let now = Utc::now();

        let employees = EmployeeService::list(pool, tenant).await?;
        let punches = TimeClockService::punches_for_date(pool, tenant, date).await?;

        let mut by_employee: HashMap<Uuid, Vec<TimeClockEntry>> = HashMap::new();
        for p in punches {
            by_employee.entry(p.employee_id).or_default().push(p);
        }

        let mut summaries = Vec::with_capacity(employees.len());
        let mut totals = DailyEmployeeTotals {
            worked: 0,
            absent: 0,
            total_work_minutes: 0,
            open_punches: 0,
        };

        for e in employees {
            let theirs = by_employee.remove(&e.id).unwrap_or_default();
            let slice = summarize_day(&theirs, date, today, now);
            let worked = !theirs.is_empty();

            if worked {
                totals.worked += 1;
            } else {
                totals.absent += 1;
            }
            totals.total_work_minutes += slice.work_minutes;
            totals.open_punches += theirs.iter().filter(|p| p.is_open()).count() as i64;

            summaries.push(EmployeeDaySummary {
                employee_id: e.id,
                first_name: e.first_name,
                last_name: e.last_name,
                position: e.position,
                status: slice.status,
                worked,
                first_in: slice.first_in,
                last_out: slice.last_out,
                work_minutes: slice.work_minutes,
                lunch_minutes: slice.lunch_minutes,
                has_open_punch: slice.has_open_punch,
                punches: theirs,
            });
        }

        Ok(DailyEmployeeReport {
            date,
            employees: summaries,
            summary: totals,
        })
    }

    /// Per-employee totals over a date range (inclusive), with a per-day
    /// breakdown. Minutes are summed exactly; hours and pay are rounded once
    /// at the end.
    pub async fn weekly(
        pool: &PgPool,
        tenant: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<WeeklyReport, ApiError> {
        if start > end {
            return Err(ApiError::Validation(
                "La date de début doit précéder la date de fin".into(),
            ));
        }
        if (end - start).num_days() + 1 > MAX_RANGE_DAYS {
            return Err(ApiError::Validation(format!(
                "La période demandée dépasse {MAX_RANGE_DAYS} jours"
            )));
        }

        let tz = facility_timezone(pool, tenant).await?;
        let today = Utc::now().with_timezone(&tz).date_naive();
        let now = Utc::now();
        let (range_start, _) = day_bounds_utc(start, tz);
        let (_, range_end) = day_bounds_utc(end, tz);

        let employees = EmployeeService::list(pool, tenant).await?;
        let punches =
            Self::punches_in_range(pool, tenant, range_start, range_end).await?;

        // Group by (employee, facility-local day of the clock-in).
        let mut grouped: HashMap<(Uuid, NaiveDate), Vec<TimeClockEntry>> = HashMap::new();
        for p in punches {
            let day = local_date_of(p.clock_in, tz);
            grouped.entry((p.employee_id, day)).or_default().push(p);
        }

        struct Acc {
            days_worked: i64,
            work_minutes: i64,
            lunch_minutes: i64,
            has_open_punch: bool,
        }
        let mut per_employee: HashMap<Uuid, Acc> = HashMap::new();
        let mut per_day: BTreeMap<NaiveDate, (i64, i64, i64)> = BTreeMap::new();
        let mut open_punches = 0_i64;

        for ((employee_id, day), day_punches) in &grouped {
            let slice = summarize_day(day_punches, *day, today, now);
            open_punches += day_punches.iter().filter(|p| p.is_open()).count() as i64;

            let acc = per_employee.entry(*employee_id).or_insert(Acc {
                days_worked: 0,
                work_minutes: 0,
                lunch_minutes: 0,
                has_open_punch: false,
            });
            acc.days_worked += 1;
            acc.work_minutes += slice.work_minutes;
            acc.lunch_minutes += slice.lunch_minutes;
            acc.has_open_punch |= slice.has_open_punch;

            let day_acc = per_day.entry(*day).or_insert((0, 0, 0));
            day_acc.0 += 1;
            day_acc.1 += slice.work_minutes;
            day_acc.2 += slice.lunch_minutes;
        }

        let mut rows = Vec::with_capacity(employees.len());
        let mut total_work_minutes = 0_i64;
        let mut total_lunch_minutes = 0_i64;
        let mut employees_with_hours = 0_i64;

        for e in employees {
            let acc = per_employee.remove(&e.id).unwrap_or(Acc {
                days_worked: 0,
                work_minutes: 0,
                lunch_minutes: 0,
                has_open_punch: false,
            });
            total_work_minutes += acc.work_minutes;
            total_lunch_minutes += acc.lunch_minutes;
            if acc.work_minutes > 0 {
                employees_with_hours += 1;
            }
            rows.push(EmployeeWeekSummary {
                employee_id: e.id,
                first_name: e.first_name,
                last_name: e.last_name,
                position: e.position,
                estimated_pay: week_pay(acc.work_minutes, e.hourly_rate),
                hourly_rate: e.hourly_rate,
                days_worked: acc.days_worked,
                work_minutes: acc.work_minutes,
                work_hours: display_hours(acc.work_minutes),
                lunch_minutes: acc.lunch_minutes,
                has_open_punch: acc.has_open_punch,
            });
        }

        let mut daily_breakdown = Vec::new();
        for day in start.iter_days() {
            if day > end {
                break;
            }
            let (worked, work_minutes, lunch_minutes) =
                per_day.get(&day).copied().unwrap_or((0, 0, 0));
            daily_breakdown.push(DailyBreakdownRow {
                date: day,
                employees_worked: worked,
                work_hours: display_hours(work_minutes),
                lunch_minutes,
            });
        }

        Ok(WeeklyReport {
            start_date: start,
            end_date: end,
            employees: rows,
            daily_breakdown,
            summary: WeeklyTotals {
                total_work_hours: display_hours(total_work_minutes),
                total_lunch_minutes,
                open_punches,
                employees_with_hours,
            },
        })
    }

    async fn punches_in_range(
        pool: &PgPool,
        tenant: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeClockEntry>, ApiError> {
        let schema = schema_name(tenant);
        let punches = sqlx::query_as::<_, TimeClockEntry>(&format!(
            r#"SELECT id, employee_id, entry_type::TEXT AS entry_type, clock_in, clock_out,
                      was_adjusted, adjustment_reason, notes, created_at, updated_at
               FROM "{schema}".time_clock_entries
               WHERE clock_in >= $1 AND clock_in < $2
               ORDER BY clock_in"#
        ))
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;
        Ok(punches)
    }
}

/// Payroll view of one employee-day.
///
/// Closed punches contribute `clock_out − clock_in`. An open punch on a past
/// day contributes nothing (the minutes are unknowable) but raises
/// `has_open_punch`; an open punch today contributes `now − clock_in`, still
/// flagged. `last_out` stays null while anything is open.
pub fn summarize_day(
    punches: &[TimeClockEntry],
    date: NaiveDate,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> DaySlice {
    let has_open_punch = punches.iter().any(TimeClockEntry::is_open);

    let mut work_minutes = 0_i64;
    let mut lunch_minutes = 0_i64;
    for p in punches {
        let minutes = match p.clock_out {
            Some(out) => (out - p.clock_in).num_minutes().max(0),
            None if date == today => (now - p.clock_in).num_minutes().max(0),
            None => 0,
        };
        match p.kind() {
            EntryType::Shift => work_minutes += minutes,
            EntryType::LunchBreak => lunch_minutes += minutes,
        }
    }

    let first_in = punches
        .iter()
        .filter(|p| p.kind() == EntryType::Shift)
        .map(|p| p.clock_in)
        .min();
    let last_out = if has_open_punch {
        None
    } else {
        punches.iter().filter_map(|p| p.clock_out).max()
    };

    DaySlice {
        status: derive_clock_status(punches),
        first_in,
        last_out,
        work_minutes,
        lunch_minutes,
        has_open_punch,
    }
}

/// Headline counts + per-program breakdown from the day's raw rows.
/// `expected` = active children minus the distinct children covered by a
/// non-cancelled absence.
pub fn build_daily_attendance(
    date: NaiveDate,
    children: &[Child],
    checkins: Vec<CheckinWithChild>,
    absences: Vec<AbsenceWithChild>,
) -> DailyAttendanceReport {
    let absent_children: HashSet<Uuid> = absences.iter().map(|a| a.child_id).collect();
    let absent = absent_children.len() as i64;
    let attended = checkins.len() as i64;
    let expected = (children.len() as i64 - absent).max(0);

    let label = |p: &Option<String>| -> String {
        p.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_PROGRAM_LABEL)
            .to_string()
    };

    let mut programs: BTreeMap<String, (i64, i64)> = BTreeMap::new();
    for child in children {
        programs.entry(label(&child.program)).or_default().0 += 1;
    }
    for ci in &checkins {
        programs.entry(label(&ci.program)).or_default().1 += 1;
    }

    let by_program = programs
        .into_iter()
        .map(|(program, (enrolled, attended))| ProgramAttendance {
            program,
            enrolled,
            attended,
        })
        .collect();

    DailyAttendanceReport {
        date,
        expected,
        attended,
        absent,
        by_program,
        checkins,
        absences,
    }
}

/// Exact minutes × rate, rounded to cents once. Hours shown elsewhere are a
/// one-decimal display value and never feed this.
pub fn week_pay(work_minutes: i64, hourly_rate: Option<f64>) -> Option<f64> {
    hourly_rate.map(|rate| round2(work_minutes as f64 / 60.0 * rate))
}

pub fn display_hours(minutes: i64) -> f64 {
    round1(minutes as f64 / 60.0)
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
    }

    fn punch(
        kind: &str,
        in_t: DateTime<Utc>,
        out_t: Option<DateTime<Utc>>,
    ) -> TimeClockEntry {
        let now = Utc::now();
        TimeClockEntry {
            id: Uuid::new_v4(),
            employee_id: Uuid::new_v4(),
            entry_type: kind.to_string(),
            clock_in: in_t,
            clock_out: out_t,
            was_adjusted: false,
            adjustment_reason: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
    }

    #[test]
    fn test_full_closed_day() {
        // 8h-17h sans pause: 540 minutes
        let punches = vec![punch("shift", at(10, 8, 0), Some(at(10, 17, 0)))];
        let slice = summarize_day(&punches, d(10), d(10), at(10, 18, 0));
        assert_eq!(slice.work_minutes, 540);
        assert_eq!(slice.lunch_minutes, 0);
        assert_eq!(slice.first_in, Some(at(10, 8, 0)));
        assert_eq!(slice.last_out, Some(at(10, 17, 0)));
        assert_eq!(slice.status, ClockStatus::ClockedOut);
        assert!(!slice.has_open_punch);
    }

    #[test]
    fn test_open_punch_today_counts_up_to_now() {
        // Pointé à 9h, rapport généré à 15h: 360 minutes, signalé ouvert
        let punches = vec![punch("shift", at(10, 9, 0), None)];
        let slice = summarize_day(&punches, d(10), d(10), at(10, 15, 0));
        assert_eq!(slice.work_minutes, 360);
        assert!(slice.has_open_punch);
        assert_eq!(slice.status, ClockStatus::ClockedIn);
        assert_eq!(slice.last_out, None);
    }

    #[test]
    fn test_open_punch_on_past_day_counts_zero() {
        let punches = vec![punch("shift", at(9, 9, 0), None)];
        let slice = summarize_day(&punches, d(9), d(10), at(10, 15, 0));
        assert_eq!(slice.work_minutes, 0);
        assert!(slice.has_open_punch);
        assert_eq!(slice.last_out, None);
    }

    #[test]
    fn test_shift_lunch_shift_day() {
        let punches = vec![
            punch("shift", at(10, 8, 0), Some(at(10, 12, 0))),
            punch("lunch_break", at(10, 12, 0), Some(at(10, 12, 45))),
            punch("shift", at(10, 12, 45), Some(at(10, 17, 0))),
        ];
        let slice = summarize_day(&punches, d(10), d(10), at(10, 18, 0));
        assert_eq!(slice.work_minutes, 240 + 255);
        assert_eq!(slice.lunch_minutes, 45);
        assert_eq!(slice.first_in, Some(at(10, 8, 0)));
        assert_eq!(slice.last_out, Some(at(10, 17, 0)));
    }

    #[test]
    fn test_no_punches_means_absent_day() {
        let slice = summarize_day(&[], d(10), d(10), at(10, 18, 0));
        assert_eq!(slice.work_minutes, 0);
        assert_eq!(slice.status, ClockStatus::NotClockedIn);
        assert_eq!(slice.first_in, None);
    }

    #[test]
    fn test_week_pay_rounds_to_cents() {
        // 5 jours de 540 min = 2700 min = 45.0 h à 20 $/h = 900.00 $
        assert_eq!(week_pay(5 * 540, Some(20.0)), Some(900.0));
        assert_eq!(week_pay(2700, None), None);
        // 100 min à 19.75 $/h = 32.9166... → 32.92 $
        assert_eq!(week_pay(100, Some(19.75)), Some(32.92));
    }

    #[test]
    fn test_display_hours_one_decimal() {
        assert_eq!(display_hours(2700), 45.0);
        assert_eq!(display_hours(100), 1.7);
        assert_eq!(display_hours(0), 0.0);
    }

    fn child(program: Option<&str>) -> Child {
        let now = Utc::now();
        Child {
            id: Uuid::new_v4(),
            first_name: "Emma".into(),
            last_name: "Tremblay".into(),
            birth_date: d(1),
            program: program.map(String::from),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn checkin(child: &Child) -> CheckinWithChild {
        CheckinWithChild {
            id: Uuid::new_v4(),
            child_id: child.id,
            first_name: child.first_name.clone(),
            last_name: child.last_name.clone(),
            program: child.program.clone(),
            date: d(10),
            check_in_time: at(10, 8, 5),
            check_out_time: None,
            notes: None,
        }
    }

    fn absence(child: &Child) -> AbsenceWithChild {
        AbsenceWithChild {
            id: Uuid::new_v4(),
            child_id: child.id,
            first_name: child.first_name.clone(),
            last_name: child.last_name.clone(),
            reason_code: "illness".into(),
            reason_label: "Maladie".into(),
            start_date: d(10),
            end_date: None,
            notes: None,
            expected_return_date: None,
            status: "acknowledged".into(),
            reported_by: Uuid::new_v4(),
            acknowledged_at: Some(at(10, 7, 0)),
            created_at: at(9, 20, 0),
        }
    }

    #[test]
    fn test_daily_attendance_headline_counts() {
        // 30 enfants actifs, 2 absences confirmées, 25 arrivées
        // → attendus 28, présents 25, absents 2
        let children: Vec<Child> = (0..30)
            .map(|i| child(if i < 18 { Some("Poupons") } else { Some("Bambins") }))
            .collect();
        let checkins: Vec<CheckinWithChild> =
            children.iter().take(25).map(checkin).collect();
        let absences: Vec<AbsenceWithChild> =
            children.iter().skip(25).take(2).map(absence).collect();

        let report = build_daily_attendance(d(10), &children, checkins, absences);
        assert_eq!(report.expected, 28);
        assert_eq!(report.attended, 25);
        assert_eq!(report.absent, 2);

        let enrolled: i64 = report.by_program.iter().map(|p| p.enrolled).sum();
        let attended: i64 = report.by_program.iter().map(|p| p.attended).sum();
        assert_eq!(enrolled, 30);
        assert_eq!(attended, 25);
    }

    #[test]
    fn test_daily_attendance_dedupes_absence_children() {
        // Deux rapports pour le même enfant ne comptent qu'une absence
        let children: Vec<Child> = (0..3).map(|_| child(None)).collect();
        let absences = vec![absence(&children[0]), absence(&children[0])];
        let report = build_daily_attendance(d(10), &children, Vec::new(), absences);
        assert_eq!(report.absent, 1);
        assert_eq!(report.expected, 2);
    }
}
