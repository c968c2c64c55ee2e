use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::approval::{Action, ApprovalController};
use crate::calendar::{CalendarDays, Week, weekday_labels};
use crate::config::Config;
use crate::datetime::{format_project_timestamp, to_project_date};
use crate::grouping::AssignmentGroup;
use crate::holiday::{HolidaySet, marker_for, should_mark_red};
use crate::model::{ApprovalRecord, AssignmentType, DutySchedule, ScheduleStatus};
use crate::wire::{Directory, Page, ScheduleSummary};

const CELL_WIDTH: usize = 16;
const SIGNATURE_WIDTH: usize = 28;

/// Everything the printable calendar needs, already resolved.
#[derive(Debug, Clone)]
pub struct PrintLayout<'a> {
    pub institution: Option<&'a str>,
    pub schedule: &'a DutySchedule,
    pub weeks: &'a [Week],
    pub week_start: Weekday,
    pub holidays: &'a HolidaySet,
    pub printed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn status_badge(&self, status: ScheduleStatus) -> String {
        let code = match status {
            ScheduleStatus::Draft => "37",
            ScheduleStatus::Submitted => "33",
            ScheduleStatus::ManagerApproved => "34",
            ScheduleStatus::DirectorApproved => "36",
            ScheduleStatus::HrApproved => "32",
            ScheduleStatus::Rejected => "31",
        };
        self.paint(&format!("[{}]", status.label()), code)
    }

    #[tracing::instrument(skip(self, out, page))]
    pub fn schedule_list<W: Write>(
        &self,
        out: &mut W,
        page: &Page<ScheduleSummary>,
    ) -> anyhow::Result<()> {
        if page.items.is_empty() {
            writeln!(out, "No duty schedules found.")?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Name".to_string(),
            "Department".to_string(),
            "Period".to_string(),
            "Status".to_string(),
        ];
        let rows = page
            .items
            .iter()
            .map(|summary| {
                vec![
                    self.paint(&summary.id, "33"),
                    summary.name.clone(),
                    summary.department.name.clone(),
                    format!("{} to {}", summary.start_date, summary.end_date),
                    self.status_badge(summary.status),
                ]
            })
            .collect();

        write_table(&mut *out, headers, rows)?;
        writeln!(
            out,
            "page {} of {} ({} schedules)",
            page.page,
            page.total_pages().max(1),
            page.total
        )?;
        Ok(())
    }

    pub fn schedule_header<W: Write>(
        &self,
        out: &mut W,
        schedule: &DutySchedule,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}  {}", schedule.name, self.status_badge(schedule.status))?;
        if !schedule.department.name.is_empty() {
            writeln!(out, "department  {}", schedule.department.name)?;
        }
        writeln!(
            out,
            "period      {} to {}",
            schedule.start_date, schedule.end_date
        )?;
        for (title, record) in approval_trail(schedule) {
            if let Some(record) = record {
                writeln!(out, "{title:<11} {}", describe_record(record))?;
            }
        }
        Ok(())
    }

    /// Every displayed day that has assignments or a holiday.
    #[tracing::instrument(skip_all)]
    pub fn schedule_days<W, F>(
        &self,
        out: &mut W,
        days: CalendarDays,
        holidays: &HolidaySet,
        mut groups_for: F,
    ) -> anyhow::Result<()>
    where
        W: Write,
        F: FnMut(NaiveDate) -> Vec<AssignmentGroup>,
    {
        let mut printed = 0usize;
        for date in days {
            let groups = groups_for(date);
            if groups.is_empty() && holidays.get(date).is_none() {
                continue;
            }
            writeln!(out)?;
            self.day_groups(&mut *out, date, &groups, holidays)?;
            printed += 1;
        }
        if printed == 0 {
            writeln!(out)?;
            writeln!(out, "No assignments in this period.")?;
        }
        Ok(())
    }

    pub fn day_groups<W: Write>(
        &self,
        out: &mut W,
        date: NaiveDate,
        groups: &[AssignmentGroup],
        holidays: &HolidaySet,
    ) -> anyhow::Result<()> {
        let mut heading = format!("{} {}", date, weekday_name(date.weekday()));
        if should_mark_red(date, holidays) {
            heading = self.paint(&heading, "31");
        }
        match holidays.get(date) {
            Some(holiday) => writeln!(out, "{heading}  {} {}", marker_for(holiday), holiday.name)?,
            None => writeln!(out, "{heading}")?,
        }

        if groups.is_empty() {
            writeln!(out, "  (no assignments)")?;
            return Ok(());
        }

        for group in groups {
            if group.assignment_type == AssignmentType::Leave {
                writeln!(out, "  {}", group.label)?;
                for (abbr, members) in group.leave_subgroups() {
                    writeln!(out, "    {abbr:<6} {}", join_names(members.iter().copied()))?;
                }
                continue;
            }

            let detail = group
                .members
                .first()
                .and_then(|member| member.detail.as_deref())
                .filter(|detail| *detail != group.label);
            let label = match detail {
                Some(detail) => format!("{} ({detail})", group.label),
                None => group.label.clone(),
            };
            writeln!(out, "  {label}")?;
            writeln!(out, "    {}", join_names(group.members.iter()))?;
        }
        Ok(())
    }

    pub fn actions<W: Write>(
        &self,
        out: &mut W,
        controller: &ApprovalController,
    ) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} as {}",
            self.status_badge(controller.status()),
            controller.role()
        )?;
        if controller.status().is_final() {
            writeln!(out, "Schedule is final.")?;
            return Ok(());
        }
        if !controller.shows_controls() {
            writeln!(out, "No actions available.")?;
            return Ok(());
        }
        for action in controller.available_actions() {
            writeln!(out, "  {:<16} rota {}", action.label(), action_command(action))?;
        }
        Ok(())
    }

    pub fn directory<W: Write>(&self, out: &mut W, directory: &Directory) -> anyhow::Result<()> {
        writeln!(out, "Employees")?;
        write_table(
            &mut *out,
            vec!["ID".to_string(), "Name".to_string()],
            directory
                .employees
                .iter()
                .map(|employee| vec![employee.id.clone(), employee.display_name()])
                .collect(),
        )?;

        writeln!(out)?;
        writeln!(out, "Shift templates")?;
        write_table(
            &mut *out,
            vec!["ID".to_string(), "Name".to_string(), "Hours".to_string()],
            directory
                .shift_templates
                .iter()
                .map(|shift| {
                    vec![
                        shift.id.clone(),
                        shift.name.clone(),
                        crate::grouping::shift_time_range(shift).unwrap_or_default(),
                    ]
                })
                .collect(),
        )?;

        writeln!(out)?;
        writeln!(out, "Leave templates")?;
        write_table(
            &mut *out,
            vec!["ID".to_string(), "Name".to_string(), "Abbr".to_string()],
            directory
                .leave_templates
                .iter()
                .map(|leave| {
                    vec![
                        leave.id.clone(),
                        leave.name.clone(),
                        crate::grouping::leave_abbreviation(&leave.name),
                    ]
                })
                .collect(),
        )?;
        Ok(())
    }

    /// The printable calendar. Never colored: the output is meant for paper.
    #[tracing::instrument(skip_all, fields(schedule = %layout.schedule.id))]
    pub fn print_calendar<W, F>(
        &self,
        out: &mut W,
        layout: &PrintLayout<'_>,
        mut groups_for: F,
    ) -> anyhow::Result<()>
    where
        W: Write,
        F: FnMut(NaiveDate) -> Vec<AssignmentGroup>,
    {
        let schedule = layout.schedule;
        let grid_width = (CELL_WIDTH + 1) * 7 + 1;

        if let Some(institution) = layout.institution.filter(|name| !name.trim().is_empty()) {
            writeln!(out, "{}", center(institution.trim(), grid_width))?;
        }
        if !schedule.department.name.is_empty() {
            writeln!(out, "{}", center(&schedule.department.name, grid_width))?;
        }
        writeln!(out, "{}", center("DUTY SCHEDULE", grid_width))?;
        writeln!(out, "{}", center(&schedule.name, grid_width))?;
        writeln!(
            out,
            "{}",
            center(
                &format!("{} to {}", schedule.start_date, schedule.end_date),
                grid_width
            )
        )?;
        writeln!(
            out,
            "Printed {}",
            format_project_timestamp(layout.printed_at)
        )?;
        writeln!(out)?;

        let border = format!("+{}", format!("{}+", "-".repeat(CELL_WIDTH)).repeat(7));
        writeln!(out, "{border}")?;
        let header: String = weekday_labels(layout.week_start)
            .iter()
            .map(|label| format!("{}|", fit(label, CELL_WIDTH)))
            .collect();
        writeln!(out, "|{header}")?;
        writeln!(out, "{border}")?;

        for week in layout.weeks {
            let cells: Vec<Vec<String>> = week
                .iter()
                .map(|slot| match slot {
                    Some(date) => cell_lines(*date, &groups_for(*date), layout.holidays),
                    None => vec![],
                })
                .collect();
            let height = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);

            for row in 0..height {
                let line: String = cells
                    .iter()
                    .map(|cell| {
                        let text = cell.get(row).map(String::as_str).unwrap_or("");
                        format!("{}|", fit(text, CELL_WIDTH))
                    })
                    .collect();
                writeln!(out, "|{line}")?;
            }
            writeln!(out, "{border}")?;
        }

        writeln!(out, "* weekend or holiday")?;
        writeln!(out)?;
        self.signature_blocks(&mut *out, schedule)?;
        Ok(())
    }

    fn signature_blocks<W: Write>(&self, out: &mut W, schedule: &DutySchedule) -> anyhow::Result<()> {
        let blocks = [
            ("Prepared by:", schedule.prepared_by.as_ref(), "Department Manager"),
            ("Noted by:", schedule.director_approval.as_ref(), "Director"),
            ("Approved by:", schedule.hr_approval.as_ref(), "Human Resources"),
        ];

        let row = |cell: &dyn Fn(&str, Option<&ApprovalRecord>, &str) -> String| -> String {
            let line: String = blocks
                .iter()
                .map(|&(title, record, role)| fit(&cell(title, record, role), SIGNATURE_WIDTH))
                .collect();
            line.trim_end().to_string()
        };

        writeln!(out, "{}", row(&|title, _, _| title.to_string()))?;
        writeln!(out)?;
        writeln!(out, "{}", row(&|_, _, _| "_".repeat(SIGNATURE_WIDTH - 4)))?;
        writeln!(
            out,
            "{}",
            row(&|_, record, _| {
                record
                    .map(|r| r.approver_name.to_uppercase())
                    .unwrap_or_default()
            })
        )?;
        writeln!(out, "{}", row(&|_, _, role| role.to_string()))?;
        writeln!(
            out,
            "{}",
            row(&|_, record, _| {
                record
                    .map(|r| to_project_date(r.decided_at).to_string())
                    .unwrap_or_default()
            })
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

/// Lines of one printable day cell: day number with markers, then groups.
pub fn cell_lines(date: NaiveDate, groups: &[AssignmentGroup], holidays: &HolidaySet) -> Vec<String> {
    let mut first = format!("{:>2}", date.day());
    if should_mark_red(date, holidays) {
        first.push('*');
    }
    if let Some(holiday) = holidays.get(date) {
        first.push(' ');
        first.push_str(marker_for(holiday));
    }

    let mut lines = vec![first];
    for group in groups {
        lines.push(group.label.clone());
        if group.assignment_type == AssignmentType::Leave {
            for (abbr, members) in group.leave_subgroups() {
                for member in members {
                    lines.push(format!(" {abbr} {}", member.display_name));
                }
            }
        } else {
            for member in &group.members {
                lines.push(format!(" {}", member.display_name));
            }
        }
    }
    lines
}

fn approval_trail(schedule: &DutySchedule) -> [(&'static str, Option<&ApprovalRecord>); 3] {
    [
        ("prepared", schedule.prepared_by.as_ref()),
        ("director", schedule.director_approval.as_ref()),
        ("hr", schedule.hr_approval.as_ref()),
    ]
}

fn describe_record(record: &ApprovalRecord) -> String {
    let mut text = format!(
        "{:?} by {} on {}",
        record.decision,
        if record.approver_name.is_empty() {
            record.approver_id.as_str()
        } else {
            record.approver_name.as_str()
        },
        format_project_timestamp(record.decided_at)
    );
    if let Some(remarks) = &record.remarks {
        text.push_str(&format!(" ({remarks})"));
    }
    text
}

fn action_command(action: Action) -> &'static str {
    match action {
        Action::Submit => "submit <id>",
        Action::ReturnToDraft => "withdraw <id>",
        Action::Approve => "approve <id> [remarks:TEXT]",
        Action::Reject => "reject <id> remarks:TEXT",
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

fn join_names<'a, I>(members: I) -> String
where
    I: Iterator<Item = &'a crate::grouping::AssignmentDisplay>,
{
    members
        .map(|member| match &member.remark {
            Some(remark) if !remark.trim().is_empty() => {
                format!("{} ({})", member.display_name, remark.trim())
            }
            _ => member.display_name.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pads or truncates to exactly `width` display columns.
fn fit(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(width);
    let mut used = 0usize;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push_str(&" ".repeat(width - used));
    out
}

fn center(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(text);
    let pad = width.saturating_sub(visible) / 2;
    format!("{}{text}", " ".repeat(pad))
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{display_range_for, generate_calendar_weeks};
    use crate::grouping::employees_for_date;
    use crate::model::{
        AssignmentKind, DepartmentRef, EmployeeAssignment, EmployeeRef, Entry, Holiday,
        LeaveTemplate, ShiftTemplate,
    };

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn employee(id: &str, first: &str, surname: &str) -> EmployeeRef {
        EmployeeRef {
            id: id.to_string(),
            first_name: first.to_string(),
            surname: surname.to_string(),
        }
    }

    fn schedule() -> DutySchedule {
        let shift = ShiftTemplate {
            id: "sh1".to_string(),
            name: "Morning".to_string(),
            start_time: Some("07:00".to_string()),
            end_time: Some("15:00".to_string()),
            ..Default::default()
        };
        DutySchedule {
            id: "s1".to_string(),
            name: "May Roster".to_string(),
            department: DepartmentRef {
                id: "d1".to_string(),
                name: "Nursing".to_string(),
            },
            start_date: "2025-05-01".to_string(),
            end_date: "2025-05-31".to_string(),
            status: ScheduleStatus::Submitted,
            entries: vec![Entry {
                date: ymd(2025, 5, 1),
                holiday: Some(Holiday {
                    name: "Labor Day".to_string(),
                    kind: Some("Regular Holiday".to_string()),
                }),
                assignments: vec![
                    EmployeeAssignment {
                        employee: employee("e1", "Maria", "Santos"),
                        kind: AssignmentKind::Duty { shift: Some(shift) },
                        remark: None,
                    },
                    EmployeeAssignment {
                        employee: employee("e2", "Ana", "Reyes"),
                        kind: AssignmentKind::Leave {
                            leave: Some(LeaveTemplate {
                                id: "l1".to_string(),
                                name: "Sick Leave".to_string(),
                            }),
                        },
                        remark: None,
                    },
                ],
            }],
            prepared_by: None,
            director_approval: None,
            hr_approval: None,
        }
    }

    #[test]
    fn fit_pads_and_truncates() {
        assert_eq!(fit("abc", 5), "abc  ");
        assert_eq!(fit("abcdefgh", 4), "abcd");
        assert_eq!(UnicodeWidthStr::width(fit("日本語", 5).as_str()), 5);
    }

    #[test]
    fn cell_lines_mark_holidays_and_leave() {
        let schedule = schedule();
        let holidays = HolidaySet::from_entries(&schedule.entries);
        let date = ymd(2025, 5, 1);
        let lines = cell_lines(date, &employees_for_date(&schedule.entries, date), &holidays);
        assert_eq!(
            lines,
            vec![
                " 1* RH".to_string(),
                "Morning".to_string(),
                " Santos, M.".to_string(),
                "LEAVE".to_string(),
                " SL Reyes, A.".to_string(),
            ]
        );

        let plain = cell_lines(ymd(2025, 5, 2), &[], &holidays);
        assert_eq!(plain, vec![" 2".to_string()]);
    }

    #[test]
    fn printable_calendar_has_grid_and_signatures() {
        let schedule = schedule();
        let holidays = HolidaySet::from_entries(&schedule.entries);
        let weeks = generate_calendar_weeks(display_range_for(&schedule.end_date), Weekday::Sun);
        let layout = PrintLayout {
            institution: Some("City General Hospital"),
            schedule: &schedule,
            weeks: &weeks,
            week_start: Weekday::Sun,
            holidays: &holidays,
            printed_at: Utc::now(),
        };

        let mut buf = Vec::new();
        Renderer::plain()
            .print_calendar(&mut buf, &layout, |date| {
                employees_for_date(&schedule.entries, date)
            })
            .expect("render");
        let text = String::from_utf8(buf).expect("utf8");

        assert!(text.contains("City General Hospital"));
        assert!(text.contains("2025-05-01 to 2025-05-31"));
        assert!(text.contains("Prepared by:"));
        assert!(text.contains("Noted by:"));
        assert!(text.contains("Approved by:"));
        assert!(text.contains(" 1* RH"));
        assert!(!text.contains('\x1b'));
        let first_grid_line = text
            .lines()
            .find(|line| line.starts_with('+'))
            .expect("border");
        assert_eq!(first_grid_line.len(), (CELL_WIDTH + 1) * 7 + 1);
    }

    #[test]
    fn actions_show_badge_only_without_controls() {
        let mut buf = Vec::new();
        let draft = ApprovalController::new("s1", crate::approval::Role::Director, ScheduleStatus::Draft);
        Renderer::plain().actions(&mut buf, &draft).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("[Draft]"));
        assert!(text.contains("No actions available."));

        let mut buf = Vec::new();
        let pending =
            ApprovalController::new("s1", crate::approval::Role::Director, ScheduleStatus::Submitted);
        Renderer::plain().actions(&mut buf, &pending).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("rota approve"));
        assert!(text.contains("rota reject"));

        let mut buf = Vec::new();
        let rejected =
            ApprovalController::new("s1", crate::approval::Role::Hr, ScheduleStatus::Rejected);
        Renderer::plain().actions(&mut buf, &rejected).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("[Rejected]"));
        assert!(text.contains("Schedule is final."));
    }

    #[test]
    fn list_table_aligns_columns() {
        let page = Page {
            items: vec![crate::wire::ScheduleRecord::<crate::wire::SnapshotAssignment> {
                id: "s1".to_string(),
                name: "May Roster".to_string(),
                department: Default::default(),
                start_date: "2025-05-01".to_string(),
                end_date: "2025-05-31".to_string(),
                status: ScheduleStatus::Draft,
                entries: vec![],
                prepared_by: None,
                director_approval: None,
                hr_approval: None,
            }
            .summary()],
            page: 1,
            limit: 20,
            total: 1,
        };
        let mut buf = Vec::new();
        Renderer::plain().schedule_list(&mut buf, &page).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("ID "));
        assert!(lines[2].contains("2025-05-01 to 2025-05-31"));
        assert_eq!(lines[3], "page 1 of 1 (1 schedules)");
    }
}
