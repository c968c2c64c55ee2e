use std::collections::BTreeMap;
use std::io::{self, BufRead, Read, Write};

use anyhow::{Context, anyhow};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::adapter::schedule_from_live;
use crate::approval::{Action, ApprovalController, Notice};
use crate::backend::ScheduleBackend;
use crate::calendar::calendar_days;
use crate::cli::Invocation;
use crate::config::{Config, is_secret};
use crate::datetime::parse_date_arg;
use crate::grouping::employees_for_date;
use crate::holiday::HolidaySet;
use crate::loader::ScheduleLoader;
use crate::render::{PrintLayout, Renderer};
use crate::store::ScheduleStore;
use crate::wire::{PageQuery, SnapshotSchedule};

const NAMED_ARGS: &[&str] = &["page", "limit", "search", "employee", "remarks"];

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list",
        "show",
        "day",
        "print",
        "actions",
        "submit",
        "withdraw",
        "approve",
        "reject",
        "import",
        "directory",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Positional arguments plus recognised `name:value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    pub positional: Vec<String>,
    pub named: BTreeMap<String, String>,
}

impl CommandArgs {
    pub fn parse(args: &[String]) -> Self {
        let mut out = Self::default();
        for arg in args {
            match arg.split_once(':') {
                Some((name, value)) if NAMED_ARGS.contains(&name) => {
                    out.named.insert(name.to_string(), value.to_string());
                }
                _ => out.positional.push(arg.clone()),
            }
        }
        out
    }

    pub fn named(&self, name: &str) -> Option<&str> {
        self.named
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    fn required(&self, idx: usize, what: &str) -> anyhow::Result<&str> {
        self.positional
            .get(idx)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing {what}"))
    }

    fn number(&self, name: &str) -> anyhow::Result<Option<u32>> {
        self.named(name)
            .map(|raw| {
                raw.parse::<u32>()
                    .with_context(|| format!("{name} must be a positive number, got '{raw}'"))
            })
            .transpose()
    }
}

/// The backend commands talk to, plus the file store when that is the backend.
pub struct Session<'a> {
    pub backend: &'a dyn ScheduleBackend,
    pub store: Option<&'a ScheduleStore>,
}

#[instrument(skip(session, cfg, renderer, inv))]
pub fn dispatch(
    session: &Session<'_>,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = CommandArgs::parse(&inv.command_args);
    debug!(command, args = ?args, "dispatching command");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        "list" => cmd_list(session.backend, cfg, renderer, &args, &mut out),
        "show" => cmd_show_schedule(session.backend, renderer, &args, &mut out),
        "day" => cmd_day(session.backend, renderer, &args, &mut out),
        "print" => cmd_print(session.backend, cfg, renderer, &args, &mut out),
        "actions" => cmd_actions(session.backend, cfg, renderer, &args, &mut out),
        "submit" => cmd_transition(session.backend, cfg, Action::Submit, &args, &mut out),
        "withdraw" => cmd_transition(session.backend, cfg, Action::ReturnToDraft, &args, &mut out),
        "approve" => cmd_transition(session.backend, cfg, Action::Approve, &args, &mut out),
        "reject" => cmd_transition(session.backend, cfg, Action::Reject, &args, &mut out),
        "import" => {
            let store = session
                .store
                .ok_or_else(|| anyhow!("import requires backend=file"))?;
            cmd_import(store, &mut out)
        }
        "directory" => cmd_directory(session.backend, cfg, renderer, &args, &mut out),
        "_commands" => cmd_commands(&mut out),
        "_show" => cmd_show_config(cfg, &mut out),
        "help" => cmd_help(&mut out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(backend, cfg, renderer, args, out))]
pub fn cmd_list<W: Write>(
    backend: &dyn ScheduleBackend,
    cfg: &Config,
    renderer: &Renderer,
    args: &CommandArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let department = department_arg(cfg, args)?;
    let query = PageQuery {
        page: args.number("page")?.unwrap_or(1).max(1),
        limit: args.number("limit")?.unwrap_or(cfg.list_limit()?).max(1),
        search: args.named("search").map(str::to_string),
    };
    info!(department = %department, page = query.page, limit = query.limit, "command list");

    let page = backend
        .list_by_department(&department, &query)
        .map_err(|err| anyhow!(err.user_message()))
        .with_context(|| format!("failed to list schedules for department {department}"))?;
    renderer.schedule_list(out, &page)
}

/// Loads the snapshot through the loader so notices and day derivation
/// behave the same for every view.
fn load_schedule(
    backend: &dyn ScheduleBackend,
    schedule_id: &str,
    employee_id: Option<&str>,
) -> anyhow::Result<ScheduleLoader> {
    let mut loader = ScheduleLoader::new();
    loader.load(backend, schedule_id, employee_id);
    if let Some(message) = loader.take_error() {
        return Err(anyhow!(message))
            .with_context(|| format!("failed to load duty schedule {schedule_id}"));
    }
    if loader.schedule().is_none() {
        return Err(anyhow!("duty schedule {schedule_id} was not loaded"));
    }
    Ok(loader)
}

#[instrument(skip(backend, renderer, args, out))]
pub fn cmd_show_schedule<W: Write>(
    backend: &dyn ScheduleBackend,
    renderer: &Renderer,
    args: &CommandArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let schedule_id = args.required(0, "schedule id")?;
    let employee_id = args.named("employee");
    info!(schedule_id, employee_id, "command show");

    let loader = load_schedule(backend, schedule_id, employee_id)?;
    let Some(schedule) = loader.schedule() else {
        return Ok(());
    };

    renderer.schedule_header(&mut *out, schedule)?;
    if let Some(employee_id) = employee_id {
        writeln!(out, "employee    {employee_id}")?;
    }
    let holidays = loader.holidays();
    renderer.schedule_days(out, loader.days(), &holidays, |date| loader.groups_for(date))
}

/// One day of a schedule, resolved from the live record and the
/// department directory.
#[instrument(skip(backend, renderer, args, out))]
pub fn cmd_day<W: Write>(
    backend: &dyn ScheduleBackend,
    renderer: &Renderer,
    args: &CommandArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let schedule_id = args.required(0, "schedule id")?;
    let date = parse_date_arg(args.required(1, "date")?, Utc::now())?;
    info!(schedule_id, %date, "command day");

    let record = backend
        .fetch_schedule(schedule_id)
        .map_err(|err| anyhow!(err.user_message()))
        .with_context(|| format!("failed to fetch duty schedule {schedule_id}"))?;
    let directory = backend
        .fetch_directory(&record.department.id)
        .map_err(|err| anyhow!(err.user_message()))
        .with_context(|| format!("failed to fetch directory for {}", record.department.id))?;
    let schedule = schedule_from_live(record, &directory);

    if let (Some(start), Some(end)) = (schedule.start(), schedule.end())
        && !calendar_days(start, end).contains(date)
    {
        warn!(%date, %start, %end, "date outside schedule period");
    }

    let holidays = HolidaySet::from_entries(&schedule.entries);
    let groups = employees_for_date(&schedule.entries, date);
    writeln!(out, "{}", schedule.name)?;
    renderer.day_groups(out, date, &groups, &holidays)
}

#[instrument(skip(backend, cfg, renderer, args, out))]
pub fn cmd_print<W: Write>(
    backend: &dyn ScheduleBackend,
    cfg: &Config,
    renderer: &Renderer,
    args: &CommandArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let schedule_id = args.required(0, "schedule id")?;
    info!(schedule_id, "command print");

    let loader = load_schedule(backend, schedule_id, None)?;
    let Some(schedule) = loader.schedule() else {
        return Ok(());
    };
    let week_start = cfg.week_start()?;
    let weeks = loader.weeks(week_start);
    let holidays = loader.holidays();
    let institution = cfg.get("print.institution");

    let layout = PrintLayout {
        institution: institution.as_deref(),
        schedule,
        weeks: &weeks,
        week_start,
        holidays: &holidays,
        printed_at: Utc::now(),
    };
    renderer.print_calendar(out, &layout, |date| loader.groups_for(date))
}

#[instrument(skip(backend, cfg, renderer, args, out))]
pub fn cmd_actions<W: Write>(
    backend: &dyn ScheduleBackend,
    cfg: &Config,
    renderer: &Renderer,
    args: &CommandArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let schedule_id = args.required(0, "schedule id")?;
    let controller = controller_for(backend, cfg, schedule_id)?;
    renderer.actions(out, &controller)
}

fn controller_for(
    backend: &dyn ScheduleBackend,
    cfg: &Config,
    schedule_id: &str,
) -> anyhow::Result<ApprovalController> {
    let role = cfg.role()?;
    let record = backend
        .fetch_snapshot(schedule_id, None)
        .map_err(|err| anyhow!(err.user_message()))
        .with_context(|| format!("failed to fetch duty schedule {schedule_id}"))?;
    Ok(ApprovalController::new(schedule_id, role, record.status))
}

/// Runs one approval action through the controller: permission check,
/// form validation, dispatch by role, then the resulting notice.
#[instrument(skip(backend, cfg, args, out))]
pub fn cmd_transition<W: Write>(
    backend: &dyn ScheduleBackend,
    cfg: &Config,
    action: Action,
    args: &CommandArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let schedule_id = args.required(0, "schedule id")?;
    let mut controller = controller_for(backend, cfg, schedule_id)?;
    controller.open(action)?;

    if let Some(remarks) = args.named("remarks") {
        controller.set_remarks(remarks);
    }
    controller.set_password(read_password()?);

    let outcome = controller.submit(backend);
    match controller.take_notice() {
        Some(Notice::Success(message)) => writeln!(out, "{message}")?,
        Some(Notice::Error(message)) => return Err(anyhow!(message)),
        None => {}
    }
    outcome?;
    writeln!(out, "status: {}", controller.status().label())?;
    Ok(())
}

/// `ROTA_PASSWORD`, or one line from stdin.
fn read_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var("ROTA_PASSWORD") {
        return Ok(password);
    }

    eprint!("Password: ");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed reading password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[instrument(skip(store, out))]
fn cmd_import<W: Write>(store: &ScheduleStore, out: &mut W) -> anyhow::Result<()> {
    info!("command import");

    let mut stdin = String::new();
    io::stdin()
        .read_to_string(&mut stdin)
        .context("failed reading stdin")?;

    let count = import_schedules(store, &stdin)?;
    writeln!(out, "Imported {count} duty schedule(s).")?;
    Ok(())
}

/// Upserts every schedule in `input` (a JSON array, one object, or one
/// object per line). Returns how many were written.
pub fn import_schedules(store: &ScheduleStore, input: &str) -> anyhow::Result<usize> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let records = parse_import_items(trimmed)?;
    let mut written = 0usize;
    for record in records {
        let id = store.upsert(record)?;
        debug!(%id, "imported schedule");
        written += 1;
    }
    Ok(written)
}

fn parse_import_items(trimmed: &str) -> anyhow::Result<Vec<SnapshotSchedule>> {
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("failed parsing JSON array");
    }

    if trimmed.starts_with('{')
        && let Ok(item) = serde_json::from_str::<SnapshotSchedule>(trimmed)
    {
        return Ok(vec![item]);
    }

    let mut out = Vec::new();
    for (idx, line) in trimmed.lines().enumerate() {
        let token = line.trim();
        if token.is_empty() {
            continue;
        }
        let item: SnapshotSchedule = serde_json::from_str(token)
            .with_context(|| format!("failed parsing import line {}", idx + 1))?;
        out.push(item);
    }

    if out.is_empty() {
        return Err(anyhow!("import: empty input"));
    }
    Ok(out)
}

#[instrument(skip(backend, cfg, renderer, args, out))]
fn cmd_directory<W: Write>(
    backend: &dyn ScheduleBackend,
    cfg: &Config,
    renderer: &Renderer,
    args: &CommandArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let department = department_arg(cfg, args)?;
    let directory = backend
        .fetch_directory(&department)
        .map_err(|err| anyhow!(err.user_message()))
        .with_context(|| format!("failed to fetch directory for {department}"))?;
    renderer.directory(out, &directory)
}

fn department_arg(cfg: &Config, args: &CommandArgs) -> anyhow::Result<String> {
    args.positional
        .first()
        .cloned()
        .or_else(|| cfg.get("user.department"))
        .ok_or_else(|| anyhow!("missing department id (argument or user.department)"))
}

fn cmd_commands<W: Write>(out: &mut W) -> anyhow::Result<()> {
    for command in known_command_names() {
        writeln!(out, "{command}")?;
    }
    Ok(())
}

fn cmd_show_config<W: Write>(cfg: &Config, out: &mut W) -> anyhow::Result<()> {
    let sorted: BTreeMap<_, _> = cfg.iter().collect();
    for (k, v) in sorted {
        if is_secret(k) {
            writeln!(out, "{k}=***")?;
        } else {
            writeln!(out, "{k}={v}")?;
        }
    }
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "Commands: list [department] [page:N] [limit:N] [search:TEXT], show <id> [employee:ID], \
         day <id> <date>, print <id>, actions <id>, submit <id>, withdraw <id>, \
         approve <id> [remarks:TEXT], reject <id> remarks:TEXT, import, directory [department]"
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviations_expand_only_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("pr", &known), Some("print"));
        assert_eq!(expand_command_abbrev("di", &known), Some("directory"));
        assert_eq!(expand_command_abbrev("d", &known), None);
        assert_eq!(expand_command_abbrev("list", &known), Some("list"));
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }

    #[test]
    fn named_args_split_from_positional() {
        let args = CommandArgs::parse(&[
            "s1".to_string(),
            "remarks:needs: more nurses".to_string(),
            "note:kept".to_string(),
            "page:".to_string(),
        ]);
        assert_eq!(args.positional, vec!["s1", "note:kept"]);
        assert_eq!(args.named("remarks"), Some("needs: more nurses"));
        assert_eq!(args.named("page"), None);
    }

    #[test]
    fn import_accepts_array_object_and_lines() {
        let one = r#"{"id":"s1","name":"May","startDate":"2025-05-01","endDate":"2025-05-31","status":"draft","entries":[]}"#;
        let two = r#"{"id":"s2","name":"June","startDate":"2025-06-01","endDate":"2025-06-30","status":"submitted","entries":[]}"#;

        assert_eq!(parse_import_items(one).expect("object").len(), 1);
        assert_eq!(parse_import_items(&format!("[{one},{two}]")).expect("array").len(), 2);
        assert_eq!(parse_import_items(&format!("{one}\n\n{two}\n")).expect("lines").len(), 2);
        assert!(parse_import_items("{not json").is_err());
    }

    #[test]
    fn show_config_redacts_secrets() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![
            ("auth.password".to_string(), "hunter2".to_string()),
            ("api.token".to_string(), "abc".to_string()),
        ]);
        let mut buf = Vec::new();
        cmd_show_config(&cfg, &mut buf).expect("show");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("auth.password=***"));
        assert!(text.contains("api.token=***"));
        assert!(!text.contains("hunter2"));
        assert!(text.contains("backend=file"));
    }
}
