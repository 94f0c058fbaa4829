use std::fmt::Display;

use anyhow::{Context, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::calendar::month_flags;
use crate::cli::{Command, MainCommand, MainSetArgs, TaskCommand, parse_weekday_list};
use crate::config::Config;
use crate::countdown::{CountdownState, SnapshotSource, Ticker};
use crate::datastore::{DataStore, TaskPatch};
use crate::datetime::{parse_date_expr, parse_day_expr, parse_month_expr};
use crate::occurrence::occurrences_on_date;
use crate::recurrence::is_active_day;
use crate::reminder::{RepeatType, TaskId};
use crate::render::Renderer;
use crate::scanner::next_trigger;

#[instrument(skip(store, cfg, renderer, command, tz))]
pub fn dispatch<Tz>(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    command: Command,
    tz: Tz,
) -> anyhow::Result<()>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Display + Send + Sync,
{
    let now = Utc::now().with_timezone(&tz);
    debug!(?command, now = %now, "dispatching command");

    match command {
        Command::Main(MainCommand::Show) => cmd_main_show(store, renderer),
        Command::Main(MainCommand::Set(args)) => cmd_main_set(store, renderer, args, &now),
        Command::Main(MainCommand::Toggle) => cmd_main_toggle(store),
        Command::Task(TaskCommand::Add { message, at }) => {
            cmd_task_add(store, &message.join(" "), &at, &now)
        }
        Command::Task(TaskCommand::List) => cmd_task_list(store, renderer, &now),
        Command::Task(TaskCommand::Edit { id, message, at }) => {
            cmd_task_edit(store, id, message, at.as_deref(), &now)
        }
        Command::Task(TaskCommand::Enable { id }) => cmd_task_set_active(store, id, true),
        Command::Task(TaskCommand::Disable { id }) => cmd_task_set_active(store, id, false),
        Command::Task(TaskCommand::Delete { id }) => cmd_task_delete(store, id),
        Command::Day { date } => cmd_day(store, renderer, &date, &now),
        Command::Month { month } => cmd_month(store, renderer, &month, &now),
        Command::Next => cmd_next(store, renderer, &now),
        Command::Countdown => cmd_countdown(store, cfg, renderer, tz),
        Command::Show => cmd_show(cfg),
    }
}

#[instrument(skip(store, renderer))]
fn cmd_main_show(store: &DataStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command main show");
    let main = store.load_main()?;
    renderer.print_main(&main)
}

#[instrument(skip(store, renderer, args, now))]
fn cmd_main_set<Tz: TimeZone>(
    store: &DataStore,
    renderer: &mut Renderer,
    args: MainSetArgs,
    now: &DateTime<Tz>,
) -> anyhow::Result<()> {
    info!("command main set");
    let mut main = store.load_main()?;

    if let Some(message) = args.message {
        if message.trim().is_empty() {
            return Err(anyhow!("reminder message cannot be empty"));
        }
        main.message = message;
    }
    if let Some(time) = args.time {
        main.time_of_day = time;
    }
    if let Some(repeat) = args.repeat {
        main.repeat_type = repeat;
    }
    if let Some(days) = args.days.as_deref() {
        main.days_of_week = parse_weekday_list(days)?;
    }
    if let Some(interval) = args.interval {
        main.interval_days = interval;
    }
    if let Some(count) = args.count {
        main.occurrences_per_active_day = count;
    }
    if let Some(start) = args.start.as_deref() {
        main.start_date = if start.trim().eq_ignore_ascii_case("none") {
            None
        } else {
            Some(
                parse_day_expr(start, now)
                    .with_context(|| format!("invalid start date: {start}"))?,
            )
        };
    }
    if args.on {
        main.active = true;
    } else if args.off {
        main.active = false;
    }

    match main.repeat_type {
        RepeatType::Hourly if main.days_of_week.is_empty() => {
            warn!("hourly reminder has no weekdays selected; it will never fire");
        }
        RepeatType::DailyInterval if main.start_date.is_none() => {
            warn!("daily-interval reminder has no start date; it will never fire");
        }
        _ => {}
    }

    store.save_main(&main)?;
    println!("Main reminder saved.");
    renderer.print_main(&main)
}

#[instrument(skip(store))]
fn cmd_main_toggle(store: &DataStore) -> anyhow::Result<()> {
    info!("command main toggle");
    let mut main = store.load_main()?;
    main.active = !main.active;
    store.save_main(&main)?;

    println!(
        "Main reminder {}.",
        if main.active { "enabled" } else { "disabled" }
    );
    Ok(())
}

#[instrument(skip(store, message, now))]
fn cmd_task_add<Tz: TimeZone>(
    store: &DataStore,
    message: &str,
    at: &str,
    now: &DateTime<Tz>,
) -> anyhow::Result<()> {
    info!("command task add");
    let timestamp = parse_date_expr(at, now)?;
    if timestamp <= now.with_timezone(&Utc) {
        warn!(%timestamp, "task time is already in the past; it will not fire");
    }

    let task = store.add_task(message.to_string(), timestamp)?;
    println!("Created task {}.", task.id);
    Ok(())
}

#[instrument(skip(store, renderer, now))]
fn cmd_task_list<Tz: TimeZone>(
    store: &DataStore,
    renderer: &mut Renderer,
    now: &DateTime<Tz>,
) -> anyhow::Result<()>
where
    Tz::Offset: Display,
{
    info!("command task list");
    let mut tasks = store.load_tasks()?;
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    tasks.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    renderer.print_task_table(&tasks, now)
}

#[instrument(skip(store, message, now))]
fn cmd_task_edit<Tz: TimeZone>(
    store: &DataStore,
    id: TaskId,
    message: Option<String>,
    at: Option<&str>,
    now: &DateTime<Tz>,
) -> anyhow::Result<()> {
    info!("command task edit");
    let patch = TaskPatch {
        message,
        timestamp: at.map(|expr| parse_date_expr(expr, now)).transpose()?,
        active: None,
    };

    let task = store.update_task(id, &patch)?;
    println!("Modified task {}.", task.id);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_task_set_active(store: &DataStore, id: TaskId, active: bool) -> anyhow::Result<()> {
    info!("command task enable/disable");
    let patch = TaskPatch {
        active: Some(active),
        ..TaskPatch::default()
    };

    let task = store.update_task(id, &patch)?;
    println!(
        "{} task {}.",
        if active { "Enabled" } else { "Disabled" },
        task.id
    );
    Ok(())
}

#[instrument(skip(store))]
fn cmd_task_delete(store: &DataStore, id: TaskId) -> anyhow::Result<()> {
    info!("command task delete");
    let task = store.delete_task(id)?;
    println!("Deleted task {} ({}).", task.id, task.message);
    Ok(())
}

#[instrument(skip(store, renderer, now))]
fn cmd_day<Tz: TimeZone>(
    store: &DataStore,
    renderer: &mut Renderer,
    expr: &str,
    now: &DateTime<Tz>,
) -> anyhow::Result<()> {
    info!("command day");
    let date = parse_day_expr(expr, now)?;
    let snapshot = store.snapshot()?;
    let tz = now.timezone();

    debug!(
        %date,
        main_active_day = is_active_day(date, &snapshot.main),
        "resolved day"
    );
    let occurrences = occurrences_on_date(date, &snapshot.main, &snapshot.tasks, &tz);
    renderer.print_day(date, &occurrences, &tz)
}

#[instrument(skip(store, renderer, now))]
fn cmd_month<Tz: TimeZone>(
    store: &DataStore,
    renderer: &mut Renderer,
    expr: &str,
    now: &DateTime<Tz>,
) -> anyhow::Result<()> {
    info!("command month");
    let today = now.date_naive();
    let (year, month) = parse_month_expr(expr, today)?;
    let snapshot = store.snapshot()?;

    let flags = month_flags(year, month, &snapshot.main, &snapshot.tasks, &now.timezone());
    renderer.print_month(year, month, &flags, today)
}

#[instrument(skip(store, renderer, now))]
fn cmd_next<Tz: TimeZone>(
    store: &DataStore,
    renderer: &mut Renderer,
    now: &DateTime<Tz>,
) -> anyhow::Result<()>
where
    Tz::Offset: Display,
{
    info!("command next");
    let snapshot = store.snapshot()?;
    let next = next_trigger(&snapshot.main, &snapshot.tasks, now);
    let state = CountdownState::evaluate(next.as_ref(), now.with_timezone(&Utc));

    renderer.print_countdown(&state, false)?;
    if let Some(next) = next {
        println!(
            "at {}",
            next.instant
                .with_timezone(&now.timezone())
                .format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

#[instrument(skip(store, cfg, renderer, tz))]
fn cmd_countdown<Tz>(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    tz: Tz,
) -> anyhow::Result<()>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    info!("command countdown");
    let period = cfg.countdown_period()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let source = store.clone();
    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ticker = Ticker::new(source, tz, tx, cancel.child_token()).with_period(period);
        let handle = tokio::spawn(ticker.run());

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let outcome = loop {
            tokio::select! {
                signal = &mut ctrl_c => {
                    if let Err(err) = signal {
                        warn!(error = %err, "failed to listen for Ctrl-C");
                    }
                    info!("countdown interrupted");
                    break Ok(());
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        break Err(anyhow!("countdown ticker stopped unexpectedly"));
                    };
                    if let Err(err) = renderer.print_countdown(&event.state, true) {
                        break Err(err);
                    }
                }
            }
        };

        cancel.cancel();
        handle.await.context("countdown ticker failed")?;
        println!();
        outcome
    })
}

#[instrument(skip(cfg))]
fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    info!("command show");
    for (key, value) in cfg.iter() {
        println!("{key}={value}");
    }
    if let Some(path) = &cfg.source {
        println!("# loaded {}", path.display());
    }
    Ok(())
}
