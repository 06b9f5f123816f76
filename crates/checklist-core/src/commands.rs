use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, anyhow};
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::{AddArgs, BulkDeleteArgs, Command, EditArgs};
use crate::config::Config;
use crate::datastore::FileStore;
use crate::form::FormError;
use crate::poller::TickReport;
use crate::render::Renderer;
use crate::session::{BulkDeleteOutcome, Confirm, DeleteOutcome, Session, Submitted};
use crate::task::Category;

/// Asks on stdin. Without a terminal there is nobody to ask, so it declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptConfirm;

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            warn!(prompt, "no terminal to confirm on; declining (use --yes)");
            return false;
        }

        let mut err = io::stderr().lock();
        if write!(err, "{prompt} [y/N] ").and_then(|_| err.flush()).is_err() {
            return false;
        }

        let mut answer = String::new();
        if stdin.lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[instrument(skip_all, fields(command = ?command))]
pub async fn dispatch(
    session: &mut Session,
    store: &FileStore,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    debug!(view = %session.view(), "dispatching command");

    match command {
        Command::List => cmd_list(session, renderer),
        Command::Add(args) => cmd_add(session, renderer, args).await,
        Command::Edit(args) => cmd_edit(session, renderer, args).await,
        Command::Toggle { task } => cmd_toggle(session, &task).await,
        Command::Delete { task } => cmd_delete(session, &task).await,
        Command::BulkDelete(args) => cmd_bulk_delete(session, args).await,
        Command::Tick => cmd_tick(session, cfg).await,
        Command::Watch => cmd_watch(session, store, cfg).await,
        Command::Categories => cmd_categories(),
        Command::Show => cmd_show(cfg),
    }
}

fn cmd_list(session: &Session, renderer: &Renderer) -> anyhow::Result<()> {
    let today = session.clock().today(Utc::now());
    renderer.print_task_table(session.view(), &session.visible(), today)
}

#[instrument(skip(session, renderer, args))]
async fn cmd_add(
    session: &mut Session,
    renderer: &Renderer,
    args: AddArgs,
) -> anyhow::Result<()> {
    session.open_create()?;
    let staged = stage(session, |form| {
        form.name = args.name;
        form.description = args.description.unwrap_or_default();
        form.deadline = args.deadline.unwrap_or_default();
        for raw in &args.reminders {
            form.add_reminder(raw)?;
        }
        Ok(())
    });
    if let Err(err) = staged {
        session.close_form();
        return Err(err.into());
    }

    match session.submit(Utc::now()).await {
        Ok(Submitted::Created(task)) => {
            println!("Created task {}.", task.short_id());
            renderer.print_task_info(&task)
        }
        Ok(Submitted::Updated(id)) => Err(anyhow!("expected a new task, updated {id}")),
        Err(err) => {
            session.close_form();
            Err(err.into())
        }
    }
}

#[instrument(skip(session, renderer, args))]
async fn cmd_edit(
    session: &mut Session,
    renderer: &Renderer,
    args: EditArgs,
) -> anyhow::Result<()> {
    let id = session.resolve(&args.task)?;
    session.open_edit(id)?;
    let staged = stage(session, |form| {
        if let Some(name) = args.name {
            form.name = name;
        }
        if let Some(description) = args.description {
            form.description = description;
        }
        if let Some(deadline) = args.deadline {
            form.deadline = deadline;
        }
        if args.clear_reminders {
            form.clear_reminders();
        }
        for raw in &args.drop_reminders {
            form.remove_reminder(raw)?;
        }
        for raw in &args.add_reminders {
            form.add_reminder(raw)?;
        }
        Ok(())
    });
    if let Err(err) = staged {
        session.close_form();
        return Err(err.into());
    }

    let result = session.submit(Utc::now()).await;
    session.close_form();
    result?;

    println!("Saved task {}.", short(id));
    let applied = session.sync();
    debug!(applied, "applied snapshots after edit");
    if let Some(task) = session.tasks().into_iter().find(|t| t.id == id) {
        renderer.print_task_info(&task)?;
    }
    Ok(())
}

fn stage(
    session: &mut Session,
    fill: impl FnOnce(&mut crate::form::TaskForm) -> Result<(), FormError>,
) -> Result<(), FormError> {
    fill(session.form_mut())
}

async fn cmd_toggle(session: &Session, reference: &str) -> anyhow::Result<()> {
    let id = session.resolve(reference)?;
    let done = session.toggle_done(id).await?;
    println!(
        "Task {} marked {}.",
        short(id),
        if done { "done" } else { "not done" }
    );
    Ok(())
}

async fn cmd_delete(session: &Session, reference: &str) -> anyhow::Result<()> {
    let id = session.resolve(reference)?;
    match session.delete(id).await? {
        DeleteOutcome::Deleted => println!("Deleted task {}.", short(id)),
        DeleteOutcome::Declined => println!("Task {} kept.", short(id)),
    }
    Ok(())
}

async fn cmd_bulk_delete(session: &Session, args: BulkDeleteArgs) -> anyhow::Result<()> {
    if args.all {
        session.set_select_all(true);
    } else {
        let mut ids: Vec<Uuid> = Vec::with_capacity(args.tasks.len());
        for reference in &args.tasks {
            let id = session.resolve(reference)?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        for id in ids {
            session.toggle_selected(id);
        }
    }

    match session.bulk_delete().await {
        BulkDeleteOutcome::NothingSelected => println!("Nothing selected."),
        BulkDeleteOutcome::Declined => println!("No tasks deleted."),
        outcome @ BulkDeleteOutcome::Finished(_) => {
            let deleted = outcome.deleted();
            if let BulkDeleteOutcome::Finished(results) = &outcome {
                for (id, result) in results {
                    if let Err(err) = result {
                        eprintln!("failed to delete {}: {err}", short(*id));
                    }
                }
                println!("Deleted {deleted} of {} task(s).", results.len());
            }
        }
    }
    Ok(())
}

async fn cmd_tick(session: &Session, cfg: &Config) -> anyhow::Result<()> {
    let permission = session.request_notification_permission();
    debug!(permission = permission.as_label(), "notification permission");
    let poller = session.poller(cfg.poller_settings()?);
    let report = poller.tick(Utc::now()).await;
    print_tick(&report);
    if report.failed() > 0 {
        return Err(anyhow!("{} poller write(s) failed", report.failed()));
    }
    Ok(())
}

#[instrument(skip_all)]
async fn cmd_watch(session: &mut Session, store: &FileStore, cfg: &Config) -> anyhow::Result<()> {
    let settings = cfg.poller_settings()?;
    let permission = session.request_notification_permission();
    info!(
        permission = permission.as_label(),
        interval_secs = settings.interval.as_secs(),
        window = ?settings.window,
        "watching tasks"
    );
    eprintln!(
        "Watching {} every {}s ({}). Ctrl-C to stop.",
        store.tasks_path.display(),
        settings.interval.as_secs(),
        permission.as_label()
    );

    let poller = session.poller(settings);
    let mut interval = tokio::time::interval(poller.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("failed to listen for ctrl-c")?;
                info!("interrupted; stopping watch");
                break;
            }
            snapshot = session.next_snapshot() => {
                match snapshot {
                    Some(snapshot) => session.apply(snapshot),
                    None => {
                        warn!("snapshot feed closed");
                        break;
                    }
                }
            }
            _ = interval.tick() => {
                if let Err(err) = store.reload() {
                    warn!(error = %err, "failed to reload tasks file");
                }
                session.sync();
                let report = poller.tick(Utc::now()).await;
                if !report.outcomes.is_empty() {
                    print_tick(&report);
                }
            }
        }
    }

    Ok(())
}

fn print_tick(report: &TickReport) {
    println!(
        "{} update(s), {} notification(s) shown, {} failed write(s).",
        report.outcomes.len(),
        report.shown(),
        report.failed()
    );
}

fn cmd_categories() -> anyhow::Result<()> {
    for category in Category::ALL {
        println!("{category}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key} = {value}");
    }
    for file in &cfg.loaded_files {
        println!("# loaded {}", file.display());
    }
    Ok(())
}

fn short(id: Uuid) -> String {
    let mut s = id.simple().to_string();
    s.truncate(8);
    s
}
