// Binds the use-case surface to the CLI. Everything algorithmic lives
// in the planner and llm crates; this module is wiring, prompting and
// rendering only.

use std::io::{BufRead, Write as _};

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use kairos_llm::client::HttpGenerator;
use kairos_llm::intent::{AskResolution, IntentArgs, ParsedIntent};
use kairos_llm::{explain, help};
use kairos_planner::recommend::RecommendRequest;
use kairos_planner::{recommend, replan, status};
use kairos_store::repo::{dependencies, items, nodes, profile, projects, sessions};
use kairos_store::{db, Store};
use kairos_types::{
    Dependency, DurationMode, NodeKind, PlanNode, PlanningMode, Project, ProjectStatus,
    SessionPolicy, UnitTracking, WorkItem, WorkItemStatus, WorkSessionLog,
};

use crate::config::AppConfig;
use crate::render;
use crate::{Command, ProjectCommand};

pub struct App {
    pub store: Store,
    pub generator: HttpGenerator,
    pub config: AppConfig,
}

pub async fn run(command: Command, config: AppConfig) -> anyhow::Result<()> {
    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;
    let generator = HttpGenerator::new(config.llm.clone());
    let app = App {
        store,
        generator,
        config,
    };

    match command {
        Command::Shell => shell_loop(&app).await,
        other => run_single(other, &app).await,
    }
}

async fn run_single(command: Command, app: &App) -> anyhow::Result<()> {
    let today = Local::now().date_naive();
    let use_case = use_case_name(&command);
    let result = dispatch(command, app, today).await;
    if app.config.log_usecases {
        kairos_observability::emit_use_case(kairos_observability::UseCaseEvent {
            use_case,
            outcome: if result.is_ok() { "ok" } else { "error" },
            detail: None,
        });
    }
    result
}

fn use_case_name(command: &Command) -> &'static str {
    match command {
        Command::Recommend { .. } => "recommend",
        Command::Status { .. } => "status",
        Command::Replan { .. } => "replan",
        Command::Log { .. } => "log_session",
        Command::Project(_) => "project",
        Command::Ask { .. } => "ask",
        Command::Shell => "shell",
    }
}

async fn dispatch(command: Command, app: &App, today: NaiveDate) -> anyhow::Result<()> {
    match command {
        Command::Recommend {
            minutes,
            mode,
            project,
            max_slices,
            no_variation,
        } => {
            let mode = match mode.as_deref() {
                Some(raw) => PlanningMode::parse(raw)
                    .with_context(|| format!("unknown mode `{raw}`; use balanced or critical"))?,
                None => PlanningMode::Balanced,
            };
            let request = RecommendRequest {
                now: today,
                available_min: minutes,
                mode,
                project_scope: project,
                enforce_variation: !no_variation,
                max_slices,
            };
            let response = recommend::recommend(&app.store, &request).await?;
            println!("{}", render::what_now(&response));
            if app.config.llm.enabled {
                let cancel = CancellationToken::new();
                let narrative = explain::explain(&app.generator, &response, None, &cancel).await;
                println!("{}", render::explanation(&narrative));
            }
        }
        Command::Status { project } => {
            let response = status::status(&app.store, project.as_deref(), today).await?;
            println!("{}", render::status(&response));
            let scope = project.clone();
            let since = today - chrono::Duration::days(27);
            let mix = app
                .store
                .read(move |conn| {
                    kairos_store::queries::session_minutes_by_type(conn, since, scope.as_deref())
                })
                .await?;
            if !mix.is_empty() {
                println!("{}", render::type_mix(&mix));
            }
        }
        Command::Replan { project } => {
            let response = replan::run(&app.store, project.as_deref(), today, Utc::now()).await?;
            println!("{}", render::replan(&response));
        }
        Command::Log {
            item,
            minutes,
            units,
            note,
            date,
        } => {
            let started_date = match date {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("`{raw}` is not a YYYY-MM-DD date"))?,
                None => today,
            };
            let started_at = started_date
                .and_hms_opt(12, 0, 0)
                .map(|dt| dt.and_utc())
                .unwrap_or_else(Utc::now);
            let entry = WorkSessionLog {
                id: Uuid::new_v4().to_string(),
                work_item_id: item,
                started_at,
                minutes,
                units_done_delta: units.unwrap_or(0),
                note,
                created_at: Utc::now(),
            };
            app.store
                .with_unit_of_work(move |conn| sessions::log(conn, &entry))
                .await?;
            println!("logged {minutes} min");
        }
        Command::Project(project_command) => run_project(project_command, app, today).await?,
        Command::Ask { text } => run_ask(&text, app, today).await?,
        Command::Shell => {
            println!("already interactive; `exit` leaves the shell");
        }
    }
    Ok(())
}

async fn run_project(
    command: ProjectCommand,
    app: &App,
    today: NaiveDate,
) -> anyhow::Result<()> {
    match command {
        ProjectCommand::Add {
            name,
            domain,
            short_id,
            start,
            target,
        } => {
            let start_date = match start {
                Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .with_context(|| format!("`{raw}` is not a YYYY-MM-DD date"))?,
                None => today,
            };
            let target_date = match target {
                Some(raw) => Some(
                    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                        .with_context(|| format!("`{raw}` is not a YYYY-MM-DD date"))?,
                ),
                None => None,
            };
            let project = Project {
                id: Uuid::new_v4().to_string(),
                short_id: short_id.unwrap_or_default(),
                name,
                domain: domain.unwrap_or_default(),
                start_date,
                target_date,
                status: ProjectStatus::Active,
                archived_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            let shown = project.clone();
            app.store
                .with_unit_of_work(move |conn| {
                    projects::insert(conn, &project)?;
                    // every project starts with a default node for loose items
                    let seq = db::next_seq(conn, &project.id)?;
                    nodes::insert(
                        conn,
                        &PlanNode {
                            id: Uuid::new_v4().to_string(),
                            project_id: project.id.clone(),
                            parent_id: None,
                            title: "General".to_string(),
                            kind: NodeKind::Generic,
                            order_index: 0,
                            due_date: None,
                            not_before: None,
                            not_after: None,
                            planned_min_budget: None,
                            seq,
                            is_default: true,
                            created_at: Utc::now(),
                            updated_at: Utc::now(),
                        },
                    )
                })
                .await?;
            println!("created project {} ({})", shown.name, shown.id);
        }
        ProjectCommand::List { all } => {
            let listed = app
                .store
                .read(move |conn| projects::list(conn, all))
                .await?;
            println!("{}", render::projects(&listed));
        }
        ProjectCommand::Archive { project } => {
            let key = project.clone();
            app.store
                .with_unit_of_work(move |conn| {
                    let found = projects::resolve(conn, &key)?;
                    projects::archive(conn, &found.id)
                })
                .await?;
            println!("archived {project}");
        }
        ProjectCommand::Remove { project } => {
            let key = project.clone();
            app.store
                .with_unit_of_work(move |conn| {
                    let found = projects::resolve(conn, &key)?;
                    projects::remove(conn, &found.id)
                })
                .await?;
            println!("removed {project}");
        }
    }
    Ok(())
}

async fn run_ask(text: &str, app: &App, today: NaiveDate) -> anyhow::Result<()> {
    if !app.config.llm.enabled {
        bail!("free-text commands need the LLM; set KAIROS_LLM_ENABLED=1 or use the direct subcommands");
    }
    let cancel = CancellationToken::new();
    let resolution = kairos_llm::intent::parse(
        &app.generator,
        app.config.llm.auto_execute_read_threshold,
        text,
        &cancel,
    )
    .await
    .context("could not parse the request; try rephrasing or use a direct subcommand")?;

    match resolution {
        AskResolution::Executed(parsed) => execute_read(&parsed, app, today).await,
        AskResolution::NeedsConfirmation(parsed) => {
            println!("{}", render::intent_summary(&parsed));
            if confirm("apply this change? [y/N] ")? {
                execute_write(&parsed, app, today).await
            } else {
                println!("aborted; nothing changed");
                Ok(())
            }
        }
        AskResolution::NeedsClarification(parsed) => {
            println!("not sure what you meant (confidence {:.2})", parsed.confidence);
            for option in &parsed.clarification_options {
                println!("  - {option}");
            }
            Ok(())
        }
        AskResolution::Rejected(err) => {
            println!("could not run that: {}", err.message);
            for option in &err.clarification_options {
                println!("  - {option}");
            }
            Ok(())
        }
    }
}

async fn execute_read(parsed: &ParsedIntent, app: &App, today: NaiveDate) -> anyhow::Result<()> {
    match &parsed.args {
        IntentArgs::WhatNow {
            available_min,
            mode,
            project_id,
        } => {
            let request = RecommendRequest {
                now: today,
                available_min: *available_min,
                mode: mode.unwrap_or_default(),
                project_scope: project_id.clone(),
                enforce_variation: true,
                max_slices: None,
            };
            let response = recommend::recommend(&app.store, &request).await?;
            println!("{}", render::what_now(&response));
            let cancel = CancellationToken::new();
            let narrative = explain::explain(&app.generator, &response, None, &cancel).await;
            println!("{}", render::explanation(&narrative));
        }
        IntentArgs::Status { project_id } => {
            let response = status::status(&app.store, project_id.as_deref(), today).await?;
            println!("{}", render::status(&response));
        }
        IntentArgs::Help { topic } => {
            let question = topic.clone().unwrap_or_else(|| "what can I do?".to_string());
            let cancel = CancellationToken::new();
            let answer = help::answer(&app.generator, &question, &cancel).await;
            println!("{}", render::help(&answer));
        }
        IntentArgs::Explain { work_item_id } => {
            // explain the plan the user would get right now, narrowed
            // to the named item when one was given
            let request = RecommendRequest::new(today, 60);
            let response = recommend::recommend(&app.store, &request).await?;
            let cancel = CancellationToken::new();
            let narrative = explain::explain(
                &app.generator,
                &response,
                work_item_id.as_deref(),
                &cancel,
            )
            .await;
            println!("{}", render::explanation(&narrative));
        }
        other => bail!("intent resolved as read but carries write arguments: {other:?}"),
    }
    Ok(())
}

async fn execute_write(parsed: &ParsedIntent, app: &App, today: NaiveDate) -> anyhow::Result<()> {
    match parsed.args.clone() {
        IntentArgs::Replan { project_id } => {
            let response =
                replan::run(&app.store, project_id.as_deref(), today, Utc::now()).await?;
            println!("{}", render::replan(&response));
        }
        IntentArgs::SessionLog {
            work_item_id,
            minutes,
            units_done,
            note,
        } => {
            let entry = WorkSessionLog {
                id: Uuid::new_v4().to_string(),
                work_item_id,
                started_at: Utc::now(),
                minutes,
                units_done_delta: units_done.unwrap_or(0),
                note,
                created_at: Utc::now(),
            };
            app.store
                .with_unit_of_work(move |conn| sessions::log(conn, &entry))
                .await?;
            println!("logged {minutes} min");
        }
        IntentArgs::ProjectAdd {
            name,
            domain,
            target_date,
        } => {
            run_project(
                ProjectCommand::Add {
                    name,
                    domain,
                    short_id: None,
                    start: None,
                    target: target_date.map(|d| d.format("%Y-%m-%d").to_string()),
                },
                app,
                today,
            )
            .await?;
        }
        IntentArgs::ProjectArchive { project_id } => {
            run_project(ProjectCommand::Archive { project: project_id }, app, today).await?;
        }
        IntentArgs::ProjectRemove { project_id } => {
            run_project(ProjectCommand::Remove { project: project_id }, app, today).await?;
        }
        IntentArgs::NodeAdd {
            project_id,
            title,
            kind,
        } => {
            let kind = kind
                .as_deref()
                .and_then(NodeKind::parse)
                .unwrap_or(NodeKind::Generic);
            app.store
                .with_unit_of_work(move |conn| {
                    let project = projects::resolve(conn, &project_id)?;
                    let seq = db::next_seq(conn, &project.id)?;
                    nodes::insert(
                        conn,
                        &PlanNode {
                            id: Uuid::new_v4().to_string(),
                            project_id: project.id,
                            parent_id: None,
                            title,
                            kind,
                            order_index: seq,
                            due_date: None,
                            not_before: None,
                            not_after: None,
                            planned_min_budget: None,
                            seq,
                            is_default: false,
                            created_at: Utc::now(),
                            updated_at: Utc::now(),
                        },
                    )
                })
                .await?;
            println!("node added");
        }
        IntentArgs::NodeRemove { node_id } => {
            app.store
                .with_unit_of_work(move |conn| nodes::remove(conn, &node_id))
                .await?;
            println!("node removed");
        }
        IntentArgs::ItemAdd {
            node_id,
            title,
            planned_min,
        } => {
            app.store
                .with_unit_of_work(move |conn| {
                    let node = nodes::get(conn, &node_id)?;
                    let seq = db::next_seq(conn, &node.project_id)?;
                    items::insert(
                        conn,
                        &WorkItem {
                            id: Uuid::new_v4().to_string(),
                            node_id,
                            seq,
                            title,
                            description: String::new(),
                            item_type: "task".to_string(),
                            status: WorkItemStatus::Todo,
                            archived_at: None,
                            completed_at: None,
                            duration_mode: DurationMode::Estimate,
                            planned_min: planned_min.unwrap_or(0),
                            logged_min: 0,
                            duration_source: "manual".to_string(),
                            estimate_confidence: 0.5,
                            session: SessionPolicy::default(),
                            splittable: true,
                            units: UnitTracking::default(),
                            due_date: None,
                            not_before: None,
                            created_at: Utc::now(),
                            updated_at: Utc::now(),
                        },
                    )
                })
                .await?;
            println!("item added");
        }
        IntentArgs::ItemUpdate {
            work_item_id,
            status,
            planned_min,
        } => {
            let new_status = match status.as_deref() {
                Some(raw) => Some(
                    WorkItemStatus::parse(raw)
                        .with_context(|| format!("unknown status `{raw}`"))?,
                ),
                None => None,
            };
            app.store
                .with_unit_of_work(move |conn| {
                    let mut item = items::get(conn, &work_item_id)?;
                    if let Some(planned) = planned_min {
                        item.planned_min = planned;
                        item.duration_source = "manual".to_string();
                    }
                    item.updated_at = Utc::now();
                    items::update(conn, &item)?;
                    if let Some(status) = new_status {
                        items::set_status(conn, &work_item_id, status, Utc::now())?;
                    }
                    Ok(())
                })
                .await?;
            println!("item updated");
        }
        IntentArgs::ItemRemove { work_item_id } => {
            app.store
                .with_unit_of_work(move |conn| items::remove(conn, &work_item_id))
                .await?;
            println!("item removed");
        }
        IntentArgs::DependencyAdd {
            predecessor_id,
            successor_id,
        } => {
            app.store
                .with_unit_of_work(move |conn| {
                    dependencies::insert(
                        conn,
                        &Dependency {
                            predecessor_id,
                            successor_id,
                        },
                    )
                })
                .await?;
            println!("dependency added");
        }
        IntentArgs::DependencyRemove {
            predecessor_id,
            successor_id,
        } => {
            app.store
                .with_unit_of_work(move |conn| {
                    dependencies::remove(
                        conn,
                        &Dependency {
                            predecessor_id,
                            successor_id,
                        },
                    )
                })
                .await?;
            println!("dependency removed");
        }
        IntentArgs::ProfileUpdate {
            buffer_pct,
            default_max_slices,
            baseline_daily_min,
        } => {
            app.store
                .with_unit_of_work(move |conn| {
                    let mut current = profile::get(conn)?;
                    if let Some(buffer) = buffer_pct {
                        current.buffer_pct = buffer;
                    }
                    if let Some(max_slices) = default_max_slices {
                        current.default_max_slices = max_slices;
                    }
                    if let Some(baseline) = baseline_daily_min {
                        current.baseline_daily_min = baseline;
                    }
                    profile::update(conn, &current)
                })
                .await?;
            println!("profile updated");
        }
        read_only => bail!("intent resolved as write but carries read arguments: {read_only:?}"),
    }
    Ok(())
}

/// Interactive loop. Per-command failures print and continue; only EOF
/// or an explicit exit leaves.
async fn shell_loop(app: &App) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("kairos> ");
        std::io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if matches!(trimmed, "exit" | "quit") {
            break;
        }

        let words = std::iter::once("kairos").chain(trimmed.split_whitespace());
        match <crate::Cli as clap::Parser>::try_parse_from(words) {
            Ok(cli) => {
                if let Err(err) = Box::pin(run_single(cli.command, app)).await {
                    warn!(error = %err, "shell command failed");
                    eprintln!("error: {err:#}");
                }
            }
            Err(err) => {
                // clap's own help/usage output
                eprintln!("{err}");
            }
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
