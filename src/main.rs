mod api;
mod cli;
mod config;
mod db;
mod entities;
mod error;
mod filter;
mod model;
mod notify;
mod orchestrator;
mod progress;
mod store;
mod sync;
mod util;

use std::io::BufRead;

use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::api::{Backend, HttpApi, LocalApi};
use crate::cli::{
    AuthCommand, Cli, Command, GoalAdd, GoalCommand, GoalFilterArgs, GoalList, GoalSearch,
    GoalStatusArg, GoalUpdate, PriorityArg, RoadmapAdd, RoadmapCommand, RoadmapUpdate, StepAdd,
    StepCommand, StepReorder, StepUpdate,
};
use crate::config::{Config, TokenPair, TokenStore};
use crate::db::DbLock;
use crate::error::AppError;
use crate::filter::{Debouncer, DEFAULT_QUIET_PERIOD};
use crate::model::{
    GoalChanges, GoalFilters, GoalInput, GoalPriority, GoalStatus, RoadmapChanges, RoadmapInput,
    StepChanges, StepInput, StepOrder,
};
use crate::notify::ConsoleNotifier;
use crate::orchestrator::Orchestrator;
use crate::sync::SyncOutcome;
use crate::util::{format_goal_detail, format_goal_list, format_roadmap_detail, format_stats};

const LOG_ENV: &str = "GOALFORGE_LOG";

type App = Orchestrator<Backend, ConsoleNotifier>;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        if let Some(details) = err.details() {
            tracing::debug!(%details, "request error details");
        }
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<(), AppError> {
    let Cli {
        home,
        remote,
        timeout_ms,
        quiet,
        command,
    } = Cli::parse();
    let config = Config::resolve(home, remote, timeout_ms)?;
    tracing::debug!(home = %config.home.display(), remote = ?config.remote, "resolved config");

    if let Command::Auth(command) = command {
        return handle_auth(&config, command);
    }

    let notifier = ConsoleNotifier { quiet };
    match &config.remote {
        Some(url) => {
            let tokens = TokenStore::new(config.token_path()).load()?;
            if tokens.is_none() {
                tracing::warn!("no token stored; requests are sent unauthenticated");
            }
            let api = HttpApi::new(url, config.timeout, tokens.as_ref());
            let mut app = Orchestrator::new(Backend::Remote(api), notifier);
            dispatch(&mut app, command).await
        }
        None => {
            let db_path = db::resolve_db_path(&config.home);
            db::ensure_parent_dir(&db_path)?;
            let mut lock = db::open_lock(&db_path)?;
            let db = {
                let _guard = lock.write()?;
                let db = db::connect(&db_path).await?;
                db::ensure_schema(&db).await?;
                db
            };
            let mut app = Orchestrator::new(Backend::Local(LocalApi::new(db)), notifier);
            match command {
                // Interactive; the lock is taken per search so other commands can run.
                Command::Goal(GoalCommand::Search(args)) if args.follow => {
                    follow_search(&mut app, args, Some(&mut lock)).await
                }
                command => {
                    let _guard = lock.write()?;
                    dispatch(&mut app, command).await
                }
            }
        }
    }
}

async fn dispatch(app: &mut App, command: Command) -> Result<(), AppError> {
    match command {
        Command::Goal(command) => handle_goal(app, command).await,
        Command::Roadmap(command) => handle_roadmap(app, command).await,
        Command::Step(command) => handle_step(app, command).await,
        Command::Auth(_) => Err(AppError::InvalidInput(
            "auth commands do not use a backend".to_string(),
        )),
    }
}

async fn handle_goal(app: &mut App, command: GoalCommand) -> Result<(), AppError> {
    match command {
        GoalCommand::Add(args) => handle_goal_add(app, args).await,
        GoalCommand::List(args) => handle_goal_list(app, args).await,
        GoalCommand::Search(args) => handle_goal_search(app, args).await,
        GoalCommand::Show(args) => handle_goal_show(app, args.id).await,
        GoalCommand::Update(args) => handle_goal_update(app, args).await,
        GoalCommand::Status(args) => {
            let goal = app
                .update_goal_status(args.id, goal_status_from_arg(args.status))
                .await?;
            println!(
                "Goal ID: {} status set to {}.",
                goal.id,
                goal.status.as_str()
            );
            Ok(())
        }
        GoalCommand::Remove(args) => {
            app.delete_goal(args.id).await?;
            println!("Goal ID: {} removed.", args.id);
            Ok(())
        }
        GoalCommand::Stats => {
            let stats = app.goal_stats().await?;
            println!("{}", format_stats(&stats));
            Ok(())
        }
    }
}

async fn handle_roadmap(app: &mut App, command: RoadmapCommand) -> Result<(), AppError> {
    match command {
        RoadmapCommand::Add(args) => handle_roadmap_add(app, args).await,
        RoadmapCommand::Show(args) => {
            let roadmap = app.roadmap_for_goal(args.goal_id).await?;
            println!("{}", format_roadmap_detail(&roadmap));
            Ok(())
        }
        RoadmapCommand::Update(args) => handle_roadmap_update(app, args).await,
        RoadmapCommand::Remove(args) => {
            app.delete_roadmap(args.id).await?;
            println!("Roadmap ID: {} removed.", args.id);
            Ok(())
        }
    }
}

async fn handle_step(app: &mut App, command: StepCommand) -> Result<(), AppError> {
    match command {
        StepCommand::Add(args) => handle_step_add(app, args).await,
        StepCommand::Update(args) => handle_step_update(app, args).await,
        StepCommand::Toggle(args) => {
            let (step, outcome) = app.toggle_step(args.id).await?;
            let state = if step.is_completed { "done" } else { "not done" };
            println!("Step ID: {} marked {}.", step.id, state);
            print_sync_outcome(&outcome);
            Ok(())
        }
        StepCommand::Reorder(args) => handle_step_reorder(app, args).await,
        StepCommand::Remove(args) => {
            let outcome = app.delete_step(args.id).await?;
            println!("Step ID: {} removed.", args.id);
            print_sync_outcome(&outcome);
            Ok(())
        }
    }
}

fn handle_auth(config: &Config, command: AuthCommand) -> Result<(), AppError> {
    let store = TokenStore::new(config.token_path());
    match command {
        AuthCommand::SetToken(args) => {
            require_non_empty("token", &args.token)?;
            store.save(&TokenPair::bearer(args.token.trim()))?;
            println!("Token saved to {}.", store.path().display());
        }
        AuthCommand::Clear => {
            if store.clear()? {
                println!("Token cleared.");
            } else {
                println!("No token stored.");
            }
        }
    }
    Ok(())
}

async fn handle_goal_add(app: &mut App, args: GoalAdd) -> Result<(), AppError> {
    let input = GoalInput {
        title: args.title,
        description: args.description,
        category: args.category,
        priority: args
            .priority
            .map(priority_from_arg)
            .unwrap_or_default(),
        status: args
            .status
            .map(goal_status_from_arg)
            .unwrap_or_default(),
        deadline: args.deadline,
    };
    let goal = app.create_goal(&input).await?;
    println!("Created goal ID: {}: {}", goal.id, goal.title);
    Ok(())
}

async fn handle_goal_list(app: &mut App, args: GoalList) -> Result<(), AppError> {
    let mut filters = filters_from_args(&args.filters);
    filters.search = args.search;
    let page = app.list_goals(&filters).await?;
    if page.data.is_empty() {
        println!("No goals found.");
        return Ok(());
    }
    println!("{}", format_goal_list(&page.data));
    println!(
        "Page {} ({} of {} goals)",
        page.page,
        page.data.len(),
        page.total
    );
    Ok(())
}

async fn handle_goal_search(app: &mut App, args: GoalSearch) -> Result<(), AppError> {
    if args.follow {
        return follow_search(app, args, None).await;
    }
    let base = filters_from_args(&args.filters);
    let term = args.term.unwrap_or_default();
    require_non_empty("search term", &term)?;
    search_goals(app, &base, term).await
}

/// Runs one search per settled stdin line until stdin closes or ctrl-c.
async fn follow_search(
    app: &mut App,
    args: GoalSearch,
    mut lock: Option<&mut DbLock>,
) -> Result<(), AppError> {
    let base = filters_from_args(&args.filters);
    let (tx, rx) = mpsc::channel(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let liveness = app.liveness();
    let mut terms = Debouncer::new(rx, DEFAULT_QUIET_PERIOD);
    loop {
        let term = tokio::select! {
            term = terms.next() => term,
            _ = tokio::signal::ctrl_c() => {
                liveness.detach();
                None
            }
        };
        let Some(term) = term else { break };
        if term.trim().is_empty() {
            continue;
        }
        let result = {
            let _guard = match lock.as_deref_mut() {
                Some(lock) => Some(lock.write()?),
                None => None,
            };
            search_goals(app, &base, term).await
        };
        if let Err(err) = result {
            eprintln!("Error: {err}");
        }
    }
    Ok(())
}

async fn search_goals(app: &mut App, base: &GoalFilters, term: String) -> Result<(), AppError> {
    let filters = GoalFilters {
        search: Some(term.trim().to_string()),
        ..base.clone()
    };
    app.list_goals(&filters).await?;
    let visible = app.visible_goals(&GoalFilters {
        page: None,
        page_size: None,
        ..filters.clone()
    });
    println!("Search: {}", term.trim());
    if visible.is_empty() {
        println!("No goals found.");
    } else {
        println!("{}", format_goal_list(&visible));
    }
    Ok(())
}

async fn handle_goal_show(app: &mut App, id: i64) -> Result<(), AppError> {
    let goal = app.get_goal(id).await?;
    let roadmap = app.refresh_roadmap(id).await?;
    println!("{}", format_goal_detail(&goal, roadmap.as_ref()));
    Ok(())
}

async fn handle_goal_update(app: &mut App, args: GoalUpdate) -> Result<(), AppError> {
    let changes = GoalChanges {
        title: args.title,
        description: cleared_or(args.clear_description, args.description),
        category: args.category,
        priority: args.priority.map(priority_from_arg),
        status: args.status.map(goal_status_from_arg),
        deadline: cleared_or(args.clear_deadline, args.deadline),
    };
    let goal = app.update_goal(args.id, &changes).await?;
    println!("Updated goal {}.", goal.id);
    Ok(())
}

async fn handle_roadmap_add(app: &mut App, args: RoadmapAdd) -> Result<(), AppError> {
    let input = RoadmapInput {
        title: args.title,
        description: args.description,
        steps: args
            .steps
            .into_iter()
            .map(|title| StepInput {
                title,
                description: None,
                is_completed: false,
                order_index: None,
            })
            .collect(),
    };
    let (roadmap, outcome) = app.create_roadmap(args.goal_id, &input).await?;
    println!(
        "Created roadmap ID: {} for goal ID: {} with {} steps",
        roadmap.id,
        roadmap.goal_id,
        roadmap.steps.len()
    );
    print_sync_outcome(&outcome);
    Ok(())
}

async fn handle_roadmap_update(app: &mut App, args: RoadmapUpdate) -> Result<(), AppError> {
    let changes = RoadmapChanges {
        title: args.title,
        description: args.description,
    };
    let roadmap = app.update_roadmap(args.id, &changes).await?;
    println!("Updated roadmap {}.", roadmap.id);
    Ok(())
}

async fn handle_step_add(app: &mut App, args: StepAdd) -> Result<(), AppError> {
    let input = StepInput {
        title: args.title,
        description: args.description,
        is_completed: args.done,
        order_index: args.order,
    };
    let (step, outcome) = app.create_step(args.roadmap_id, &input).await?;
    println!(
        "Created step ID: {} in roadmap ID: {}",
        step.id, step.roadmap_id
    );
    print_sync_outcome(&outcome);
    Ok(())
}

async fn handle_step_update(app: &mut App, args: StepUpdate) -> Result<(), AppError> {
    let changes = StepChanges {
        title: args.title,
        description: args.description,
        is_completed: args.completed,
        order_index: args.order,
    };
    let (step, outcome) = app.update_step(args.id, &changes).await?;
    println!("Updated step {}.", step.id);
    print_sync_outcome(&outcome);
    Ok(())
}

async fn handle_step_reorder(app: &mut App, args: StepReorder) -> Result<(), AppError> {
    let orders = parse_step_orders(&args.orders)?;
    app.reorder_steps(args.roadmap_id, &orders).await?;
    println!(
        "Reordered {} steps in roadmap ID: {}.",
        orders.len(),
        args.roadmap_id
    );
    Ok(())
}

fn parse_step_orders(values: &[String]) -> Result<Vec<StepOrder>, AppError> {
    values
        .iter()
        .map(|value| {
            let (id, index) = value.split_once(':').ok_or_else(|| {
                AppError::InvalidInput(format!("expected STEP_ID:INDEX, got '{value}'"))
            })?;
            let id = id.trim().parse::<i64>().map_err(|_| {
                AppError::InvalidInput(format!("invalid step id in '{value}'"))
            })?;
            let order_index = index.trim().parse::<i32>().map_err(|_| {
                AppError::InvalidInput(format!("invalid order index in '{value}'"))
            })?;
            Ok(StepOrder { id, order_index })
        })
        .collect()
}

/// `Some(None)` when the field is being cleared.
fn cleared_or<T>(clear: bool, value: Option<T>) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn filters_from_args(args: &GoalFilterArgs) -> GoalFilters {
    GoalFilters {
        status: args.status.map(goal_status_from_arg),
        priority: args.priority.map(priority_from_arg),
        category: args.category.clone(),
        search: None,
        page: args.page,
        page_size: args.page_size,
    }
}

fn goal_status_from_arg(arg: GoalStatusArg) -> GoalStatus {
    match arg {
        GoalStatusArg::InProgress => GoalStatus::InProgress,
        GoalStatusArg::OnTrack => GoalStatus::OnTrack,
        GoalStatusArg::Completed => GoalStatus::Completed,
        GoalStatusArg::Overdue => GoalStatus::Overdue,
        GoalStatusArg::Paused => GoalStatus::Paused,
    }
}

fn priority_from_arg(arg: PriorityArg) -> GoalPriority {
    match arg {
        PriorityArg::Low => GoalPriority::Low,
        PriorityArg::Medium => GoalPriority::Medium,
        PriorityArg::High => GoalPriority::High,
    }
}

fn require_non_empty(label: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{label} cannot be empty")));
    }
    Ok(())
}

fn print_sync_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Updated { from, to } => println!(
            "Goal status auto-updated from {} to {}.",
            from.as_str(),
            to.as_str()
        ),
        SyncOutcome::Failed(message) => eprintln!("Warning: goal status not synced: {message}"),
        SyncOutcome::Skipped | SyncOutcome::Unchanged => {}
    }
}
