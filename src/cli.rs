use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "goalforge",
    version,
    about = "Track goals, roadmaps and steps"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "GOALFORGE_HOME",
        value_name = "PATH",
        help = "Data directory (default: $HOME/.goalforge)"
    )]
    pub home: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        env = "GOALFORGE_API_URL",
        value_name = "URL",
        help = "Use a remote goal tracker instead of the local database"
    )]
    pub remote: Option<String>,
    #[arg(
        long,
        global = true,
        env = "GOALFORGE_TIMEOUT_MS",
        value_name = "MS",
        help = "Remote request timeout in milliseconds"
    )]
    pub timeout_ms: Option<u64>,
    #[arg(long, short, global = true, help = "Only print requested data")]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    Goal(GoalCommand),
    #[command(subcommand)]
    Roadmap(RoadmapCommand),
    #[command(subcommand)]
    Step(StepCommand),
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[derive(Subcommand, Debug)]
pub enum GoalCommand {
    Add(GoalAdd),
    List(GoalList),
    Search(GoalSearch),
    Show(GoalShow),
    Update(GoalUpdate),
    Status(GoalStatusSet),
    Remove(GoalRemove),
    Stats,
}

#[derive(Subcommand, Debug)]
pub enum RoadmapCommand {
    Add(RoadmapAdd),
    Show(RoadmapShow),
    Update(RoadmapUpdate),
    Remove(RoadmapRemove),
}

#[derive(Subcommand, Debug)]
pub enum StepCommand {
    Add(StepAdd),
    Update(StepUpdate),
    Toggle(StepToggle),
    Reorder(StepReorder),
    Remove(StepRemove),
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    #[command(name = "set-token")]
    SetToken(AuthSetToken),
    Clear,
}

#[derive(Args, Debug)]
pub struct GoalAdd {
    pub title: String,
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, value_enum)]
    pub priority: Option<PriorityArg>,
    #[arg(long, value_enum)]
    pub status: Option<GoalStatusArg>,
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub deadline: Option<NaiveDate>,
}

#[derive(Args, Debug, Clone)]
pub struct GoalFilterArgs {
    #[arg(long, value_enum)]
    pub status: Option<GoalStatusArg>,
    #[arg(long, value_enum)]
    pub priority: Option<PriorityArg>,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub page: Option<u64>,
    #[arg(long)]
    pub page_size: Option<u64>,
}

#[derive(Args, Debug)]
pub struct GoalList {
    #[command(flatten)]
    pub filters: GoalFilterArgs,
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Args, Debug)]
pub struct GoalSearch {
    #[arg(value_name = "TERM", required_unless_present = "follow")]
    pub term: Option<String>,
    #[arg(long, help = "Read search terms from stdin, one per line")]
    pub follow: bool,
    #[command(flatten)]
    pub filters: GoalFilterArgs,
}

#[derive(Args, Debug)]
pub struct GoalShow {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct GoalUpdate {
    pub id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,
    #[arg(long)]
    pub clear_description: bool,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long, value_enum)]
    pub priority: Option<PriorityArg>,
    #[arg(long, value_enum)]
    pub status: Option<GoalStatusArg>,
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with = "clear_deadline")]
    pub deadline: Option<NaiveDate>,
    #[arg(long)]
    pub clear_deadline: bool,
}

#[derive(Args, Debug)]
pub struct GoalStatusSet {
    pub id: i64,
    #[arg(value_enum)]
    pub status: GoalStatusArg,
}

#[derive(Args, Debug)]
pub struct GoalRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct RoadmapAdd {
    pub goal_id: i64,
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long = "step", value_name = "TITLE", help = "Initial step; repeat for more")]
    pub steps: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RoadmapShow {
    pub goal_id: i64,
}

#[derive(Args, Debug)]
pub struct RoadmapUpdate {
    pub id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct RoadmapRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct StepAdd {
    pub roadmap_id: i64,
    pub title: String,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub done: bool,
    #[arg(long, value_name = "INDEX")]
    pub order: Option<i32>,
}

#[derive(Args, Debug)]
pub struct StepUpdate {
    pub id: i64,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long, value_name = "BOOL")]
    pub completed: Option<bool>,
    #[arg(long, value_name = "INDEX")]
    pub order: Option<i32>,
}

#[derive(Args, Debug)]
pub struct StepToggle {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct StepReorder {
    pub roadmap_id: i64,
    #[arg(value_name = "STEP_ID:INDEX", num_args = 1..)]
    pub orders: Vec<String>,
}

#[derive(Args, Debug)]
pub struct StepRemove {
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct AuthSetToken {
    pub token: String,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum GoalStatusArg {
    InProgress,
    OnTrack,
    Completed,
    Overdue,
    Paused,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
}
