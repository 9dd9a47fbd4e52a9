use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "lessonbeat",
    version,
    about = "Generate lesson playback telemetry and deliver it in batches"
)]
pub struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build one lesson's timeline and print it without sending anything
    Plan(PlanArgs),
    /// Build one lesson's timeline and deliver it to the endpoint
    Send(SendArgs),
    /// Process every lesson of a manifest file, oldest first
    Batch(BatchArgs),
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub lesson: LessonArgs,

    #[command(flatten)]
    pub timeline: TimelineArgs,

    /// Print the encoded request bodies instead of a summary
    #[arg(long)]
    pub json: bool,

    /// Events per request body when printing JSON (0 = one body)
    #[arg(long, default_value_t = 120)]
    pub batch_size: usize,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    #[command(flatten)]
    pub lesson: LessonArgs,

    #[command(flatten)]
    pub timeline: TimelineArgs,

    #[command(flatten)]
    pub delivery: DeliveryArgs,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// JSON manifest listing the lessons to process
    pub manifest: PathBuf,

    #[command(flatten)]
    pub timeline: TimelineArgs,

    #[command(flatten)]
    pub delivery: DeliveryArgs,

    /// Pause between lessons, in seconds
    #[arg(long, default_value_t = 10)]
    pub lesson_delay_secs: u64,

    /// Generate timelines only
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct LessonArgs {
    #[arg(long)]
    pub user_id: Option<String>,

    #[arg(long)]
    pub course_id: Option<String>,

    #[arg(long)]
    pub classroom_id: Option<String>,

    #[arg(long)]
    pub lesson_id: Option<String>,

    /// Media id to report; overrides the selected candidate
    #[arg(long)]
    pub media_id: Option<String>,

    /// Media duration in seconds (or milliseconds, see --no-auto-fix-ms);
    /// overrides the selected candidate
    #[arg(long)]
    pub duration: Option<f64>,

    /// JSON array of media candidates to choose the lesson recording from
    #[arg(long)]
    pub media: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TimelineArgs {
    /// Seconds of playback between heartbeats
    #[arg(long, default_value_t = 5.0)]
    pub interval: f64,

    /// Never reinterpret large durations as milliseconds
    #[arg(long)]
    pub no_auto_fix_ms: bool,

    /// JSON file with the static tags stamped on every record
    #[arg(long)]
    pub wire_profile: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DeliveryArgs {
    /// Ingestion URL the batches are posted to
    #[arg(long, env = "LESSONBEAT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Extra request header, as "Name: value" (repeatable)
    #[arg(long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Cookie header value sent with every request
    #[arg(long, env = "LESSONBEAT_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// Events per request (0 = whole timeline in one request)
    #[arg(long, default_value_t = 120)]
    pub batch_size: usize,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = 20)]
    pub timeout: u64,

    /// Extra attempts per batch after the first one fails
    #[arg(long, default_value_t = 2)]
    pub retries: u32,

    /// Pause between batches, in milliseconds
    #[arg(long, default_value_t = 80)]
    pub batch_delay_ms: u64,
}
