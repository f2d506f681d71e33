//! liftlog command-line entry point.
//!
//! # Responsibility
//! - Open the workout database and route one command to the core service.
//! - Print results as JSON on stdout and failures as JSON on stderr.
//!
//! Exit codes: 0 = success, 1 = write/storage failure, 2 = invalid input,
//! 3 = exercise not found.

use std::io::Read;
use std::process;

use clap::{Parser, Subcommand};
use liftlog_core::db::open_db;
use liftlog_core::{
    core_version, default_log_level, init_logging, ErrorKind, ExerciseFilter, ExerciseId,
    ExerciseStore, SqliteExerciseStore, WorkoutResult, WorkoutService,
};
use serde_json::{json, Value};

/// Workout log store.
#[derive(Parser)]
#[command(name = "liftlog", about = "Workout log store")]
struct Cli {
    /// Path to the SQLite database file.
    #[arg(long, env = "LIFTLOG_DB", default_value = "liftlog.sqlite3")]
    db: String,

    /// Absolute directory for rolling log files. Logging is off when unset.
    #[arg(long, env = "LIFTLOG_LOG_DIR")]
    log_dir: Option<String>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, env = "LIFTLOG_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create one exercise object or an array of them (JSON, or stdin).
    Create { payload: Option<String> },
    /// Replace one exercise and its full set list (JSON, or stdin).
    Update {
        id: ExerciseId,
        payload: Option<String>,
    },
    /// Delete one exercise and its sets.
    Delete { id: ExerciseId },
    /// List exercises with sets, most recent first.
    List {
        #[arg(long)]
        category: Option<String>,
        /// Inclusive lower date bound (YYYY-MM-DD).
        #[arg(long)]
        from: Option<String>,
        /// Inclusive upper date bound (YYYY-MM-DD).
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show one exercise with its sets.
    Get { id: ExerciseId },
    /// Print the core version.
    Version,
}

/// Failure printed to stderr, with its exit code.
struct CliFailure {
    kind: &'static str,
    message: String,
    exit_code: i32,
}

impl CliFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let exit_code = match kind {
            ErrorKind::ValidationError => 2,
            ErrorKind::NotFound => 3,
            ErrorKind::ReferentialError | ErrorKind::WriteFailed | ErrorKind::StorageFault => 1,
        };
        Self {
            kind: kind.as_str(),
            message: message.into(),
            exit_code,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging(level, log_dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    match run(&cli) {
        Ok(output) => {
            let text = serde_json::to_string_pretty(&output).unwrap_or_else(|err| {
                format!("{{\"error\": \"failed to serialize result: {err}\"}}")
            });
            println!("{text}");
        }
        Err(failure) => {
            eprintln!(
                "{}",
                json!({"error": {"kind": failure.kind, "message": failure.message}})
            );
            process::exit(failure.exit_code);
        }
    }
}

fn run(cli: &Cli) -> Result<Value, CliFailure> {
    if let Commands::Version = cli.command {
        return Ok(version_json());
    }

    let mut conn = open_db(&cli.db).map_err(|err| {
        CliFailure::new(
            ErrorKind::StorageFault,
            format!("failed to open database '{}': {err}", cli.db),
        )
    })?;
    let store = SqliteExerciseStore::try_new(&mut conn)
        .map_err(|err| CliFailure::new(ErrorKind::StorageFault, err.to_string()))?;
    execute(&mut WorkoutService::new(store), &cli.command)
}

fn execute<S: ExerciseStore>(
    service: &mut WorkoutService<S>,
    command: &Commands,
) -> Result<Value, CliFailure> {
    match command {
        Commands::Create { payload } => {
            let payload = read_payload(payload.as_deref())?;
            to_json(service.create_batch(&payload))
        }
        Commands::Update { id, payload } => {
            let payload = read_payload(payload.as_deref())?;
            to_json(service.update_exercise(*id, &payload))
        }
        Commands::Delete { id } => to_json(service.delete_exercise(*id)),
        Commands::List {
            category,
            from,
            to,
            limit,
            offset,
        } => {
            let filter = ExerciseFilter {
                category: category.clone(),
                date_from: from.clone(),
                date_to: to.clone(),
                limit: *limit,
                offset: *offset,
            };
            to_json(service.list_exercises(&filter))
        }
        Commands::Get { id } => to_json(service.get_exercise(*id)),
        Commands::Version => Ok(version_json()),
    }
}

fn version_json() -> Value {
    json!({ "version": core_version() })
}

fn to_json<T: serde::Serialize>(result: WorkoutResult<T>) -> Result<Value, CliFailure> {
    let value = result.map_err(|err| CliFailure::new(err.kind(), err.to_string()))?;
    serde_json::to_value(value)
        .map_err(|err| CliFailure::new(ErrorKind::StorageFault, err.to_string()))
}

fn read_payload(inline: Option<&str>) -> Result<Value, CliFailure> {
    let text = match inline {
        Some(text) => text.to_string(),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer).map_err(|err| {
                CliFailure::new(
                    ErrorKind::ValidationError,
                    format!("failed to read stdin: {err}"),
                )
            })?;
            buffer
        }
    };
    serde_json::from_str(&text).map_err(|err| {
        CliFailure::new(ErrorKind::ValidationError, format!("invalid JSON: {err}"))
    })
}
