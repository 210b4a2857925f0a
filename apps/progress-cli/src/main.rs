use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use learning_progress::{
	merge_event_logs, merge_snapshots, parse_events, reduce_events, EngineConfig,
	EngineContext, EventLog, FileStore, HttpRemote, Identity, ProgressEngine, ProgressSnapshot,
	StaticToken, StorageHealth, SyncLedger, SyncOutcome, SyncStatus, UserId,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
	Human,
	Json,
}

#[derive(Parser, Debug)]
#[command(name = "progress-cli", about = "Inspect and synchronize learning progress")]
struct Cli {
	/// Directory holding the progress files
	#[arg(long, default_value = "./progress-data")]
	data_dir: PathBuf,

	/// Engine configuration file (JSON)
	#[arg(long)]
	config: Option<PathBuf>,

	/// Output format
	#[arg(long, value_enum, default_value = "human")]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Show the reduced snapshot and sync status of a stored log
	Inspect {
		/// Signed-in user whose log to read (the guest log otherwise)
		#[arg(long)]
		user: Option<String>,
	},
	/// Merge event log files and print the resulting snapshot
	Reduce {
		/// JSON files, each holding an array of progress events
		#[arg(required = true)]
		files: Vec<PathBuf>,
	},
	/// Bootstrap a user against a remote and push everything pending
	Sync {
		#[arg(long)]
		user: String,

		/// Base URL of the progress API
		#[arg(long)]
		endpoint: String,

		/// Environment variable holding the bearer token
		#[arg(long, default_value = "PROGRESS_TOKEN")]
		token_env: String,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "info".into()),
		)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.init();

	let cli = Cli::parse();

	let config = match &cli.config {
		Some(path) => EngineConfig::load_from(path)
			.with_context(|| format!("Failed to load config from {}", path.display()))?,
		None => EngineConfig::default(),
	};

	match cli.command {
		Commands::Inspect { user } => inspect(&cli.data_dir, user, cli.format),
		Commands::Reduce { files } => reduce(&files, cli.format),
		Commands::Sync {
			user,
			endpoint,
			token_env,
		} => sync(&cli.data_dir, config, user, &endpoint, &token_env, cli.format).await,
	}
}

fn identity_of(user: Option<String>) -> Result<Identity> {
	match user {
		None => Ok(Identity::Guest),
		Some(id) if id.trim().is_empty() => bail!("User id must not be blank"),
		Some(id) => Ok(Identity::User(UserId::new(id))),
	}
}

fn inspect(data_dir: &Path, user: Option<String>, format: OutputFormat) -> Result<()> {
	let identity = identity_of(user)?;
	let store = Arc::new(FileStore::open(data_dir).context("Failed to open data directory")?);

	let log = EventLog::load(identity.clone(), store.clone(), StorageHealth::new());
	let ledger = SyncLedger::load(store.as_ref(), &identity);
	let reduced = reduce_events(log.events());
	let snapshot = match &ledger.remote_snapshot {
		Some(remote) => merge_snapshots(&reduced, remote),
		None => reduced,
	};

	match format {
		OutputFormat::Json => print_json(&json!({
			"events": log.len(),
			"snapshot": snapshot,
			"sync": ledger,
		})),
		OutputFormat::Human => {
			println!("Identity: {}", describe(&identity));
			println!("Events:   {}", log.len());
			print_snapshot(&snapshot);
			if !identity.is_guest() {
				print_ledger(&ledger);
			}
			Ok(())
		}
	}
}

fn reduce(files: &[PathBuf], format: OutputFormat) -> Result<()> {
	let mut merged = Vec::new();
	for path in files {
		let raw = fs::read_to_string(path)
			.with_context(|| format!("Failed to read {}", path.display()))?;
		let value = serde_json::from_str::<Value>(&raw)
			.with_context(|| format!("{} is not valid JSON", path.display()))?;

		let events = parse_events(&value);
		debug!(file = %path.display(), events = events.len(), "Read event log");
		merged = merge_event_logs(&merged, &events);
	}

	let snapshot = reduce_events(&merged);
	match format {
		OutputFormat::Json => print_json(&snapshot),
		OutputFormat::Human => {
			println!("Events: {}", merged.len());
			print_snapshot(&snapshot);
			Ok(())
		}
	}
}

async fn sync(
	data_dir: &Path,
	config: EngineConfig,
	user: String,
	endpoint: &str,
	token_env: &str,
	format: OutputFormat,
) -> Result<()> {
	let Identity::User(user_id) = identity_of(Some(user))? else {
		bail!("Syncing requires a user id");
	};
	let token = std::env::var(token_env)
		.with_context(|| format!("Environment variable {token_env} is not set"))?;

	let store = Arc::new(FileStore::open(data_dir).context("Failed to open data directory")?);
	let remote = Arc::new(HttpRemote::new(endpoint, Arc::new(StaticToken::new(token))));
	info!(endpoint = remote.endpoint(), %user_id, "Syncing learning progress");

	let engine = ProgressEngine::new(EngineContext::new(store, remote), config);
	engine.set_identity(Identity::User(user_id.clone())).await;

	let outcome = engine.sync().await;
	let pending = engine.pending_count().await;
	let last_synced = engine.last_successful_sync_at().await;

	match format {
		OutputFormat::Json => print_json(&json!({
			"userId": user_id.as_str(),
			"outcome": format!("{outcome:?}"),
			"pending": pending,
			"lastSuccessfulSyncAt": last_synced,
		}))?,
		OutputFormat::Human => {
			println!("{}", describe_outcome(&outcome));
			println!("Pending events: {pending}");
			if let Some(at) = last_synced {
				println!("Last successful sync: {}", at.to_rfc3339());
			}
		}
	}

	if let SyncOutcome::Failed { error, .. } = outcome {
		bail!("Sync failed: {error}");
	}
	Ok(())
}

fn describe(identity: &Identity) -> String {
	match identity {
		Identity::Guest => "guest".to_string(),
		Identity::User(user_id) => format!("user {user_id}"),
	}
}

fn describe_outcome(outcome: &SyncOutcome) -> String {
	match outcome {
		SyncOutcome::Skipped(reason) => format!("Sync skipped: {reason:?}"),
		SyncOutcome::Pushed { events, pulled } => {
			format!("Pushed {events} event(s), pulled {pulled}")
		}
		SyncOutcome::Pulled { events } => format!("Nothing to push, pulled {events} event(s)"),
		SyncOutcome::Failed { error, .. } => format!("Sync failed: {error}"),
		SyncOutcome::Superseded => "Sync superseded".to_string(),
	}
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
	if let Some(path_id) = &snapshot.onboarding.path_id {
		println!("Onboarding: {path_id}");
	}
	if let Some(path_id) = &snapshot.active_path_id {
		println!("Active path: {path_id}");
	}
	println!(
		"Streak: {} (longest {})",
		snapshot.streak.current_streak, snapshot.streak.longest_streak
	);
	println!(
		"Content: {} tracked, {} complete",
		snapshot.content.len(),
		snapshot.completed_count()
	);

	for (content_id, progress) in &snapshot.content {
		let score = progress
			.score
			.map(|score| format!(" score {score}"))
			.unwrap_or_default();
		println!("  {content_id:<32} {:?}{score}", progress.status);
	}
}

fn print_ledger(ledger: &SyncLedger) {
	let count = |status: SyncStatus| {
		ledger
			.entries
			.values()
			.filter(|entry| entry.status == status)
			.count()
	};

	println!(
		"Sync: {} synced, {} local, {} failed",
		count(SyncStatus::Synced),
		count(SyncStatus::Local),
		count(SyncStatus::Error)
	);
	if let Some(at) = ledger.last_successful_sync_at {
		println!("Last successful sync: {}", at.to_rfc3339());
	}
	if ledger.guest_cleanup_pending {
		println!("Guest progress is waiting to be cleared");
	}
}

fn print_json(value: &impl Serialize) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}
