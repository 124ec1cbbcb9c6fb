use clap::Parser;

use debian_repo_manager::config::{LogFormat, Settings};
use debian_repo_manager::logging::{init_tracing, TracingConfig};
use debian_repo_manager::pipeline::{Pipeline, RunMode, RunOutcome};

#[derive(Parser)]
struct Args {
    #[clap(long, env = "FORCE_REBUILD")]
    /// Rebuild the repository from stored records instead of checking upstream.
    force_rebuild: bool,

    #[clap(long)]
    /// Log level or filter directive; overrides LOG_LEVEL.
    log_level: Option<String>,

    #[clap(long)]
    /// Emit logs as JSON; overrides LOG_FORMAT.
    json_logs: bool,
}

fn print_outcome(outcome: &RunOutcome) {
    match serde_json::to_string(outcome) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize outcome: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), i32> {
    let args = Args::parse();

    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(2);
        }
    };
    if let Some(level) = args.log_level {
        settings.log_level = level;
    }
    if args.json_logs {
        settings.log_format = LogFormat::Json;
    }

    if let Err(e) = init_tracing(&TracingConfig::from(&settings)) {
        eprintln!("{}", e);
        return Err(2);
    }

    let mode = if args.force_rebuild {
        RunMode::ForceRebuild
    } else {
        RunMode::Normal
    };

    let outcome = match Pipeline::from_settings(&settings).await {
        Ok(pipeline) => pipeline.run(mode).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to set up repository manager");
            RunOutcome::failed(&e)
        }
    };

    print_outcome(&outcome);
    if outcome.is_success() {
        Ok(())
    } else {
        Err(1)
    }
}
