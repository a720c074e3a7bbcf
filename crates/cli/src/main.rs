use balance_ticker_lib::{
    execute_with, BackgroundStore, ControllerConfig, FileStore, ManualClock, MemoryStore,
    ShownBalanceStore, DEFAULT_CATCH_UP_DURATION_MILLIS, DEFAULT_CATCH_UP_INTERVAL_MILLIS,
    DEFAULT_DRIFT_STEP_SIZE, DEFAULT_PERSIST_THROTTLE_MILLIS,
};
use clap::Parser;
use eyre::{eyre, Result, WrapErr};
use std::{
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Replays a balance scenario and prints every persisted shown balance as csv.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario csv: time,type,reference,reference_time,projected,projected_time
    scenario: PathBuf,

    /// Subunits added per drift tick
    #[arg(long, default_value_t = DEFAULT_DRIFT_STEP_SIZE)]
    step_size: u64,

    /// Tick interval of the catch-up animation in milliseconds
    #[arg(long, default_value_t = DEFAULT_CATCH_UP_INTERVAL_MILLIS)]
    catch_up_interval: u64,

    /// Length of the catch-up animation in milliseconds
    #[arg(long, default_value_t = DEFAULT_CATCH_UP_DURATION_MILLIS)]
    catch_up_duration: u64,

    /// Minimum milliseconds between two writes of the shown balance
    #[arg(long, default_value_t = DEFAULT_PERSIST_THROTTLE_MILLIS)]
    persist_throttle: u64,

    /// Offset of the local day from UTC, e.g. 120 or -300
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset_minutes: i32,

    /// File the shown balance is resumed from and persisted to
    #[arg(long)]
    state_file: Option<PathBuf>,
}

/// `RUST_LOG` when set and valid, warnings only otherwise.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = ControllerConfig {
        catch_up_interval_millis: args.catch_up_interval,
        catch_up_duration_millis: args.catch_up_duration,
        drift_step_size: args.step_size,
        persist_throttle_millis: args.persist_throttle,
    };
    let clock = ManualClock::with_offset_minutes(0, args.utc_offset_minutes)
        .ok_or_else(|| eyre!("UTC offset of {} minutes is out of range", args.utc_offset_minutes))?;
    let store: Box<dyn ShownBalanceStore> = match &args.state_file {
        Some(path) => Box::new(BackgroundStore::spawn(FileStore::new(path))?),
        None => Box::new(MemoryStore::default()),
    };

    let file = File::open(&args.scenario)
        .wrap_err_with(|| format!("Failed to open {}", args.scenario.display()))?;
    info!(scenario = %args.scenario.display(), ?config, "replaying scenario");

    execute_with(
        config,
        clock,
        store,
        BufReader::new(file),
        io::stdout().lock(),
    )?;

    Ok(())
}
