//! Standalone HLS reaper
//!
//! Runs the same cleanup loop the server embeds, as its own process, for
//! deployments that reap from a sidecar instead. Exit codes: 0 on a normal
//! stop, 2 on invalid configuration, 130 when cancelled by signal.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sectify_core::{config::logging::init_tracing, hls::reaper};
use tokio_util::sync::CancellationToken;

const EXIT_OK: u8 = 0;
const EXIT_INVALID_CONFIG: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

/// Delete expired HLS segments on an interval
#[derive(Parser)]
#[command(name = "sectify_reaper", version)]
struct Cli {
	/// HLS root directory to walk
	#[arg(long, env = "HLS_ROOT")]
	hls_root: PathBuf,

	/// Seconds between passes
	#[arg(long, env = "REAPER_INTERVAL_S", default_value_t = 120)]
	interval: u64,

	/// Segment age threshold in seconds
	#[arg(long, env = "REAPER_AGE_S", default_value_t = 600)]
	age: u64,

	/// Run exactly one pass and exit
	#[arg(long)]
	once: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
	init_tracing("info,sectify_core=debug");

	let cli = Cli::parse();

	if cli.interval == 0 {
		eprintln!("invalid configuration: --interval must be positive");
		return ExitCode::from(EXIT_INVALID_CONFIG);
	}
	if !cli.hls_root.is_dir() {
		eprintln!(
			"invalid configuration: HLS root {} is not a directory",
			cli.hls_root.display()
		);
		return ExitCode::from(EXIT_INVALID_CONFIG);
	}

	if cli.once {
		let stats = reaper::reap_once(&cli.hls_root, std::time::Duration::from_secs(cli.age));
		tracing::info!(
			segments = stats.segments_removed,
			dirs = stats.dirs_removed,
			"Single reap pass completed"
		);
		return ExitCode::from(EXIT_OK);
	}

	let cancel = CancellationToken::new();

	let signal_cancel = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			signal_cancel.cancel();
		}
	});

	reaper::run(cli.hls_root, cli.interval, cli.age, cancel.clone()).await;

	if cancel.is_cancelled() {
		ExitCode::from(EXIT_CANCELLED)
	} else {
		ExitCode::from(EXIT_OK)
	}
}
