use clap::Parser;
use sectify_core::{config::logging::init_tracing, SectifyConfig};
use sectify_server::run_http_server;

/// Sectify secure audio streaming server
#[derive(Parser)]
#[command(name = "sectify_server", version)]
struct Cli {
	/// Override the listen port from the environment
	#[arg(long)]
	port: Option<u16>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let cli = Cli::parse();

	let mut config = SectifyConfig::from_env()?;
	if let Some(port) = cli.port {
		config.port = port;
	}

	// Tracing after the environment is loaded so the configured verbosity
	// applies from the first log line.
	init_tracing("info,sectify_core=debug,sectify_server=debug");

	Ok(run_http_server(config).await?)
}
