//! shelastic - Elasticsearch administration shell
//!
//! Streams documents between a cluster and files, or between indices,
//! through a bounded producer/sink pipeline.
//!
//! # Usage
//!
//! ```bash
//! shelastic --host es1 export --index logs --format array logs.json
//! shelastic --host es1 import --index logs-restore logs.ndjson
//! shelastic --host es1 copy --index logs --target logs-v2
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use shelastic::cli::CliInterface;
use shelastic::connection::HttpCluster;
use shelastic::error::Result;
use shelastic::executor::ExecutionContext;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        if e.is_transport() {
            eprintln!("Check that the cluster is reachable (--host or connection.url in the config file)");
        }
        // Failed bulk items are reported apart from hard failures
        std::process::exit(if e.is_partial_failure() { 2 } else { 1 });
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle local subcommands, or connect and run a cluster command
///
/// # Returns
/// * `Result<()>` - Success or error
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }
    if !cli.needs_connection() {
        return Ok(());
    }

    let cluster = HttpCluster::connect(&cli.config().connection).await?;
    info!(
        "Connected to '{}' at {} (version {})",
        cluster.info().cluster_name,
        cluster.base_url(),
        cluster.info().version
    );

    let context = ExecutionContext::new(Arc::new(cluster), cli.config().clone());

    // Ctrl+C cancels the running command; the pipeline reports it as cancelled
    let cancel_token = context.get_cancel_token();
    let ctrl_c_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                debug!("Interrupt received, cancelling");
                cancel_token.cancel();
            }
            Err(err) => {
                eprintln!("Failed to listen for Ctrl+C: {}", err);
            }
        }
    });

    let result = cli.execute(&context).await;
    ctrl_c_handle.abort();
    result
}

/// Initialize logging system based on the effective log level
///
/// # Arguments
/// * `cli` - CLI interface with merged configuration
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
