//! couchdb-check - CouchDB statistics check
//!
//! Runs the CouchDB check for every configured instance and prints the
//! resulting gauges and service checks.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use couchdb_check::cli::Cli;
use couchdb_check::config::Config;
use couchdb_check::emitter::Formatter;
use couchdb_check::runner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    couchdb_check::init_logging(&cli.log_level.to_string(), cli.log_format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting couchdb-check"
    );

    let config = Config::load(&cli.config)?;

    if cli.validate {
        println!(
            "Configuration is valid ({} instance(s))",
            config.instances.len()
        );
        return Ok(());
    }

    let formatter = Formatter::new(cli.output_format).with_timestamps(cli.timestamps);
    let interval = cli.interval.filter(|s| *s > 0).map(Duration::from_secs);

    runner::run(config, interval, formatter).await
}
