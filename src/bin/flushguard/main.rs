#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]

use flushguard::{
    config::{self, Config},
    logger,
    pipeline::EventPipeline,
};
use std::{
    env,
    io::{Error, ErrorKind, Result},
    path::Path,
    sync::Arc,
    time::Duration,
};
use tokio::io::BufReader;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long the event in flight gets to observe shutdown after an interrupt.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    enable_logging_subsystem(&config);

    let pipeline = EventPipeline::new(Arc::clone(&config));
    let consumer = pipeline.consume(BufReader::new(tokio::io::stdin()));
    tokio::pin!(consumer);

    let result = tokio::select! {
        result = &mut consumer => result,
        () = interrupted() => {
            warn!("Received interrupt, stopping");
            pipeline.cleanup();
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut consumer).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "Input still pending after {}s, exiting",
                        SHUTDOWN_GRACE.as_secs()
                    );
                    Ok(0)
                }
            }
        }
    };
    pipeline.cleanup();

    let stats = pipeline.stats();
    info!(
        "{} records delivered, {} failed",
        stats.delivered, stats.failed
    );
    match result {
        Ok(consumed) => {
            debug!("Processed {consumed} purchases");
            Ok(())
        }
        Err(e) => Err(Error::other(e.to_string())),
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for interrupts: {e}");
        std::future::pending::<()>().await;
    }
}

fn load_config() -> Result<Arc<Config>> {
    let config_directory = env::var("FLUSHGUARD_CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
    config::get_config(Path::new(&config_directory))
        .map(Arc::new)
        .map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))
}

fn enable_logging_subsystem(config: &Arc<Config>) {
    let env_filter = config.log_level.filter_directive();
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_target(false)
        .without_time()
        .event_format(logger::Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");
}
