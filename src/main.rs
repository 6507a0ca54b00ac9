use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use thorchain_spam::command;
use thorchain_spam::command::Cli;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

pub fn main() -> Result<()> {
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Could not create tokio runtime")?;

    let result = tokio_runtime.block_on(async {
        // Fetch the CLI arguments
        let cli = Cli::parse();

        init_tracing(cli.args.tokio_console)?;

        command::run(cli).await
    });

    tokio_runtime.shutdown_timeout(tokio::time::Duration::from_secs(10));
    result
}

fn init_tracing(tokio_console: bool) -> Result<()> {
    if tokio_console {
        #[cfg(feature = "tokio-console")]
        {
            console_subscriber::init();
            return Ok(());
        }
        #[cfg(not(feature = "tokio-console"))]
        anyhow::bail!("--tokio-console needs a build with the `tokio-console` feature");
    }

    // Set up logger.
    // Configure logger to use ISO-8601, of which rfc3339 is a subset.
    // install global collector configured based on RUST_LOG env var.
    // Accepted `RUST_LOG` values are `trace`, `debug`, `info`, `warn`,
    // and `error`.
    // Logs go to stderr so that command output on stdout stays parseable.
    let info_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(info_env_filter)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set trace subscriber")?;

    Ok(())
}
