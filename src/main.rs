use anyhow::Result;

use kanban::cli;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = cli::parse_args(&args)?;
    cli::run(command).await
}

/// Logs go to stderr so board output on stdout stays clean.
fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
