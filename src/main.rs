use anyhow::Result;
use clap::Parser;
use mkdb::cli::{Cli, app};
use mkdb::infra::config::LOG_FILE_NAME;
use std::fs;
use std::path::Path;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(data_dir: &Path) {
    let env_filter = EnvFilter::try_from_env("MKDB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);

    // Stderr only when the data dir cannot be created.
    let file_layer = fs::create_dir_all(data_dir).ok().map(|_| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(tracing_appender::rolling::never(data_dir, LOG_FILE_NAME))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.data_dir);

    app::run(cli)
}
