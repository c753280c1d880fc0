use anyhow::Context;
use backupd_core::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber: console always, plus a daily-rolling file
/// when `config.dir` is set.
///
/// `RUST_LOG` overrides the default level. The returned guard must be held
/// until exit or buffered file output is lost.
pub fn init(config: &LoggingConfig, debug: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match config.dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("backupd")
                .filename_suffix("log")
                .max_log_files(config.max_files)
                .build(dir)
                .context("creating log file appender")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(debug))
        .with(file_layer)
        .init();
    Ok(guard)
}
