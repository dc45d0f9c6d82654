use crate::error::{AppError, AppResult};
use crate::modules::config::get_data_dir;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn get_log_dir() -> AppResult<PathBuf> {
    let log_dir = get_data_dir()?.join("logs");

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)
            .map_err(|e| AppError::Config(format!("Failed to create log directory: {}", e)))?;
    }

    Ok(log_dir)
}

/// Initialize logger system.
///
/// The console layer writes to stderr so command output on stdout stays
/// clean. `verbose` lowers the default level to debug; `RUST_LOG` wins over both.
pub fn init_logger(verbose: bool) {
    // Capture log macro logs
    let _ = tracing_log::LogTracer::init();

    let default_level = if verbose { "debug" } else { "info" };
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true);

    let log_dir = match get_log_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to initialize log directory: {}", e);
            let _ = tracing_subscriber::registry()
                .with(filter_layer)
                .with(console_layer)
                .try_init();
            return;
        }
    };

    // Daily rolling file, no ANSI
    let file_appender = tracing_appender::rolling::daily(log_dir, "donut.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::Layer::new()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true);

    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    // Keep the writer alive until exit
    std::mem::forget(_guard);

    info!("Logger system initialized (Console + File Persistence)");
}
