use tracing_appender::non_blocking::WorkerGuard;

/// Initialize logging. With CLIPFORGE_DEBUG set, logs roll daily into the
/// data directory; otherwise they go to stdout at the level RUST_LOG asks
/// for.
pub fn init_logging() -> Option<WorkerGuard> {
    if std::env::var("CLIPFORGE_DEBUG").is_ok() {
        let log_dir = dirs::data_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("clipforge")
            .join("logs");
        let _ = std::fs::create_dir_all(&log_dir);

        let file_appender = tracing_appender::rolling::daily(&log_dir, "clipforge.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::DEBUG.into()),
            )
            .init();

        tracing::info!("Clipforge debug logging initialized");
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::INFO.into()),
            )
            .init();
        None
    }
}
