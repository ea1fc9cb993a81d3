use once_cell::sync::OnceCell;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();
static LOGGER_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

const DEFAULT_LOG_DIRECTIVES: &str = "info";

/// Logs go to stderr (stdout carries IPC replies) and, with `GRADESD_LOG_DIR`,
/// to a daily rolling file as well.
pub fn init_logging() -> anyhow::Result<()> {
    LOGGER_INIT
        .get_or_try_init(|| -> anyhow::Result<()> {
            let env_filter = EnvFilter::try_from_env("GRADESD_LOG")
                .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_DIRECTIVES))?;

            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true);

            let file_layer = match std::env::var_os("GRADESD_LOG_DIR").map(PathBuf::from) {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)?;
                    let appender = tracing_appender::rolling::daily(&dir, "gradesd.log");
                    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                    let _ = LOGGER_GUARD.set(guard);
                    Some(
                        fmt::layer()
                            .with_writer(non_blocking)
                            .with_ansi(false)
                            .with_target(true)
                            .boxed(),
                    )
                }
                None => None,
            };

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .try_init()?;
            Ok(())
        })
        .map(|_| ())
}
