//! Logging façade. Re-architects the original `Log` singleton (printf-style
//! leveled macros, line-count + daily rollover, optional async bounded-queue
//! writer thread) onto `tracing` + `tracing-subscriber` + `tracing-appender`:
//! the rolling file appender is the analogue of the original's daily
//! rollover, and its `non_blocking` writer is the analogue of the original's
//! `BlockDeque`-backed writer thread.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Must be kept alive for the lifetime of the process; dropping it flushes
/// and joins the async writer thread (the original's "join after draining"
/// shutdown step).
pub struct LogGuard(#[allow(dead_code)] Option<WorkerGuard>);

pub fn init(config: &Config) -> LogGuard {
    if !config.log {
        tracing_subscriber::fmt().with_writer(std::io::sink).init();
        return LogGuard(None);
    }

    let filter = EnvFilter::try_new(config.log_level.as_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(Path::new(&config.log_dir), "webserv.log");
    let (non_blocking, guard) =
        tracing_appender::non_blocking::NonBlockingBuilder::default()
            .buffered_lines_limit(config.log_queue_capacity)
            .finish(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    LogGuard(Some(guard))
}
