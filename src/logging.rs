//! Process-wide `tracing` subscriber for the command-line tool.
//!
//! Events go to stdout and to a run-scoped log file that is truncated when
//! the process starts. `RUST_LOG` selects the filter; the default is `info`.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber and truncates `log_file`.
///
/// Fails if the log file cannot be opened or a global subscriber is already
/// installed. The file is left untouched in both cases.
pub fn init(log_file: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).write(true).open(log_file)?;
    let truncate = file.try_clone()?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))?;
    truncate.set_len(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test installs the global subscriber, so both calls share it.
    #[test]
    fn test_init_truncates_then_refuses_second_subscriber() {
        let dir = std::env::temp_dir();
        let first = dir.join(format!("contention-{}-first.log", std::process::id()));
        let second = dir.join(format!("contention-{}-second.log", std::process::id()));
        std::fs::write(&first, "stale contents").unwrap();
        std::fs::write(&second, "stale contents").unwrap();

        init(&first).unwrap();
        tracing::info!("after init");
        let contents = std::fs::read_to_string(&first).unwrap();
        assert!(!contents.contains("stale contents"));

        let err = init(&second).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "stale contents");

        std::fs::remove_file(&first).ok();
        std::fs::remove_file(&second).ok();
    }

    #[test]
    fn test_init_missing_directory() {
        let path = Path::new("/nonexistent-contention-dir/run.log");
        assert!(init(path).is_err());
    }
}
