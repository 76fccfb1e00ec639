use std::path::Path;
use std::sync::OnceLock;

use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming};

static LOG_HANDLE: OnceLock<LoggerHandle> = OnceLock::new();

/// Starts the process-wide logger. Calls after the first one are no-ops,
/// so tests and batch drivers may call it unconditionally.
pub fn setup_logging(base_level: &str, log_dir: impl AsRef<Path>) {
    let log_dir = log_dir.as_ref();
    LOG_HANDLE.get_or_init(|| {
        Logger::try_with_env_or_str(base_level)
            .unwrap_or_else(|e| panic!("Invalid log filter {}: {}", base_level, e))
            .log_to_file(
                FileSpec::default()
                    .directory(log_dir)
                    .basename("neurolab"),
            )
            .duplicate_to_stderr(Duplicate::Warn)
            .duplicate_to_stdout(Duplicate::All)
            .rotate(
                Criterion::Size(1024 * 1024), //1MB
                Naming::Timestamps,
                Cleanup::KeepLogFiles(5),
            )
            .start()
            .unwrap_or_else(|e| panic!("Logger initialization failed with {}", e))
    });
}

pub fn is_logging_initialized() -> bool {
    LOG_HANDLE.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_setup_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        setup_logging("debug", dir.path());
        setup_logging("info", dir.path().join("elsewhere"));
        assert!(is_logging_initialized());

        log::info!("logger ready");
    }
}
