//! Tracing setup for pipeline runs.
//!
//! Every command logs to stdout. It also appends to a log file kept beside the artifacts it
//! manages: `<DATA_ROOT>/logs/rusty-index.log` unless `RUSTY_INDEX_LOG_FILE` names another path.
//! Page and chapter fan-outs emit from many tasks at once, so the file layer writes through a
//! non-blocking appender whose guard lives for the rest of the process.
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Config;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "rusty-index.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Where a run's log file goes for this configuration.
pub fn log_file_path(config: &Config) -> PathBuf {
    config
        .log_file
        .clone()
        .unwrap_or_else(|| config.data_root.join(LOG_DIR).join(LOG_FILE))
}

/// Install the stdout and file subscribers, then log the settings the run will use.
///
/// `RUST_LOG` filters both layers and defaults to `info`. When the log file cannot be opened the
/// run continues with stdout only. Returns the file being written, or `None` on stdout-only runs
/// and on repeated calls.
pub fn init_tracing(config: &Config) -> Option<PathBuf> {
    if INITIALIZED.set(()).is_err() {
        return None;
    }
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = log_file_path(config);
    let log_file = match open_log_file(&target) {
        Ok(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
            Some(target)
        }
        Err(err) => {
            registry.init();
            tracing::warn!(path = %target.display(), error = %err, "Log file unavailable; logging to stdout only");
            None
        }
    };

    tracing::info!(
        log_file = log_file.as_deref().map(|path| path.display().to_string()).unwrap_or_default(),
        data_root = %config.data_root.display(),
        registry = %config.registry_path.display(),
        generation_model = config.generation_model.as_deref().unwrap_or("-"),
        embedding_provider = ?config.embedding_provider,
        page_concurrency = config.page_concurrency,
        chapter_concurrency = config.chapter_concurrency,
        batch_concurrency = config.batch_concurrency,
        "Tracing initialized"
    );
    log_file
}

/// Open `path` for appending through a non-blocking writer, creating its directory first.
fn open_log_file(path: &Path) -> std::io::Result<NonBlocking> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let _ = LOG_GUARD.set(guard);
    Ok(non_blocking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProvider;

    fn config(data_root: &Path, log_file: Option<PathBuf>) -> Config {
        Config {
            data_root: data_root.to_path_buf(),
            registry_path: data_root.join("registry.json"),
            ollama_url: "http://127.0.0.1:11434".into(),
            generation_model: None,
            vision_model: None,
            embedding_provider: EmbeddingProvider::Hash,
            embedding_model: "nomic-embed-text".into(),
            embedding_dimension: 768,
            page_concurrency: 5,
            chapter_concurrency: 10,
            batch_concurrency: 2,
            toc_page_limit: 10,
            structure_batch_size: 10,
            raster_dpi: 150,
            call_timeout: None,
            log_file,
        }
    }

    #[test]
    fn log_file_defaults_under_the_data_root() {
        let default = config(Path::new("/srv/index"), None);
        assert_eq!(
            log_file_path(&default),
            PathBuf::from("/srv/index/logs/rusty-index.log")
        );

        let explicit = config(Path::new("/srv/index"), Some(PathBuf::from("/var/log/run.log")));
        assert_eq!(log_file_path(&explicit), PathBuf::from("/var/log/run.log"));
    }

    #[test]
    fn log_file_directory_is_created_on_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = log_file_path(&config(&dir.path().join("data"), None));

        open_log_file(&target).expect("open log file");

        assert!(target.is_file());
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("data");
        std::fs::write(&blocker, b"not a directory").expect("blocker");
        let target = log_file_path(&config(&blocker, None));

        assert!(open_log_file(&target).is_err());
    }
}
