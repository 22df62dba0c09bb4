//! Tracing setup for the pre-Phy filter binaries.
//!
//! Every run appends to a size-capped log file under `$PREPHY_HOME/logs` and
//! mirrors events to stderr, so stdout stays free for the output manifest.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "prephy=info,prephy_filters=info";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Logging configuration for a single binary invocation.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Raise the console layer to `debug` regardless of `RUST_LOG`.
    pub verbose: bool,
}

/// Install the global subscriber: rotating file layer plus stderr layer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = ensure_logs_dir().context("Failed to ensure log directory")?;
    let file_writer = SharedLogWriter::new(log_dir, config.app_name)
        .context("Failed to initialize rotating log writer")?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let console_filter = if config.verbose {
        EnvFilter::new("prephy=debug,prephy_filters=debug")
    } else {
        file_filter.clone()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Home directory for pre-Phy state: `$PREPHY_HOME`, else `~/.prephy`,
/// else `./.prephy` when no home directory can be determined.
pub fn prephy_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("PREPHY_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".prephy")
}

/// Logs directory: `<home>/logs`
pub fn logs_dir() -> PathBuf {
    prephy_home().join("logs")
}

pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Append-only log file that shifts `name.log` to `name.log.1`, `.2`, ...
/// once it grows past `max_size`, keeping at most `max_files` files.
struct RotatingLog {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    current_size: u64,
}

impl RotatingLog {
    fn open(dir: PathBuf, base_name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let mut log = Self {
            dir,
            base_name: sanitize_name(base_name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            current_size: 0,
        };
        log.reopen()?;
        if log.current_size > log.max_size {
            log.rotate()?;
        }
        Ok(log)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn archived_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, index))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.current_size = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let last = self.max_files.saturating_sub(1);
        if last > 0 {
            shift_archives(self, last)?;
        }

        self.reopen()
    }
}

fn shift_archives(log: &RotatingLog, last: usize) -> io::Result<()> {
    let oldest = log.archived_path(last);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for idx in (1..last).rev() {
        let src = log.archived_path(idx);
        if src.exists() {
            fs::rename(&src, log.archived_path(idx + 1))?;
        }
    }

    let active = log.active_path();
    if active.exists() {
        fs::rename(active, log.archived_path(1))?;
    }
    Ok(())
}

impl Write for RotatingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.current_size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let written = file.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct SharedLogWriter {
    inner: Arc<Mutex<RotatingLog>>,
}

impl SharedLogWriter {
    fn new(dir: PathBuf, base_name: &str) -> Result<Self> {
        let log = RotatingLog::open(dir, base_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {}", base_name))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(log)),
        })
    }
}

struct SharedLogGuard {
    inner: Arc<Mutex<RotatingLog>>,
}

impl SharedLogGuard {
    fn with_log<T>(&self, f: impl FnOnce(&mut RotatingLog) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        f(&mut *guard)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedLogWriter {
    type Writer = SharedLogGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedLogGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedLogGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_log(|log| log.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_log(|log| log.flush())
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn archived_count(dir: &Path, base_name: &str) -> usize {
        (1..=MAX_LOG_FILES)
            .filter(|idx| dir.join(format!("{}.log.{}", base_name, idx)).exists())
            .count()
    }

    #[test]
    fn sanitize_name_replaces_path_characters() {
        assert_eq!(sanitize_name("prephy"), "prephy");
        assert_eq!(sanitize_name("pre phy/run"), "pre_phy_run");
    }

    #[test]
    fn rotation_shifts_active_file_into_archive() {
        let dir = tempdir().unwrap();
        let mut log = RotatingLog::open(dir.path().to_path_buf(), "prephy", 3, 16).unwrap();

        log.write_all(b"0123456789").unwrap();
        log.write_all(b"0123456789").unwrap();
        log.flush().unwrap();

        assert!(dir.path().join("prephy.log").exists());
        assert!(dir.path().join("prephy.log.1").exists());
        assert_eq!(archived_count(dir.path(), "prephy"), 1);
    }

    #[test]
    fn rotation_drops_oldest_archive() {
        let dir = tempdir().unwrap();
        let mut log = RotatingLog::open(dir.path().to_path_buf(), "prephy", 2, 4).unwrap();

        for _ in 0..5 {
            log.write_all(b"abcd").unwrap();
        }
        log.flush().unwrap();

        assert!(dir.path().join("prephy.log.1").exists());
        assert!(!dir.path().join("prephy.log.2").exists());
    }
}
