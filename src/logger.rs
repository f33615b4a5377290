//! Session log for tracing runs.
//!
//! One file per run, truncated when the session opens.  Every line carries
//! the time since the session started, so slow frames stand out in long
//! batches.  Warnings and errors are also tallied; the CLI prints the tally
//! when a batch ends.
//!
//! Default location:
//!   Windows:  `%APPDATA%\InkScan\inkscan.log`
//!   Linux:    `$XDG_DATA_HOME/InkScan/inkscan.log` (or `~/.local/share/…`)
//!   macOS:    `~/Library/Application Support/InkScan/inkscan.log`
//!
//! Crate code logs through `log_info!` / `log_warn!` / `log_err!`.  Until
//! [`init`] or [`init_at`] runs they do nothing, so library users and unit
//! tests stay quiet.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
        }
    }
}

struct Session {
    file: Mutex<File>,
    path: PathBuf,
    started: Instant,
}

static SESSION: OnceLock<Session> = OnceLock::new();
static WARNINGS: AtomicUsize = AtomicUsize::new(0);
static ERRORS: AtomicUsize = AtomicUsize::new(0);

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*))
    };
}

/// Open the session log at the platform default location.
pub fn init() {
    init_at(&default_log_path());
}

/// Open the session log at `path`.  Later calls in the same process are
/// ignored.  Failing to open the file only prints a warning; the run goes
/// on without a log.
pub fn init_at(path: &Path) {
    if SESSION.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("warning: cannot open log file '{}': {}", path.display(), e);
            return;
        }
    };
    let session = Session {
        file: Mutex::new(file),
        path: path.to_path_buf(),
        started: Instant::now(),
    };
    if SESSION.set(session).is_err() {
        return;
    }

    let unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    write_line(&format!(
        "=== InkScan {} session (unix {}) ===",
        env!("CARGO_PKG_VERSION"),
        unix
    ));

    // Mirror panics into the log before the default report.
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Error, &format!("panic: {}", info));
        prev(info);
    }));
}

/// Path of the open session log, if any.
pub fn log_path() -> Option<&'static Path> {
    SESSION.get().map(|s| s.path.as_path())
}

/// Append one level-tagged line.  No-op without a session; I/O errors are
/// swallowed.  Warnings and errors are counted either way.
pub fn write(level: Level, msg: &str) {
    match level {
        Level::Warn => {
            WARNINGS.fetch_add(1, Ordering::Relaxed);
        }
        Level::Error => {
            ERRORS.fetch_add(1, Ordering::Relaxed);
        }
        Level::Info => {}
    }
    let Some(session) = SESSION.get() else { return };
    let secs = session.started.elapsed().as_secs_f64();
    write_line(&format!("[{:>9.3}s] {} {}", secs, level.tag(), msg));
}

/// Append a raw line.
pub fn write_line(line: &str) {
    if let Some(session) = SESSION.get()
        && let Ok(mut file) = session.file.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// `(warnings, errors)` logged so far in this process.
pub fn tally() -> (usize, usize) {
    (WARNINGS.load(Ordering::Relaxed), ERRORS.load(Ordering::Relaxed))
}

fn default_log_path() -> PathBuf {
    data_dir().join("InkScan").join("inkscan.log")
}

fn data_dir() -> PathBuf {
    let var = |name: &str| std::env::var_os(name).map(PathBuf::from);
    #[cfg(target_os = "windows")]
    if let Some(appdata) = var("APPDATA") {
        return appdata;
    }
    #[cfg(target_os = "macos")]
    if let Some(home) = var("HOME") {
        return home.join("Library").join("Application Support");
    }
    var("XDG_DATA_HOME")
        .or_else(|| var("HOME").map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_without_a_session() {
        let (w0, e0) = tally();
        log_warn!("settings key {} ignored", "x");
        log_err!("frame {} failed", 3);
        log_info!("not counted");
        let (w1, e1) = tally();
        // Other tests may log concurrently.
        assert!(w1 > w0);
        assert!(e1 > e0);
    }
}
