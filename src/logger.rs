//! Session log for the editing engine.
//!
//! One file per run, truncated at start-up:
//!   Windows:  `%APPDATA%\MockupFE\mockupfe.log`
//!   Linux:    `$XDG_DATA_HOME/MockupFE/mockupfe.log` (or `~/.local/share/...`)
//!   macOS:    `~/Library/Application Support/MockupFE/mockupfe.log`
//!
//! Lines look like `[14:03:27] [WARN] message`. The `log_info!`, `log_warn!`
//! and `log_err!` macros are no-ops until [`init`] (or [`init_at`]) opens the
//! file, so library users and unit tests never create one by accident.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

type Sink = Mutex<Box<dyn Write + Send>>;

static SINK: OnceLock<Sink> = OnceLock::new();
static SINK_PATH: OnceLock<PathBuf> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        })
    }
}

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

/// Where the log is being written, once initialised.
pub fn log_path() -> Option<&'static PathBuf> {
    SINK_PATH.get()
}

/// Append one timestamped line. Write errors are dropped.
pub fn write(level: Level, msg: &str) {
    let Some(sink) = SINK.get() else { return };
    let line = format_line(&clock_time(unix_secs()), level, msg);
    if let Ok(mut out) = sink.lock() {
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

fn format_line(clock: &str, level: Level, msg: &str) -> String {
    format!("[{}] [{}] {}", clock, level, msg)
}

/// Open the log at the platform default location.
pub fn init() {
    init_at(&default_log_path());
}

/// Open (truncating) the log at `path`. Later calls are ignored.
pub fn init_at(path: &Path) {
    if SINK.get().is_some() {
        return;
    }
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };
    if SINK.set(Mutex::new(Box::new(file))).is_err() {
        return;
    }
    let _ = SINK_PATH.set(path.to_path_buf());

    let now = unix_secs();
    write(
        Level::Info,
        &format!("MockupFE {} session started {}", env!("CARGO_PKG_VERSION"), utc_datetime(now)),
    );
    write(Level::Info, &format!("Log file: {}", path.display()));

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, &info.to_string());
        previous(info);
    }));
}

fn default_log_path() -> PathBuf {
    data_dir().join("MockupFE").join("mockupfe.log")
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(appdata) = std::env::var("APPDATA") {
        return PathBuf::from(appdata);
    }
    #[cfg(target_os = "macos")]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join("Library").join("Application Support");
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".local").join("share"),
        Err(_) => PathBuf::from("."),
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// `HH:MM:SS` (UTC) for per-line stamps.
fn clock_time(secs: u64) -> String {
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, (day % 3600) / 60, day % 60)
}

/// `YYYY-MM-DD HH:MM:SS UTC` for the session header.
fn utc_datetime(secs: u64) -> String {
    let (y, m, d) = civil_from_days((secs / 86_400) as i64);
    format!("{:04}-{:02}-{:02} {} UTC", y, m, d, clock_time(secs))
}

/// Days since 1970-01-01 to a proleptic Gregorian date (Hinnant's algorithm).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + if m <= 2 { 1 } else { 0 };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_clock_and_level() {
        assert_eq!(clock_time(3 * 3600 + 4 * 60 + 5), "03:04:05");
        assert_eq!(format_line("03:04:05", Level::Warn, "decode slow"), "[03:04:05] [WARN] decode slow");
    }

    #[test]
    fn header_dates() {
        assert_eq!(utc_datetime(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(utc_datetime(951_782_400), "2000-02-29 00:00:00 UTC");
        assert_eq!(utc_datetime(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn log_file_lives_under_app_folder() {
        assert!(default_log_path().ends_with("MockupFE/mockupfe.log"));
    }

    #[test]
    fn writes_before_init_are_dropped() {
        // Must not panic or create anything.
        write(Level::Info, "nobody listening");
    }
}
