// src/logging.rs
//
// Timestamped, tagged log lines on stderr, optionally mirrored to a file.
//
//   tlog!("session", "Opened {}", device)  =>  12:34:56.789 [session] Opened ...

use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

/// Log a tagged line: `tlog!("tag", "format", args...)`.
macro_rules! tlog {
    ($tag:expr, $($arg:tt)*) => {
        $crate::logging::write_line(&$crate::logging::format_line($tag, &format!($($arg)*)))
    };
}

/// Global log file handle. When `Some`, every line is appended here too.
pub(crate) static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Local wall-clock time, `HH:MM:SS.mmm`
pub(crate) fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

pub(crate) fn format_line(tag: &str, msg: &str) -> String {
    format!("{} [{}] {}", timestamp(), tag, msg)
}

pub(crate) fn write_line(line: &str) {
    eprintln!("{}", line);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut f) = *guard {
            let _ = writeln!(f, "{}", line);
        }
    }
}

/// Start mirroring log lines into a timestamped file under `log_dir`.
/// On Unix a `thermotap.log` symlink points at the newest file.
pub fn init_file_logging(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir)
        .map_err(|e| format!("Failed to create log dir: {}", e))?;

    let filename = chrono::Local::now()
        .format("%Y%m%d-%H%M%S-thermotap.log")
        .to_string();
    let log_path = log_dir.join(&filename);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| format!("Failed to create log file: {}", e))?;

    #[cfg(unix)]
    {
        let symlink_path = log_dir.join("thermotap.log");
        let _ = std::fs::remove_file(&symlink_path);
        if let Err(e) = std::os::unix::fs::symlink(&filename, &symlink_path) {
            tlog!("logging", "Failed to create thermotap.log symlink: {}", e);
        }
    }

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }
    tlog!("logging", "File logging started: {}", log_path.display());
    Ok(())
}

pub fn stop_file_logging() {
    let closed = match LOG_FILE.lock() {
        Ok(mut guard) => guard.take().is_some(),
        Err(_) => false,
    };
    if closed {
        tlog!("logging", "File logging stopped");
    }
}
