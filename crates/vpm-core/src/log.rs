//! Timestamped logging to stdout and a rolling log file under the cache
//! directory. `VPM_QUIET=1` (or `VPM_LOG=quiet`/`VPM_LOG=error`) suppresses
//! stdout only; the file always receives every line.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;

use chrono::Local;

pub const LOG_FILE: &str = "logs.txt";

/// Resolves the cache directory: `VPM_CACHE_DIR` if set, otherwise
/// `%USERPROFILE%\.vpm-cache` on Windows or `$HOME/.vpm-cache` elsewhere.
pub fn get_cache_dir() -> String {
    if let Ok(dir) = env::var("VPM_CACHE_DIR") {
        return dir;
    }
    let base = if cfg!(target_os = "windows") {
        env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string())
    } else {
        env::var("HOME").unwrap_or_else(|_| ".".to_string())
    };
    let sep = if cfg!(target_os = "windows") { "\\" } else { "/" };
    format!("{}{}.vpm-cache", base, sep)
}

/// Creates the cache directory and an empty log file if neither exists yet.
pub fn init_cache() -> std::io::Result<()> {
    let cache_dir = get_cache_dir();
    fs::create_dir_all(&cache_dir)?;

    let log_path = PathBuf::from(&cache_dir).join(LOG_FILE);
    if !log_path.exists() {
        File::create(&log_path)?;
    }

    Ok(())
}

fn is_quiet() -> bool {
    if env::var("VPM_QUIET").map(|v| v == "1" || v == "true").unwrap_or(false) {
        return true;
    }
    env::var("VPM_LOG")
        .map(|v| v.to_lowercase() == "quiet" || v.to_lowercase() == "error")
        .unwrap_or(false)
}

/// Writes a timestamped line to stdout (unless quiet) and appends it to the
/// log file, deduping consecutive identical lines in the file.
pub fn log(message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    let log_message = format!("[{}] {}", timestamp, message);

    if !is_quiet() {
        println!("{}", log_message);
    }

    let log_path = PathBuf::from(get_cache_dir()).join(LOG_FILE);

    let mut should_write = true;
    if let Ok(contents) = fs::read_to_string(&log_path) {
        if let Some(last_line) = contents.lines().last() {
            if last_line == log_message {
                should_write = false;
            }
        }
    }

    if should_write {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = writeln!(file, "{}", log_message);
        }
    }
}

/// Logs to stderr and to the log file, regardless of quiet mode.
pub fn log_error(message: &str) {
    eprintln!("{}", message);
    log(message);
}
