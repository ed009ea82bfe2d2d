//! File logger for audit and diagnostic lines
//!
//! SECURITY: callers pass user names and privilege names only. Secrets and
//! raw handle values never reach this module.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use chrono::Utc;

const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

struct Logger {
    path: PathBuf,
    verbose: bool,
    enabled: bool,
    // Serializes rotate + append so concurrent writers don't interleave a rename.
    write_lock: Mutex<()>,
}

impl Logger {
    fn init() -> Self {
        let base = std::env::var("LOCALAPPDATA").unwrap_or_else(|_| ".".to_string());
        let dir = PathBuf::from(base).join("TokenKeeper").join("logs");

        let filename = if cfg!(debug_assertions) {
            "tokenkeeper-dev.log"
        } else {
            "tokenkeeper.log"
        };
        let path = dir.join(filename);

        let verbose = env_flag("TK_LOG_VERBOSE");

        // Debug builds always write the file; release builds opt in. Unit
        // tests only echo to stderr.
        let enabled =
            !cfg!(test) && (cfg!(debug_assertions) || env_flag("TK_ENABLE_LOGGING"));
        if enabled {
            let _ = fs::create_dir_all(&dir);
        }

        Self {
            path,
            verbose,
            enabled,
            write_lock: Mutex::new(()),
        }
    }

    fn rotate_if_needed(&self) {
        if let Ok(meta) = fs::metadata(&self.path) {
            if meta.len() > MAX_LOG_BYTES {
                let backup = self.path.with_extension("log.bak");
                let _ = fs::remove_file(&backup);
                let _ = fs::rename(&self.path, &backup);
            }
        }
    }

    fn log(&self, level: &str, message: &str) {
        if !self.enabled {
            return;
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.rotate_if_needed();
        if let Ok(mut file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            let _ = writeln!(
                file,
                "{} [{}] {}",
                Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                level,
                message
            );
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).map(|v| v == "1").unwrap_or(false)
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::init)
}

/// Force logger initialization (reads the environment once)
pub fn init_logger() {
    let _ = get_logger();
}

pub fn log_debug(message: &str) {
    log_internal("DEBUG", message, false);
}

/// Debug line emitted only when `TK_LOG_VERBOSE=1`
pub fn log_debug_verbose(message: &str) {
    log_internal("DEBUG", message, true);
}

pub fn log_info(message: &str) {
    log_internal("INFO", message, false);
}

pub fn log_warn(message: &str) {
    log_internal("WARN", message, false);
}

pub fn log_error(message: &str) {
    log_internal("ERROR", message, false);
}

fn log_internal(level: &str, message: &str, verbose_only: bool) {
    let logger = get_logger();
    if verbose_only && !logger.verbose {
        return;
    }

    #[cfg(debug_assertions)]
    eprintln!("[{}] {}", level, message);

    logger.log(level, message);
}
