use chrono::Utc;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::OpenOptions;
use std::{io::Write, path::PathBuf, sync::Mutex};

use crate::error::{OTHER_PROBLEM, XtablesError, XtablesResult};

pub const LOG_PATH_ENV: &str = "XTABLES_LOG_PATH";
pub const LOG_LEVEL_ENV: &str = "XTABLES_LOG_LEVEL";

/// Diagnostic logger. Lines go to a file, or to stderr when no file is
/// configured, so they never mix with rule output on stdout.
pub struct XtablesLogger {
    level: LevelFilter,
    out: Mutex<Box<dyn Write + Send>>,
}

impl XtablesLogger {
    pub fn new(out: Box<dyn Write + Send>, level: LevelFilter) -> Self {
        Self {
            level,
            out: Mutex::new(out),
        }
    }
}

impl Log for XtablesLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let now = Utc::now();
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let _ = writeln!(
            &mut *out,
            "[{}][{:>5}] {}: {}",
            now.to_rfc3339(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        if let Ok(mut out) = self.out.lock() {
            let _ = out.flush();
        }
    }
}

/// Command line values win over the environment.
pub fn resolve_log_settings(
    level: Option<&str>,
    path: Option<PathBuf>,
    default_level: LevelFilter,
) -> XtablesResult<(LevelFilter, Option<PathBuf>)> {
    let level = match level {
        Some(l) => l.parse::<LevelFilter>().map_err(|_| {
            XtablesError::parameter_problem(format!("Invalid log level `{l}'"))
        })?,
        None => std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|s| s.parse::<LevelFilter>().ok())
            .unwrap_or(default_level),
    };

    let path = path.or_else(|| {
        std::env::var(LOG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    });

    Ok((level, path))
}

pub fn init_logging(level: LevelFilter, path: Option<PathBuf>) -> XtablesResult<()> {
    let out: Box<dyn Write + Send> = match path {
        Some(path) => Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| {
                    XtablesError::new(
                        format!("Failed to open log file {}: {e}", path.display()),
                        OTHER_PROBLEM,
                    )
                })?,
        ),
        None => Box::new(std::io::stderr()),
    };

    let logger = XtablesLogger::new(out, level);

    log::set_max_level(level);
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| XtablesError::new(format!("Failed to create logger: {e}"), OTHER_PROBLEM))
}
