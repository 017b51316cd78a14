//! Process-wide logging setup.
//!
//! Every module logs through the `log` facade; this installs the
//! `env_logger` backend once per process. Records go to stderr and, once
//! [`log_to_file`] has been called, also to a log file that is rotated at
//! local midnight.
//!
//! Rotation keeps numbered copies next to the live file: `board.log` is
//! today's log, `board.log.1` yesterday's, up to `keep_days` old files.

use crate::config::LoggingConfig;
use chrono::{DateTime, Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

/// Environment variable holding an env_logger filter, e.g. `debug` or
/// `status_board_lib::transit=debug`
pub const LOG_ENV: &str = "STATUS_BOARD_LOG";

static INIT: OnceLock<()> = OnceLock::new();

static FILE: Mutex<Option<DailyFile>> = Mutex::new(None);

/// Initialize logging at `info` unless `STATUS_BOARD_LOG` says otherwise.
///
/// Safe to call more than once; only the first call installs the logger.
pub fn init() {
    INIT.get_or_init(|| {
        let _ = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Info)
            .parse_env(LOG_ENV)
            .format(|buf, record| {
                let now = Local::now();
                let line = format!(
                    "{} {:<8} [{}] {}\n",
                    now.format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.target(),
                    record.args()
                );
                append_to_file(&line, now.date_naive());
                buf.write_all(line.as_bytes())
            })
            .try_init();
    });
}

/// Also write every record to the configured log file.
///
/// An empty `file` leaves logging on stderr only.
pub fn log_to_file(config: &LoggingConfig) -> io::Result<()> {
    if config.file.is_empty() {
        return Ok(());
    }
    let file = DailyFile::open(&config.file, config.keep_days, Local::now().date_naive())?;
    if let Ok(mut slot) = FILE.lock() {
        *slot = Some(file);
    }
    Ok(())
}

fn append_to_file(line: &str, today: NaiveDate) {
    let Ok(mut slot) = FILE.lock() else {
        return;
    };
    if let Some(file) = slot.as_mut() {
        if let Err(e) = file.write_line(line, today) {
            // Logging here would re-enter this function
            eprintln!("log file {}: {}", file.path.display(), e);
        }
    }
}

/// Append-only log file rotated when the local date changes.
#[derive(Debug)]
pub struct DailyFile {
    path: PathBuf,
    keep: u32,
    day: NaiveDate,
    file: File,
}

impl DailyFile {
    /// Open `path` for appending. A file last written on an earlier day is
    /// rotated first.
    pub fn open(path: impl Into<PathBuf>, keep: u32, today: NaiveDate) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if let Ok(modified) = fs::metadata(&path).and_then(|meta| meta.modified()) {
            if DateTime::<Local>::from(modified).date_naive() < today {
                rotate(&path, keep)?;
            }
        }
        let file = append(&path)?;
        Ok(DailyFile {
            path,
            keep,
            day: today,
            file,
        })
    }

    /// Append one formatted line, rotating first if `today` is a new day.
    pub fn write_line(&mut self, line: &str, today: NaiveDate) -> io::Result<()> {
        if today != self.day {
            rotate(&self.path, self.keep)?;
            self.file = append(&self.path)?;
            self.day = today;
        }
        self.file.write_all(line.as_bytes())
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn rotated_path(path: &Path, index: u32) -> PathBuf {
    PathBuf::from(format!("{}.{}", path.display(), index))
}

/// Shift `path` to `path.1`, `path.1` to `path.2` and so on, dropping
/// anything past `keep`.
fn rotate(path: &Path, keep: u32) -> io::Result<()> {
    if keep == 0 {
        return match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        };
    }
    let _ = fs::remove_file(rotated_path(path, keep));
    for index in (1..keep).rev() {
        let src = rotated_path(path, index);
        if src.exists() {
            fs::rename(&src, rotated_path(path, index + 1))?;
        }
    }
    if path.exists() {
        fs::rename(path, rotated_path(path, 1))?;
    }
    Ok(())
}
